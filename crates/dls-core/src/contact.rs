//! Out-of-band ContactMe trigger.
//!
//! Phones only ever call the DLS; to make one call in *now*, the server
//! POSTs a ContactMe form to the phone's plain-HTTP admin port. The form
//! advertises the address the phone should call back, which must be the
//! local endpoint of this very connection, so the HTTP exchange runs over
//! the TCP connection we already opened instead of dialing a fresh one.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request, StatusCode, header};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Admin port every OpenStage phone listens on.
pub const PHONE_ADMIN_PORT: u16 = 8085;

/// Pause between phones within one burst. Keeps the log readable; not
/// needed for correctness.
const PER_PHONE_PAUSE: Duration = Duration::from_secs(5);

/// Nudge every managed phone once per `interval`, starting with an
/// immediate burst. Runs for the lifetime of the process.
pub async fn run(managed_phones: Vec<String>, interval: Duration, listen_port: String) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        info!(phones = managed_phones.len(), "sending ContactMe burst");

        for host in &managed_phones {
            if let Err(err) = send_contact_me(host, &listen_port).await {
                warn!(host = %host, error = %err, "ContactMe failed");
            }
            tokio::time::sleep(PER_PHONE_PAUSE).await;
        }
    }
}

/// Send one ContactMe trigger to `host`.
pub async fn send_contact_me(host: &str, listen_port: &str) -> Result<()> {
    contact_phone(host, PHONE_ADMIN_PORT, listen_port).await
}

async fn contact_phone(host: &str, admin_port: u16, listen_port: &str) -> Result<()> {
    let stream = TcpStream::connect((host, admin_port))
        .await
        .with_context(|| format!("connecting to {host}:{admin_port}"))?;
    let local_ip = stream.local_addr()?.ip();

    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .context("HTTP handshake")?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            warn!(error = %err, "ContactMe connection error");
        }
    });

    info!(host = %host, local_ip = %local_ip, port = %listen_port, "sending ContactMe");

    let body = format!("ContactMe=true&dls_ip_addr={local_ip}&dls_ip_port={listen_port}");
    let request = Request::builder()
        .method(Method::POST)
        .uri("/contact_dls.html/ContactDLS")
        .header(header::HOST, format!("{host}:{admin_port}"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Full::new(Bytes::from(body)))?;

    let response = sender.send_request(request).await?;
    if response.status() != StatusCode::NO_CONTENT {
        return Err(anyhow!("unexpected response status {}", response.status()));
    }

    info!(host = %host, "ContactMe delivered");
    Ok(())
}
