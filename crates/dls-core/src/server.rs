//! The TLS HTTP surface of the DLS.
//!
//! Two routes: the provisioning endpoint the phones POST to, and the
//! plain file download endpoint their deployment directives point at.
//! TLS is terminated by an explicit accept loop so each handler sees the
//! real remote address of its connection.

use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::Router;
use axum::extract::{ConnectInfo, Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls;
use tower::{Service, ServiceExt};
use tracing::{debug, info, warn};

use crate::protocol;
use crate::state::handlers::{Dls, Outcome};

pub fn router(dls: Arc<Dls>) -> Router {
    Router::new()
        .route("/DeploymentService/LoginService", post(login_service))
        .route("/file/{file}", get(get_file))
        .with_state(dls)
}

/// Run the TLS server until the process dies.
pub async fn serve(dls: Arc<Dls>) -> Result<()> {
    let addr = format!("{}:{}", dls.config.listen_ip, dls.config.listen_port);
    let tls_config = tls_config(&dls.config.tls_cert_file, &dls.config.tls_key_file)?;
    let acceptor = TlsAcceptor::from(Arc::new(tls_config));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr, "DLS listening");

    let mut make_service = router(dls).into_make_service_with_connect_info::<SocketAddr>();

    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
        };

        let service = unwrap_infallible(make_service.call(remote).await);
        let acceptor = acceptor.clone();

        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(tls_stream) => tls_stream,
                Err(err) => {
                    warn!(remote = %remote, error = %err, "TLS handshake failed");
                    return;
                }
            };

            let hyper_service =
                hyper::service::service_fn(move |request: hyper::Request<hyper::body::Incoming>| {
                    service.clone().oneshot(request)
                });

            if let Err(err) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(tls_stream), hyper_service)
                .await
            {
                debug!(remote = %remote, error = %err, "connection closed with error");
            }
        });
    }
}

fn tls_config(cert_path: &Path, key_path: &Path) -> Result<rustls::ServerConfig> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(
        File::open(cert_path).with_context(|| format!("opening {}", cert_path.display()))?,
    ))
    .collect::<std::result::Result<Vec<_>, _>>()?;

    let key = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(key_path).with_context(|| format!("opening {}", key_path.display()))?,
    ))?
    .ok_or_else(|| anyhow!("no private key in {}", key_path.display()))?;

    Ok(rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?)
}

fn unwrap_infallible<T>(result: std::result::Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => match err {},
    }
}

async fn login_service(
    State(dls): State<Arc<Dls>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    body: String,
) -> Response {
    let data = match protocol::decode_login(&body) {
        Ok(data) => data,
        Err(err) => {
            warn!(remote = %remote, error = %err, "failed to decode inbound XML");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    // The phone builds its callback URLs from whatever host it reached us
    // on, so the builders need the Host header verbatim.
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match dls.process(remote.ip(), host, &data.message).await {
        Outcome::Reply(reply) => match reply.to_xml() {
            Ok(xml) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/xml")],
                xml,
            )
                .into_response(),
            Err(err) => {
                warn!(remote = %remote, error = %err, "failed to encode reply");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        Outcome::NoContent => StatusCode::NO_CONTENT.into_response(),
        Outcome::BadRequest(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn get_file(
    State(dls): State<Arc<Dls>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    UrlPath(file): UrlPath<String>,
) -> Response {
    info!(remote = %remote, file, "file download request");

    // The route only names files directly inside the files directory.
    if file.contains(['/', '\\']) || file.contains("..") {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = dls.dirs.files_dir.join(&file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (
                    header::CONTENT_TYPE,
                    "application/octet-stream".to_string(),
                ),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{file}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "file not served");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
