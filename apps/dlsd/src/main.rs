use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use dls_core::config::{DlsConfig, DlsDirs};
use dls_core::state::handlers::Dls;
use dls_core::{contact, server};

#[derive(Parser, Debug)]
#[command(
    name = "dlsd",
    author,
    version,
    about = "Deployment/Login Service for OpenStage/OpenScape phones",
    long_about = "Provisions a fleet of OpenStage/OpenScape VoIP phones: pushes \
configuration, deploys files, schedules firmware upgrades, and archives each \
phone's resulting configuration."
)]
struct Args {
    /// Directory holding dlsir.conf, phonedefault.conf and per-phone configs
    #[arg(long, default_value = "./conf")]
    conf_dir: PathBuf,

    /// Directory served under /file/ (deployment files, firmware images)
    #[arg(long, default_value = "./files")]
    files_dir: PathBuf,

    /// Directory receiving read-back configuration dumps
    #[arg(long, default_value = "./conf_dump")]
    dump_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .init();

    let config = match DlsConfig::load(&args.conf_dir) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "cannot load server configuration");
            process::exit(1);
        }
    };

    info!(
        phones = config.managed_phones.len(),
        interval = %humantime::format_duration(config.manage_interval),
        "managing phones"
    );

    let dirs = DlsDirs {
        conf_dir: args.conf_dir,
        files_dir: args.files_dir,
        dump_dir: args.dump_dir,
    };
    let dls = Arc::new(Dls::new(config, dirs));

    tokio::spawn(contact::run(
        dls.config.managed_phones.clone(),
        dls.config.manage_interval,
        dls.config.listen_port.clone(),
    ));

    if let Err(err) = server::serve(dls).await {
        error!(error = %err, "server failed");
        process::exit(1);
    }
}
