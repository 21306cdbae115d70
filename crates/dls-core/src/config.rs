//! Server configuration and per-phone effective configuration.
//!
//! Everything lives in the same `key[idx] = value` dialect the phones
//! themselves are provisioned with: `dlsir.conf` configures the server,
//! `phonedefault.conf` holds site-wide defaults, and `<MAC>.conf` holds
//! the phone-specific overlay.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::items::{self, Item, ItemError};

/// Server configuration file inside the conf directory.
pub const SERVER_CONF: &str = "dlsir.conf";
/// Site-wide phone defaults inside the conf directory.
pub const PHONE_DEFAULTS: &str = "phonedefault.conf";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required config item '{0}'")]
    MissingItem(String),

    #[error("invalid manage-interval '{value}': {source}")]
    BadInterval {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error(transparent)]
    Items(#[from] ItemError),
}

/// Directory layout of one DLS instance.
#[derive(Debug, Clone)]
pub struct DlsDirs {
    /// `dlsir.conf`, `phonedefault.conf`, `<MAC>.conf`.
    pub conf_dir: PathBuf,
    /// Deployment files and firmware images, served under `/file/`.
    pub files_dir: PathBuf,
    /// Read-back configuration dumps.
    pub dump_dir: PathBuf,
}

impl Default for DlsDirs {
    fn default() -> Self {
        Self {
            conf_dir: PathBuf::from("./conf"),
            files_dir: PathBuf::from("./files"),
            dump_dir: PathBuf::from("./conf_dump"),
        }
    }
}

/// Parsed `dlsir.conf`.
#[derive(Debug, Clone)]
pub struct DlsConfig {
    pub listen_ip: String,
    /// Kept as text: it is advertised verbatim in the ContactMe body.
    pub listen_port: String,
    pub tls_cert_file: PathBuf,
    pub tls_key_file: PathBuf,
    pub manage_interval: Duration,
    /// Admin addresses of the phones we periodically nudge.
    pub managed_phones: Vec<String>,
    items: Vec<Item>,
}

impl DlsConfig {
    pub fn load(conf_dir: &Path) -> Result<Self, ConfigError> {
        Self::from_items(items::items_from_file(&conf_dir.join(SERVER_CONF))?)
    }

    pub fn from_items(items: Vec<Item>) -> Result<Self, ConfigError> {
        let require = |name: &str| -> Result<String, ConfigError> {
            items::get(&items, name)
                .map(|item| item.value.clone())
                .map_err(|_| ConfigError::MissingItem(name.to_string()))
        };

        let listen_ip = require("listen-ip")?;
        let listen_port = require("listen-port")?;
        let tls_cert_file = PathBuf::from(require("tls-cert-file")?);
        let tls_key_file = PathBuf::from(require("tls-key-file")?);

        let interval_text = require("manage-interval")?;
        let manage_interval =
            humantime::parse_duration(&interval_text).map_err(|source| ConfigError::BadInterval {
                value: interval_text,
                source,
            })?;

        let managed_phones = items::filter(&items, "managed-phones", true)
            .into_iter()
            .map(|item| item.value)
            .collect();

        Ok(Self {
            listen_ip,
            listen_port,
            tls_cert_file,
            tls_key_file,
            manage_interval,
            managed_phones,
            items,
        })
    }

    /// Config key naming the firmware image for a device type:
    /// `"OpenStage 40"` becomes `fw-openstage40`.
    pub fn fw_item_name(dev_type: &str) -> String {
        format!("fw-{}", dev_type.to_lowercase().replace(' ', ""))
    }

    /// Firmware image filename configured for a device type, if any.
    pub fn firmware_file(&self, dev_type: &str) -> Option<String> {
        items::get(&self.items, &Self::fw_item_name(dev_type))
            .ok()
            .map(|item| item.value.clone())
    }
}

/// Effective configuration of one phone: site defaults overlaid with the
/// phone-specific file. An unreadable or malformed file counts as empty.
pub fn phone_config(conf_dir: &Path, mac: &str) -> Vec<Item> {
    let defaults = items_or_empty(&conf_dir.join(PHONE_DEFAULTS));
    let specifics = items_or_empty(&conf_dir.join(format!("{mac}.conf")));
    items::merge(&defaults, &specifics)
}

fn items_or_empty(path: &Path) -> Vec<Item> {
    match items::items_from_file(path) {
        Ok(items) => items,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "treating phone config as empty");
            Vec::new()
        }
    }
}
