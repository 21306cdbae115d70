//! Builders for the four outbound actions of the provisioning dialog.

use tracing::{debug, info, warn};

use crate::config::{self, DlsConfig, DlsDirs};
use crate::firmware;
use crate::items::{self, Item};
use crate::registry::PhoneRecord;

/// Items whose name carries this prefix describe file deployment rather
/// than plain configuration.
pub const FILE_PREFIX: &str = "file-";

pub const ACTION_WRITE_ITEMS: &str = "WriteItems";
pub const ACTION_FILE_DEPLOYMENT: &str = "FileDeployment";
pub const ACTION_SOFTWARE_DEPLOYMENT: &str = "SoftwareDeployment";
pub const ACTION_READ_ALL_ITEMS: &str = "ReadAllItems";

/// Action name plus the items to send with it.
#[derive(Debug, Clone)]
pub struct ActionReply {
    pub action: &'static str,
    pub items: Vec<Item>,
}

/// Everything from the phone's effective configuration that is not a
/// `file-*` directive.
pub fn send_config(dirs: &DlsDirs, phone: &PhoneRecord) -> ActionReply {
    let items = items::filter(
        &config::phone_config(&dirs.conf_dir, &phone.mac),
        FILE_PREFIX,
        false,
    );
    ActionReply {
        action: ACTION_WRITE_ITEMS,
        items,
    }
}

/// The `file-*` directives, with every `file-name` rewritten into the
/// download URL the phone should fetch it from. The URL is built from the
/// host the phone used for this request, so the callback goes through the
/// same endpoint.
pub fn send_files(dirs: &DlsDirs, phone: &PhoneRecord, host: &str) -> ActionReply {
    let mut items = items::filter(
        &config::phone_config(&dirs.conf_dir, &phone.mac),
        FILE_PREFIX,
        true,
    );

    for item in &mut items {
        if item.name == "file-name" {
            item.name = "file-https-base-url".to_string();
            item.value = format!("https://{host}/file/{}", item.value);
        }
    }

    ActionReply {
        action: ACTION_FILE_DEPLOYMENT,
        items,
    }
}

/// The software-deployment descriptor for the phone's device type.
///
/// Returns `None` when no image is configured or the image is unreadable;
/// the dialog then continues without an upgrade.
pub fn send_software(
    dirs: &DlsDirs,
    config: &DlsConfig,
    phone: &PhoneRecord,
    host: &str,
) -> Option<ActionReply> {
    let Some(fw_file) = config.firmware_file(&phone.dev_type) else {
        warn!(
            dev_type = %phone.dev_type,
            item = %DlsConfig::fw_item_name(&phone.dev_type),
            "no firmware image configured; cannot issue software update"
        );
        return None;
    };

    let fw = match firmware::firmware_info(&dirs.files_dir.join(&fw_file)) {
        Ok(fw) => fw,
        Err(err) => {
            warn!(file = %fw_file, error = %err, "firmware image unusable; cannot issue software update");
            return None;
        }
    };

    info!(
        phone = %phone.number,
        ip = %phone.ip,
        old = %phone.fw_version,
        new = %fw.version,
        "issuing software update"
    );

    let items = vec![
        Item::new("file-https-base-url", format!("https://{host}/file/{fw_file}")),
        Item::new("file-priority", "immediate"),
        Item::new("file-sw-type", fw.fw_type.clone()),
        Item::new("file-sw-version", fw.version.to_string()),
        Item::new("file-type", "APP"),
    ];
    debug!("sending:\n{}", items::format_items(&items));

    Some(ActionReply {
        action: ACTION_SOFTWARE_DEPLOYMENT,
        items,
    })
}

/// Ask the phone for its complete live configuration.
pub fn read_all_items() -> ActionReply {
    ActionReply {
        action: ACTION_READ_ALL_ITEMS,
        items: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PHONE_DEFAULTS;
    use crate::firmware::FwVersion;
    use crate::state::machine::ProvStep;
    use chrono::Utc;
    use std::fs;
    use std::net::{IpAddr, Ipv4Addr};

    const MAC: &str = "00:1a:e8:aa:bb:cc";

    fn phone() -> PhoneRecord {
        PhoneRecord {
            mac: MAC.to_string(),
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            number: "4711".to_string(),
            next_step: ProvStep::Initial,
            rq_begin: Utc::now(),
            dev_type: "OpenStage 40".to_string(),
            fw_version: FwVersion::new(3, 0, 1, 2, 2),
            fw_needs_update: false,
        }
    }

    fn fixture_dirs() -> (tempfile::TempDir, DlsDirs) {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DlsDirs {
            conf_dir: tmp.path().join("conf"),
            files_dir: tmp.path().join("files"),
            dump_dir: tmp.path().join("conf_dump"),
        };
        fs::create_dir_all(&dirs.conf_dir).unwrap();
        fs::create_dir_all(&dirs.files_dir).unwrap();
        fs::create_dir_all(&dirs.dump_dir).unwrap();

        fs::write(
            dirs.conf_dir.join(PHONE_DEFAULTS),
            "display-name = Default\nfile-name = logo.png\nfile-priority = low\n",
        )
        .unwrap();
        fs::write(
            dirs.conf_dir.join(format!("{MAC}.conf")),
            "display-name = Lobby\ne164 = 4711\n",
        )
        .unwrap();

        (tmp, dirs)
    }

    #[test]
    fn send_config_drops_file_directives() {
        let (_tmp, dirs) = fixture_dirs();
        let reply = send_config(&dirs, &phone());

        assert_eq!(reply.action, ACTION_WRITE_ITEMS);
        assert_eq!(
            reply.items,
            vec![Item::new("display-name", "Lobby"), Item::new("e164", "4711")]
        );
    }

    #[test]
    fn send_files_rewrites_file_names_to_urls() {
        let (_tmp, dirs) = fixture_dirs();
        let reply = send_files(&dirs, &phone(), "dls.example.net:18443");

        assert_eq!(reply.action, ACTION_FILE_DEPLOYMENT);
        assert_eq!(
            reply.items,
            vec![
                Item::new(
                    "file-https-base-url",
                    "https://dls.example.net:18443/file/logo.png"
                ),
                Item::new("file-priority", "low"),
            ]
        );
    }

    #[test]
    fn send_software_emits_the_deployment_descriptor() {
        let (_tmp, dirs) = fixture_dirs();
        let image = crate::firmware::fake_image(
            "OpenStage 40",
            "V3 R1.2.3",
            "OpenStage 40",
            "Siemens SIP",
        );
        fs::write(dirs.files_dir.join("fw-v3r123.img"), image).unwrap();
        let config = DlsConfig::from_items(
            crate::items::parse_items(
                "listen-ip = 0.0.0.0\nlisten-port = 443\ntls-cert-file = c\ntls-key-file = k\nmanage-interval = 15m\nfw-openstage40 = fw-v3r123.img\n",
            )
            .unwrap(),
        )
        .unwrap();

        let reply = send_software(&dirs, &config, &phone(), "10.0.0.1:443").unwrap();
        assert_eq!(reply.action, ACTION_SOFTWARE_DEPLOYMENT);
        assert_eq!(
            reply.items,
            vec![
                Item::new("file-https-base-url", "https://10.0.0.1:443/file/fw-v3r123.img"),
                Item::new("file-priority", "immediate"),
                Item::new("file-sw-type", "Siemens SIP"),
                Item::new("file-sw-version", "V3 R1.2.3"),
                Item::new("file-type", "APP"),
            ]
        );
    }

    #[test]
    fn send_software_without_image_yields_nothing() {
        let (_tmp, dirs) = fixture_dirs();
        let config = DlsConfig::from_items(
            crate::items::parse_items(
                "listen-ip = 0.0.0.0\nlisten-port = 443\ntls-cert-file = c\ntls-key-file = k\nmanage-interval = 15m\n",
            )
            .unwrap(),
        )
        .unwrap();

        assert!(send_software(&dirs, &config, &phone(), "h").is_none());
    }

    #[test]
    fn read_all_items_is_empty() {
        let reply = read_all_items();
        assert_eq!(reply.action, ACTION_READ_ALL_ITEMS);
        assert!(reply.items.is_empty());
    }
}
