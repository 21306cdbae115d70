//! Message handling: classify an inbound message, drive the transition
//! table, run the selected builder, and maintain the session registry.

use std::collections::hash_map::Entry;
use std::net::IpAddr;

use chrono::Utc;
use tracing::{info, warn};

use crate::actions::{self, ACTION_READ_ALL_ITEMS, ActionReply};
use crate::config::{DlsConfig, DlsDirs};
use crate::firmware::{self, FwVersion};
use crate::items::{self, Item};
use crate::protocol::{DlsMessage, Message};
use crate::registry::{PhoneRecord, PhoneRegistry};
use crate::state::machine::{Builder, Decision, ProvStep, Reason, decide};

/// Handler verdict, mapped onto an HTTP status by the server layer.
#[derive(Debug)]
pub enum Outcome {
    /// 200 with an XML reply.
    Reply(DlsMessage),
    /// 204, nothing to say.
    NoContent,
    /// 400, the message cannot be used.
    BadRequest(&'static str),
}

/// The provisioning service: configuration, directories, and the live
/// session registry. Shared by the HTTP server and the tests.
#[derive(Debug)]
pub struct Dls {
    pub config: DlsConfig,
    pub dirs: DlsDirs,
    pub registry: PhoneRegistry,
}

impl Dls {
    pub fn new(config: DlsConfig, dirs: DlsDirs) -> Self {
        Self {
            config,
            dirs,
            registry: PhoneRegistry::new(),
        }
    }

    /// Handle one inbound message from `ip`.
    ///
    /// The registry stays locked for the whole call: lookup-or-insert,
    /// transition and deletion must not interleave with a second message
    /// from the same phone.
    pub async fn process(&self, ip: IpAddr, host: &str, msg: &Message) -> Outcome {
        let mut phones = self.registry.lock().await;

        let phone = match phones.entry(ip) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(slot) => match self.register_phone(ip, msg.items()) {
                Ok(record) => slot.insert(record),
                Err(why) => {
                    warn!(%ip, why, "rejecting initial contact");
                    return Outcome::BadRequest(why);
                }
            },
        };

        let reason = msg.reason();
        info!(
            phone = %phone.number,
            remote = %ip,
            reason = %reason.value,
            nonce = %msg.nonce,
            host,
            step = %phone.next_step,
            "request from phone"
        );

        let code = Reason::parse(&reason.value);
        let accepted = reason.status == "accepted";

        match code {
            Reason::ReplyTo => {
                info!(action = %reason.action, status = %reason.status, "reply to previous request");
                if reason.action == ACTION_READ_ALL_ITEMS && accepted {
                    self.archive_config(phone, msg.items());
                }
                if !accepted {
                    warn!(phone = %phone.number, "phone did not accept the previous request; aborting dialog");
                }
            }
            Reason::Status => self.log_deployment_status(msg.items()),
            Reason::LocalChanges => {
                info!(
                    phone = %phone.number,
                    "ignoring local-changes report:\n{}",
                    items::format_items(msg.items())
                );
            }
            Reason::Other => {
                warn!(reason = %reason.value, "unknown contact reason");
            }
            Reason::StartUp | Reason::Solicited => {}
        }

        match decide(code, phone.next_step, phone.fw_needs_update, accepted) {
            Decision::Respond { builder, next } => {
                let Some(reply) = self.build(builder, phone, host) else {
                    return Outcome::NoContent;
                };
                phone.next_step = next;
                Outcome::Reply(DlsMessage::reply(reply.action, &msg.nonce, reply.items))
            }
            Decision::Finish => {
                info!(phone = %phone.number, "provisioning finished; dropping session");
                phones.remove(&ip);
                Outcome::NoContent
            }
            Decision::Ignore => Outcome::NoContent,
        }
    }

    fn build(&self, builder: Builder, phone: &PhoneRecord, host: &str) -> Option<ActionReply> {
        match builder {
            Builder::SendConfig => Some(actions::send_config(&self.dirs, phone)),
            Builder::SendFiles => Some(actions::send_files(&self.dirs, phone, host)),
            Builder::SendSoftware => actions::send_software(&self.dirs, &self.config, phone, host),
            Builder::ReadAllItems => Some(actions::read_all_items()),
        }
    }

    /// Create the session record from the first message of an unknown IP.
    fn register_phone(&self, ip: IpAddr, msg_items: &[Item]) -> Result<PhoneRecord, &'static str> {
        let value = |name: &str| items::get(msg_items, name).ok().map(|i| i.value.clone());

        let number = value("e164").unwrap_or_else(|| "?".to_string());
        let (Some(mac), Some(dev_type), Some(_sw_type), Some(sw_version)) = (
            value("mac-addr"),
            value("device-type"),
            value("software-type"),
            value("software-version"),
        ) else {
            return Err("initial contact is missing required items");
        };

        let Ok(reported) = FwVersion::parse(&sw_version) else {
            return Err("unparseable software-version");
        };

        let fw_needs_update = self.check_firmware(&dev_type, reported);

        Ok(PhoneRecord {
            mac,
            ip,
            number,
            next_step: ProvStep::Initial,
            rq_begin: Utc::now(),
            dev_type,
            fw_version: reported,
            fw_needs_update,
        })
    }

    /// Compare the reported version against our image for this device
    /// type. Anything that keeps us from reading the image disables the
    /// update; provisioning must go on regardless.
    fn check_firmware(&self, dev_type: &str, reported: FwVersion) -> bool {
        let Some(fw_file) = self.config.firmware_file(dev_type) else {
            info!(
                dev_type,
                item = %DlsConfig::fw_item_name(dev_type),
                "no firmware image configured for this device type"
            );
            return false;
        };

        match firmware::firmware_info(&self.dirs.files_dir.join(&fw_file)) {
            Ok(image) => {
                let needs_update = reported < image.version;
                if needs_update {
                    info!(is = %reported, should = %image.version, "phone is running old firmware");
                } else {
                    info!(version = %reported, "phone is running the most recent firmware");
                }
                needs_update
            }
            Err(err) => {
                warn!(file = %fw_file, error = %err, "failed to read firmware image");
                false
            }
        }
    }

    /// Archive the phone's live configuration before the session ends.
    /// Dumps are world-readable and world-writable so operators can manage
    /// them without caring which account the daemon runs under.
    fn archive_config(&self, phone: &PhoneRecord, received: &[Item]) {
        use std::os::unix::fs::PermissionsExt;

        let path = self.dirs.dump_dir.join(format!("{}.conf", phone.number));
        let written = std::fs::write(&path, items::format_items(received)).and_then(|()| {
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666))
        });
        match written {
            Ok(()) => info!(path = %path.display(), "archived live phone configuration"),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to write config dump");
            }
        }
    }

    /// Pair `file-deployment-name[i]` with `file-deployment-status[i]`
    /// and log one line per deployed file.
    fn log_deployment_status(&self, received: &[Item]) {
        for item in received {
            if item.name == "file-deployment-name" {
                let status = items::find(received, "file-deployment-status", item.index)
                    .map(|s| s.value.as_str())
                    .unwrap_or("unknown");
                info!(file = %item.value, status, "file deployment result");
            }
        }
    }
}
