//! In-memory table of active provisioning sessions, keyed by remote IP.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::firmware::FwVersion;
use crate::state::machine::ProvStep;

/// One provisioning session.
///
/// Identity is the remote IP the TLS server observed; this is the trust
/// model of the protocol. A phone reconnecting from the same IP overwrites
/// a session that was left in an indeterminate state.
#[derive(Debug, Clone)]
pub struct PhoneRecord {
    pub mac: String,
    pub ip: IpAddr,
    /// Human-readable phone number (`e164` item), `"?"` when unknown.
    pub number: String,
    pub next_step: ProvStep,
    /// First contact of this session.
    pub rq_begin: DateTime<Utc>,
    pub dev_type: String,
    /// Firmware version the phone reported on first contact.
    pub fw_version: FwVersion,
    /// Our image for this device type is newer than `fw_version`.
    pub fw_needs_update: bool,
}

/// Session table. Nothing is persisted; a restart forgets all sessions.
///
/// The mutex spans the caller's whole lookup-or-insert / advance / delete
/// sequence, so two concurrent messages from one IP cannot both observe
/// the same step and race each other.
#[derive(Debug, Default)]
pub struct PhoneRegistry {
    phones: Mutex<HashMap<IpAddr, PhoneRecord>>,
}

impl PhoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, PhoneRecord>> {
        self.phones.lock().await
    }
}
