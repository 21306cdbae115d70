//! DLS-Core: Deployment/Login Service for OpenStage/OpenScape phones.
//!
//! A DLS provisions a fleet of VoIP desk phones that speak the vendor
//! HTTP/XML deployment dialect. The server periodically nudges each phone
//! over its admin port; the phone then opens a TLS session and drives a
//! multi-step exchange in which the server pushes configuration, deploys
//! files, optionally schedules a firmware upgrade, and finally reads the
//! live configuration back for archival.
//!
//! # Architecture
//!
//! - **Items**: the `key[idx] = value` model shared by config files, the
//!   XML wire, and the dump format
//! - **Firmware**: version parsing/comparison and the image reader
//! - **Protocol**: the XML wire messages
//! - **Config**: server settings and per-phone effective configuration
//! - **Registry**: in-memory per-IP session table
//! - **State**: the provisioning transition table and message handling
//! - **Actions**: builders for the four outbound actions
//! - **Contact**: the periodic ContactMe trigger
//! - **Server**: TLS HTTP surface

pub mod actions;
pub mod config;
pub mod contact;
pub mod firmware;
pub mod items;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod state;

// Re-exports for convenience
pub use config::{DlsConfig, DlsDirs};
pub use firmware::{FwInfo, FwVersion, firmware_info};
pub use items::{Item, ItemError};
pub use protocol::{DlsMessage, LoginServiceData, Message};
pub use registry::{PhoneRecord, PhoneRegistry};
pub use state::handlers::{Dls, Outcome};
pub use state::machine::ProvStep;
