//! XML wire model of the DeploymentService/LoginService dialect.
//!
//! Inbound bodies are `<LoginServiceData>` documents, replies are
//! `<DLSMessage>` documents. Both wrap the same `<Message>` element.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::items::Item;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("XML decode failed: {0}")]
    Decode(#[from] quick_xml::DeError),

    #[error("XML encode failed: {0}")]
    Encode(#[from] quick_xml::SeError),
}

/// Why the phone is contacting the server.
///
/// `value` carries the reason code (`start-up`, `solicited`, `reply-to`,
/// `status`, `local-changes`); `action` and `status` are only set on
/// replies to a previous request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonForContact {
    #[serde(rename = "@action", default, skip_serializing_if = "String::is_empty")]
    pub action: String,
    #[serde(rename = "@status", default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemList {
    #[serde(rename = "Item", default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "@nonce", default, skip_serializing_if = "String::is_empty")]
    pub nonce: String,
    #[serde(rename = "@maxItems", default, skip_serializing_if = "max_items_unset")]
    pub max_items: u32,
    #[serde(rename = "Action", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(
        rename = "ReasonForContact",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reason: Option<ReasonForContact>,
    #[serde(rename = "ItemList", default)]
    pub item_list: ItemList,
}

fn max_items_unset(max_items: &u32) -> bool {
    *max_items == 0
}

impl Message {
    pub fn items(&self) -> &[Item] {
        &self.item_list.items
    }

    pub fn reason(&self) -> ReasonForContact {
        self.reason.clone().unwrap_or_default()
    }
}

/// Inbound request body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename = "LoginServiceData")]
pub struct LoginServiceData {
    #[serde(rename = "Message")]
    pub message: Message,
}

/// Outbound reply body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename = "DLSMessage")]
pub struct DlsMessage {
    #[serde(rename = "Message")]
    pub message: Message,
}

impl DlsMessage {
    /// A reply echoing the inbound nonce, as the protocol requires.
    pub fn reply(action: &str, nonce: &str, items: Vec<Item>) -> Self {
        Self {
            message: Message {
                nonce: nonce.to_string(),
                action: Some(action.to_string()),
                item_list: ItemList { items },
                ..Message::default()
            },
        }
    }

    pub fn to_xml(&self) -> Result<String, ProtocolError> {
        Ok(quick_xml::se::to_string(self)?)
    }
}

pub fn decode_login(xml: &str) -> Result<LoginServiceData, ProtocolError> {
    Ok(quick_xml::de::from_str(xml)?)
}
