//! Wire models returned by the upstream REST service.
//!
//! JSON field names are assumed camelCase, matching the
//! `serde(rename_all = "camelCase")` convention used throughout this
//! module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::folder::SpecialUse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxFolder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub special_use: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    pub uid_validity: u64,
    pub uid_next: u64,
    #[serde(default)]
    pub total: u64,
}

impl MailboxFolder {
    #[must_use]
    pub fn special_use_tag(&self) -> Option<SpecialUse> {
        self.special_use.as_deref().and_then(SpecialUse::from_tag)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStatus {
    pub exists: u32,
    pub recent: u32,
    pub unseen: u32,
    pub uid_validity: u64,
    pub uid_next: u64,
    #[serde(default)]
    pub highest_mod_seq: u64,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub permanent_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Address {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub adl: Option<String>,
    #[serde(default)]
    pub mailbox: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub from: Vec<Address>,
    #[serde(default)]
    pub sender: Vec<Address>,
    #[serde(default)]
    pub reply_to: Vec<Address>,
    #[serde(default)]
    pub to: Vec<Address>,
    #[serde(default)]
    pub cc: Vec<Address>,
    #[serde(default)]
    pub bcc: Vec<Address>,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyStructure {
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: String,
    #[serde(default)]
    pub params: Vec<(String, String)>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub lines: Option<u64>,
    #[serde(default)]
    pub parts: Vec<BodyStructure>,
}

impl BodyStructure {
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.kind.eq_ignore_ascii_case("multipart")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub headers: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxMessage {
    pub uid: u32,
    #[serde(default)]
    pub flags: Vec<String>,
    pub internal_date: DateTime<Utc>,
    pub size: u64,
    #[serde(default)]
    pub envelope: Option<Envelope>,
    #[serde(default)]
    pub body_structure: Option<BodyStructure>,
    #[serde(default)]
    pub body: Option<Body>,
}

/// Fields the dispatcher may ask `list_messages`/`get_message` to
/// populate, kept as a bitset-like struct for easy union-building in
/// the FETCH handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFields {
    pub flags: bool,
    pub uid: bool,
    pub internal_date: bool,
    pub size: bool,
    pub envelope: bool,
    pub body_structure: bool,
}

impl MessageFields {
    #[must_use]
    pub fn as_query_param(self) -> String {
        let mut fields = Vec::new();
        if self.flags {
            fields.push("flags");
        }
        if self.uid {
            fields.push("uid");
        }
        if self.internal_date {
            fields.push("internalDate");
        }
        if self.size {
            fields.push("size");
        }
        if self.envelope {
            fields.push("envelope");
        }
        if self.body_structure {
            fields.push("bodyStructure");
        }
        fields.join(",")
    }
}
