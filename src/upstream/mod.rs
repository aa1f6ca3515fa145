//! Upstream adapter: a typed façade over the REST mailbox service.
//!
//! The gateway owns no mail storage -- every operation here either
//! round-trips to the upstream or is served from the [`crate::cache`]
//! tiers in front of it. The REST transport is modeled behind the
//! [`Upstream`] trait: `RestUpstream` is the real `reqwest`-backed
//! implementation, tests substitute an in-memory double.

pub mod adapter;
pub mod client;
pub mod models;

use async_trait::async_trait;
use crate::error::Result;
use models::{Body, FolderStatus, MailboxFolder, MailboxMessage, MessageFields, Sender};

/// Search criteria passed through to the upstream unevaluated; the
/// gateway never filters messages itself.
pub type SearchCriteria = Vec<crate::imap::parser::search::SearchKey>;

/// A message accepted over SMTP submission, ready to be handed to the
/// upstream. The envelope addresses come from `MAIL FROM`/`RCPT TO`,
/// not from the MIME headers -- SMTP submission never trusts headers
/// for routing.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub envelope_from: String,
    pub envelope_to: Vec<String>,
    pub subject: Option<String>,
    pub raw: Vec<u8>,
}

/// The narrow interface the dispatcher needs from the upstream REST
/// service.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Validate an API key, returning the workspace id on success.
    async fn validate_key(&self, api_key: &str) -> Result<String>;

    async fn list_senders(&self, api_key: &str) -> Result<Vec<Sender>>;

    async fn get_sender_by_email(&self, api_key: &str, email: &str) -> Result<Option<Sender>>;

    async fn list_folders(&self, api_key: &str, sender_id: &str) -> Result<Vec<MailboxFolder>>;

    async fn folder_status(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
    ) -> Result<FolderStatus>;

    async fn list_messages(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uids: Option<&[u32]>,
        fields: MessageFields,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<MailboxMessage>>;

    async fn get_message(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        fields: MessageFields,
    ) -> Result<Option<MailboxMessage>>;

    async fn get_body(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        peek: bool,
    ) -> Result<Body>;

    async fn update_flags(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        flags: Vec<String>,
    ) -> Result<Vec<String>>;

    async fn copy_message(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        dest_folder: &str,
    ) -> Result<u32>;

    async fn move_message(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        dest_folder: &str,
    ) -> Result<u32>;

    async fn append_message(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        raw: &[u8],
        flags: Option<Vec<String>>,
        date: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<u32>;

    async fn delete_message(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        expunge: bool,
    ) -> Result<()>;

    async fn search(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        criteria: &SearchCriteria,
    ) -> Result<Vec<u32>>;

    async fn sync(&self, api_key: &str, sender_id: &str) -> Result<()>;

    async fn create_folder(&self, api_key: &str, sender_id: &str, name: &str) -> Result<()>;

    async fn delete_folder(&self, api_key: &str, sender_id: &str, folder_id: &str) -> Result<()>;

    /// Submit an SMTP-accepted message to the upstream for delivery.
    async fn send_message(&self, api_key: &str, sender_id: &str, outbound: &OutboundMessage) -> Result<()>;
}
