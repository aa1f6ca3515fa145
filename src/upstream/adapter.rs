//! `ApiClient`: the cache-aware façade the dispatcher talks to.
//!
//! Combines an `Arc<dyn Upstream>` with the [`crate::cache::CacheManager`]
//! and implements mailbox name resolution: folder-name normalization
//! via the fixed alias table, then resolution order (a) pinned sender,
//! (b) `sender/folder` split, (c) search every accessible sender, (d)
//! unresolved.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cache::{keys, CacheManager};
use crate::error::{Error, Result};
use crate::folder::normalize_folder_name;

use super::models::{Body, FolderStatus, MailboxFolder, MailboxMessage, MessageFields, Sender};
use super::{OutboundMessage, SearchCriteria, Upstream};

/// A resolved mailbox target: which sender owns it, and the normalized
/// folder name within that sender's account.
#[derive(Debug, Clone)]
pub struct ResolvedMailbox {
    pub sender_id: String,
    pub folder: String,
}

pub struct ApiClient {
    upstream: Arc<dyn Upstream>,
    cache: Arc<CacheManager>,
    api_key: String,
}

impl ApiClient {
    #[must_use]
    pub fn new(upstream: Arc<dyn Upstream>, cache: Arc<CacheManager>, api_key: String) -> Self {
        Self {
            upstream,
            cache,
            api_key,
        }
    }

    pub async fn validate_key(&self) -> Result<String> {
        let cache_key = keys::api_key(&self.api_key);
        if let Some(workspace_id) = self.cache.get_json::<String>(&cache_key).await {
            return Ok(workspace_id);
        }
        let workspace_id = self.upstream.validate_key(&self.api_key).await?;
        self.cache
            .set_json(&cache_key, &workspace_id, keys::TTL_API_KEY)
            .await;
        Ok(workspace_id)
    }

    pub async fn list_senders(&self, workspace_id: &str) -> Result<Vec<Sender>> {
        let cache_key = keys::senders(workspace_id);
        if let Some(senders) = self.cache.get_json::<Vec<Sender>>(&cache_key).await {
            return Ok(senders);
        }
        let senders = self.upstream.list_senders(&self.api_key).await?;
        self.cache
            .set_json(&cache_key, &senders, keys::TTL_SENDERS)
            .await;
        Ok(senders)
    }

    pub async fn get_sender_by_email(
        &self,
        workspace_id: &str,
        email: &str,
    ) -> Result<Option<Sender>> {
        let senders = self.list_senders(workspace_id).await?;
        Ok(senders
            .into_iter()
            .find(|s| s.email.eq_ignore_ascii_case(email)))
    }

    pub async fn list_folders(&self, sender_id: &str) -> Result<Vec<MailboxFolder>> {
        let cache_key = keys::folders(sender_id);
        if let Some(folders) = self.cache.get_json::<Vec<MailboxFolder>>(&cache_key).await {
            return Ok(folders);
        }
        let folders = self.upstream.list_folders(&self.api_key, sender_id).await?;
        self.cache
            .set_json(&cache_key, &folders, keys::TTL_FOLDERS)
            .await;
        Ok(folders)
    }

    pub async fn folder_status(&self, sender_id: &str, folder: &str) -> Result<FolderStatus> {
        let cache_key = keys::folder_status(sender_id, folder);
        if let Some(status) = self.cache.get_json::<FolderStatus>(&cache_key).await {
            return Ok(status);
        }
        let status = self
            .upstream
            .folder_status(&self.api_key, sender_id, folder)
            .await?;
        self.cache
            .set_json(&cache_key, &status, keys::TTL_FOLDER_STATUS)
            .await;
        Ok(status)
    }

    pub async fn list_messages(
        &self,
        sender_id: &str,
        folder: &str,
        uids: Option<&[u32]>,
        fields: MessageFields,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<MailboxMessage>> {
        let query_suffix = format!(
            "uids={:?}&fields={}&limit={:?}&offset={:?}",
            uids,
            fields.as_query_param(),
            limit,
            offset
        );
        let cache_key = keys::message_list(sender_id, folder, &query_suffix);
        if let Some(messages) = self.cache.get_json::<Vec<MailboxMessage>>(&cache_key).await {
            return Ok(messages);
        }
        let messages = self
            .upstream
            .list_messages(&self.api_key, sender_id, folder, uids, fields, limit, offset)
            .await?;
        self.cache
            .set_json(&cache_key, &messages, keys::TTL_MESSAGE_LIST)
            .await;
        Ok(messages)
    }

    pub async fn get_message(
        &self,
        sender_id: &str,
        folder: &str,
        uid: u32,
        fields: MessageFields,
    ) -> Result<Option<MailboxMessage>> {
        let cache_key = keys::message(sender_id, folder, uid);
        if let Some(msg) = self.cache.get_json::<MailboxMessage>(&cache_key).await {
            return Ok(Some(msg));
        }
        let msg = self
            .upstream
            .get_message(&self.api_key, sender_id, folder, uid, fields)
            .await?;
        if let Some(ref msg) = msg {
            self.cache
                .set_json(&cache_key, msg, keys::TTL_MESSAGE)
                .await;
        }
        Ok(msg)
    }

    pub async fn get_body(&self, sender_id: &str, folder: &str, uid: u32, peek: bool) -> Result<Body> {
        if let Some(raw) = self.cache.get_body(sender_id, folder, uid).await? {
            if let Ok(body) = serde_json::from_slice::<Body>(&raw) {
                return Ok(body);
            }
        }
        let body = self
            .upstream
            .get_body(&self.api_key, sender_id, folder, uid, peek)
            .await?;
        if let Ok(raw) = serde_json::to_vec(&body) {
            self.cache.set_body(sender_id, folder, uid, &raw).await?;
        }
        Ok(body)
    }

    pub async fn update_flags(
        &self,
        sender_id: &str,
        folder: &str,
        uid: u32,
        flags: Vec<String>,
    ) -> Result<Vec<String>> {
        let new_flags = self
            .upstream
            .update_flags(&self.api_key, sender_id, folder, uid, flags)
            .await?;
        self.cache.invalidate_folder(sender_id, folder).await?;
        Ok(new_flags)
    }

    pub async fn copy_message(
        &self,
        sender_id: &str,
        folder: &str,
        uid: u32,
        dest_folder: &str,
    ) -> Result<u32> {
        let new_uid = self
            .upstream
            .copy_message(&self.api_key, sender_id, folder, uid, dest_folder)
            .await?;
        self.cache.invalidate_folder(sender_id, dest_folder).await?;
        Ok(new_uid)
    }

    pub async fn move_message(
        &self,
        sender_id: &str,
        folder: &str,
        uid: u32,
        dest_folder: &str,
    ) -> Result<u32> {
        let new_uid = self
            .upstream
            .move_message(&self.api_key, sender_id, folder, uid, dest_folder)
            .await?;
        self.cache.invalidate_folder(sender_id, folder).await?;
        self.cache.invalidate_folder(sender_id, dest_folder).await?;
        Ok(new_uid)
    }

    pub async fn append_message(
        &self,
        sender_id: &str,
        folder: &str,
        raw: &[u8],
        flags: Option<Vec<String>>,
        date: Option<DateTime<Utc>>,
    ) -> Result<u32> {
        let uid = self
            .upstream
            .append_message(&self.api_key, sender_id, folder, raw, flags, date)
            .await?;
        self.cache.invalidate_folder(sender_id, folder).await?;
        Ok(uid)
    }

    pub async fn delete_message(
        &self,
        sender_id: &str,
        folder: &str,
        uid: u32,
        expunge: bool,
    ) -> Result<()> {
        self.upstream
            .delete_message(&self.api_key, sender_id, folder, uid, expunge)
            .await?;
        self.cache.invalidate_message(sender_id, folder, uid).await?;
        if expunge {
            self.cache.invalidate_folder(sender_id, folder).await?;
        }
        Ok(())
    }

    /// SEARCH is never cached -- criteria are too combinatorial to key
    /// on.
    pub async fn search(
        &self,
        sender_id: &str,
        folder: &str,
        criteria: &SearchCriteria,
    ) -> Result<Vec<u32>> {
        self.upstream
            .search(&self.api_key, sender_id, folder, criteria)
            .await
    }

    pub async fn sync(&self, sender_id: &str) -> Result<()> {
        self.upstream.sync(&self.api_key, sender_id).await?;
        self.cache.invalidate_sender(sender_id).await?;
        Ok(())
    }

    pub async fn create_folder(&self, sender_id: &str, name: &str) -> Result<()> {
        self.upstream
            .create_folder(&self.api_key, sender_id, name)
            .await?;
        // Folder list is keyed purely by sender; the sender-scope
        // pattern covers it.
        self.cache.invalidate_sender(sender_id).await
    }

    pub async fn delete_folder(&self, sender_id: &str, folder_id: &str) -> Result<()> {
        self.upstream
            .delete_folder(&self.api_key, sender_id, folder_id)
            .await?;
        self.cache.invalidate_sender(sender_id).await
    }

    /// Submit an SMTP-accepted message upstream. Nothing in the cache
    /// describes outgoing mail, so there is nothing to invalidate.
    pub async fn send_message(&self, sender_id: &str, outbound: &OutboundMessage) -> Result<()> {
        self.upstream
            .send_message(&self.api_key, sender_id, outbound)
            .await
    }

    /// Resolve a client-supplied mailbox name to `(senderId, folder)`.
    pub async fn resolve_mailbox(
        &self,
        workspace_id: &str,
        pinned_sender: Option<&str>,
        raw_name: &str,
    ) -> Result<Option<ResolvedMailbox>> {
        if let Some(sender_id) = pinned_sender {
            return Ok(Some(ResolvedMailbox {
                sender_id: sender_id.to_string(),
                folder: normalize_folder_name(raw_name),
            }));
        }

        if let Some((left, right)) = raw_name.split_once('/') {
            if let Some(sender) = self.get_sender_by_email(workspace_id, left).await? {
                return Ok(Some(ResolvedMailbox {
                    sender_id: sender.id,
                    folder: normalize_folder_name(right),
                }));
            }
            return Ok(None);
        }

        let normalized = normalize_folder_name(raw_name);
        for sender in self.list_senders(workspace_id).await? {
            let folders = self.list_folders(&sender.id).await?;
            if folders.iter().any(|f| f.name == normalized) {
                debug!(sender = %sender.email, folder = %normalized, "resolved mailbox by search");
                return Ok(Some(ResolvedMailbox {
                    sender_id: sender.id,
                    folder: normalized,
                }));
            }
        }

        Ok(None)
    }
}
