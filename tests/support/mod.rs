#![allow(clippy::similar_names)]

//! Shared test fixtures: an in-memory `Upstream` double plus a small
//! builder for seeding senders/folders/messages, and a helper that
//! binds a real gateway instance to `127.0.0.1:0` and hands back a
//! plain `TcpStream` to drive it end to end.
//!
//! Mirrors the shape of `upstream::adapter`'s own `FakeUpstream` test
//! double, scaled up with enough state to answer `LIST`/`SELECT`/
//! `FETCH`/`STORE`/`COPY`/`MOVE`/`APPEND` the way a real upstream would.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use xmit_gateway::cache::CacheManager;
use xmit_gateway::error::{Error, Result};
use xmit_gateway::upstream::models::{
    Body, FolderStatus, MailboxFolder, MailboxMessage, MessageFields, Sender,
};
use xmit_gateway::upstream::{OutboundMessage, SearchCriteria, Upstream};

pub const TEST_API_KEY: &str = "pm_test_validkey123";

struct MailboxState {
    folders: Vec<MailboxFolder>,
    messages: HashMap<String, Vec<MailboxMessage>>,
    next_uid: HashMap<String, u32>,
}

/// In-memory stand-in for the REST mailbox service. Seeded once via
/// [`MockUpstreamBuilder`], then driven by a real gateway connection
/// exactly as `RestUpstream` would be.
pub struct MockUpstream {
    senders: Vec<Sender>,
    mailboxes: Mutex<HashMap<String, MailboxState>>,
}

#[derive(Default)]
pub struct MockUpstreamBuilder {
    senders: Vec<Sender>,
    mailboxes: HashMap<String, MailboxState>,
}

impl MockUpstreamBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sender(mut self, id: &str, email: &str) -> Self {
        self.senders.push(Sender {
            id: id.to_string(),
            email: email.to_string(),
        });
        self.mailboxes.entry(id.to_string()).or_insert_with(|| MailboxState {
            folders: Vec::new(),
            messages: HashMap::new(),
            next_uid: HashMap::new(),
        });
        self
    }

    #[must_use]
    pub fn folder(mut self, sender_id: &str, name: &str, special_use: Option<&str>) -> Self {
        let state = self.mailboxes.get_mut(sender_id).expect("sender() before folder()");
        let folder_id = format!("{sender_id}-{name}");
        state.folders.push(MailboxFolder {
            id: folder_id,
            name: name.to_string(),
            special_use: special_use.map(str::to_string),
            flags: Vec::new(),
            uid_validity: 1,
            uid_next: 1,
            total: 0,
        });
        state.messages.entry(name.to_string()).or_default();
        state.next_uid.entry(name.to_string()).or_insert(1);
        self
    }

    #[must_use]
    pub fn message(mut self, sender_id: &str, folder: &str, uid: u32, flags: &[&str], raw: &[u8]) -> Self {
        let state = self.mailboxes.get_mut(sender_id).expect("sender() before message()");
        let (headers, text) = split_raw(raw);
        let msg = MailboxMessage {
            uid,
            flags: flags.iter().map(|s| (*s).to_string()).collect(),
            internal_date: Utc::now(),
            size: raw.len() as u64,
            envelope: None,
            body_structure: None,
            body: Some(Body {
                text: Some(text),
                html: None,
                headers,
            }),
        };
        state.messages.entry(folder.to_string()).or_default().push(msg);
        let next = state.next_uid.entry(folder.to_string()).or_insert(1);
        *next = (*next).max(uid + 1);
        self
    }

    #[must_use]
    pub fn build(self) -> MockUpstream {
        MockUpstream {
            senders: self.senders,
            mailboxes: Mutex::new(self.mailboxes),
        }
    }
}

fn split_raw(raw: &[u8]) -> (Option<String>, String) {
    if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
        let headers = String::from_utf8_lossy(&raw[..pos + 2]).into_owned();
        let text = String::from_utf8_lossy(&raw[pos + 4..]).into_owned();
        (Some(headers), text)
    } else {
        (None, String::from_utf8_lossy(raw).into_owned())
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn validate_key(&self, api_key: &str) -> Result<String> {
        if api_key == TEST_API_KEY {
            Ok("ws1".to_string())
        } else {
            Err(Error::AuthFailure("bad key".to_string()))
        }
    }

    async fn list_senders(&self, _api_key: &str) -> Result<Vec<Sender>> {
        Ok(self.senders.clone())
    }

    async fn get_sender_by_email(&self, _api_key: &str, email: &str) -> Result<Option<Sender>> {
        Ok(self.senders.iter().find(|s| s.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn list_folders(&self, _api_key: &str, sender_id: &str) -> Result<Vec<MailboxFolder>> {
        let mailboxes = self.mailboxes.lock().await;
        Ok(mailboxes.get(sender_id).map(|s| s.folders.clone()).unwrap_or_default())
    }

    async fn folder_status(&self, _api_key: &str, sender_id: &str, folder: &str) -> Result<FolderStatus> {
        let mailboxes = self.mailboxes.lock().await;
        let state = mailboxes.get(sender_id).ok_or_else(|| Error::MailboxNotFound(folder.to_string()))?;
        let messages = state.messages.get(folder).ok_or_else(|| Error::MailboxNotFound(folder.to_string()))?;
        let uid_next = state.next_uid.get(folder).copied().unwrap_or(1);
        let unseen = messages.iter().filter(|m| !m.flags.iter().any(|f| f == "\\Seen")).count() as u32;
        Ok(FolderStatus {
            exists: messages.len() as u32,
            recent: 0,
            unseen,
            uid_validity: 1,
            uid_next: u64::from(uid_next),
            highest_mod_seq: 0,
            flags: vec!["\\Seen".to_string(), "\\Flagged".to_string(), "\\Deleted".to_string()],
            permanent_flags: vec!["\\Seen".to_string(), "\\Flagged".to_string(), "\\Deleted".to_string()],
        })
    }

    async fn list_messages(
        &self,
        _api_key: &str,
        sender_id: &str,
        folder: &str,
        uids: Option<&[u32]>,
        _fields: MessageFields,
        _limit: Option<u32>,
        _offset: Option<u32>,
    ) -> Result<Vec<MailboxMessage>> {
        let mailboxes = self.mailboxes.lock().await;
        let Some(state) = mailboxes.get(sender_id) else {
            return Ok(Vec::new());
        };
        let all = state.messages.get(folder).cloned().unwrap_or_default();
        Ok(match uids {
            Some(wanted) => all.into_iter().filter(|m| wanted.contains(&m.uid)).collect(),
            None => all,
        })
    }

    async fn get_message(
        &self,
        _api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        _fields: MessageFields,
    ) -> Result<Option<MailboxMessage>> {
        let mailboxes = self.mailboxes.lock().await;
        Ok(mailboxes
            .get(sender_id)
            .and_then(|s| s.messages.get(folder))
            .and_then(|msgs| msgs.iter().find(|m| m.uid == uid).cloned()))
    }

    async fn get_body(&self, _api_key: &str, sender_id: &str, folder: &str, uid: u32, _peek: bool) -> Result<Body> {
        let mailboxes = self.mailboxes.lock().await;
        let body = mailboxes
            .get(sender_id)
            .and_then(|s| s.messages.get(folder))
            .and_then(|msgs| msgs.iter().find(|m| m.uid == uid))
            .and_then(|m| m.body.clone());
        Ok(body.unwrap_or_default())
    }

    async fn update_flags(
        &self,
        _api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        flags: Vec<String>,
    ) -> Result<Vec<String>> {
        let mut mailboxes = self.mailboxes.lock().await;
        let state = mailboxes.get_mut(sender_id).ok_or_else(|| Error::MailboxNotFound(folder.to_string()))?;
        let messages = state.messages.get_mut(folder).ok_or_else(|| Error::MailboxNotFound(folder.to_string()))?;
        let msg = messages.iter_mut().find(|m| m.uid == uid).ok_or_else(|| Error::Internal("no such uid".to_string()))?;
        msg.flags = flags.clone();
        Ok(flags)
    }

    async fn copy_message(
        &self,
        _api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        dest_folder: &str,
    ) -> Result<u32> {
        let mut mailboxes = self.mailboxes.lock().await;
        let state = mailboxes.get_mut(sender_id).ok_or_else(|| Error::MailboxNotFound(folder.to_string()))?;
        let source = state.messages.get(folder).ok_or_else(|| Error::MailboxNotFound(folder.to_string()))?;
        let mut msg = source
            .iter()
            .find(|m| m.uid == uid)
            .cloned()
            .ok_or_else(|| Error::Internal("no such uid".to_string()))?;
        let new_uid = *state.next_uid.entry(dest_folder.to_string()).or_insert(1);
        state.next_uid.insert(dest_folder.to_string(), new_uid + 1);
        msg.uid = new_uid;
        state.messages.entry(dest_folder.to_string()).or_default().push(msg);
        Ok(new_uid)
    }

    async fn move_message(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        dest_folder: &str,
    ) -> Result<u32> {
        let new_uid = self.copy_message(api_key, sender_id, folder, uid, dest_folder).await?;
        let mut mailboxes = self.mailboxes.lock().await;
        let state = mailboxes.get_mut(sender_id).ok_or_else(|| Error::MailboxNotFound(folder.to_string()))?;
        if let Some(messages) = state.messages.get_mut(folder) {
            messages.retain(|m| m.uid != uid);
        }
        Ok(new_uid)
    }

    async fn append_message(
        &self,
        _api_key: &str,
        sender_id: &str,
        folder: &str,
        raw: &[u8],
        flags: Option<Vec<String>>,
        date: Option<DateTime<Utc>>,
    ) -> Result<u32> {
        let mut mailboxes = self.mailboxes.lock().await;
        let state = mailboxes.get_mut(sender_id).ok_or_else(|| Error::MailboxNotFound(folder.to_string()))?;
        let uid = *state.next_uid.entry(folder.to_string()).or_insert(1);
        state.next_uid.insert(folder.to_string(), uid + 1);
        let (headers, text) = split_raw(raw);
        let msg = MailboxMessage {
            uid,
            flags: flags.unwrap_or_default(),
            internal_date: date.unwrap_or_else(Utc::now),
            size: raw.len() as u64,
            envelope: None,
            body_structure: None,
            body: Some(Body { text: Some(text), html: None, headers }),
        };
        state.messages.entry(folder.to_string()).or_default().push(msg);
        Ok(uid)
    }

    async fn delete_message(
        &self,
        _api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        expunge: bool,
    ) -> Result<()> {
        let mut mailboxes = self.mailboxes.lock().await;
        let state = mailboxes.get_mut(sender_id).ok_or_else(|| Error::MailboxNotFound(folder.to_string()))?;
        let Some(messages) = state.messages.get_mut(folder) else {
            return Ok(());
        };
        if expunge {
            messages.retain(|m| m.uid != uid);
        } else if let Some(msg) = messages.iter_mut().find(|m| m.uid == uid) {
            if !msg.flags.iter().any(|f| f == "\\Deleted") {
                msg.flags.push("\\Deleted".to_string());
            }
        }
        Ok(())
    }

    async fn search(&self, _api_key: &str, sender_id: &str, folder: &str, _criteria: &SearchCriteria) -> Result<Vec<u32>> {
        let mailboxes = self.mailboxes.lock().await;
        Ok(mailboxes
            .get(sender_id)
            .and_then(|s| s.messages.get(folder))
            .map(|msgs| msgs.iter().map(|m| m.uid).collect())
            .unwrap_or_default())
    }

    async fn sync(&self, _api_key: &str, _sender_id: &str) -> Result<()> {
        Ok(())
    }

    async fn create_folder(&self, _api_key: &str, sender_id: &str, name: &str) -> Result<()> {
        let mut mailboxes = self.mailboxes.lock().await;
        let state = mailboxes.get_mut(sender_id).ok_or_else(|| Error::MailboxNotFound(sender_id.to_string()))?;
        if state.folders.iter().any(|f| f.name == name) {
            return Err(Error::CannotCreate(format!("{name} already exists")));
        }
        state.folders.push(MailboxFolder {
            id: format!("{sender_id}-{name}"),
            name: name.to_string(),
            special_use: None,
            flags: Vec::new(),
            uid_validity: 1,
            uid_next: 1,
            total: 0,
        });
        state.messages.entry(name.to_string()).or_default();
        state.next_uid.entry(name.to_string()).or_insert(1);
        Ok(())
    }

    async fn delete_folder(&self, _api_key: &str, sender_id: &str, folder_id: &str) -> Result<()> {
        let mut mailboxes = self.mailboxes.lock().await;
        let state = mailboxes.get_mut(sender_id).ok_or_else(|| Error::MailboxNotFound(folder_id.to_string()))?;
        state.folders.retain(|f| f.id != folder_id);
        Ok(())
    }

    async fn send_message(&self, _api_key: &str, _sender_id: &str, _outbound: &OutboundMessage) -> Result<()> {
        Ok(())
    }
}

/// Bind a gateway IMAP listener to an ephemeral port and hand back a
/// connected plain `TcpStream`, wired to the given upstream fixture.
/// No TLS acceptor is installed -- tests exercise the plaintext wire
/// protocol directly, the same way `imap::server::handle_connection`
/// is generic over any `AsyncRead + AsyncWrite` transport.
pub async fn spawn_imap_gateway(upstream: Arc<dyn Upstream>) -> TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let mut dir = std::env::temp_dir();
    dir.push(format!("xmit-gateway-imap-test-{}", uuid::Uuid::new_v4()));
    let cache = CacheManager::open(&dir, 1024 * 1024, 1024 * 1024)
        .await
        .expect("open cache");

    tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.expect("accept");
        xmit_gateway::imap::server::handle_connection(
            stream,
            peer,
            upstream,
            cache,
            Duration::from_secs(30 * 60),
        )
        .await;
    });

    TcpStream::connect(addr).await.expect("connect to gateway")
}

/// Same as [`spawn_imap_gateway`] but for the SMTP accept loop, with
/// TLS disabled (`STARTTLS` never advertised).
pub async fn spawn_smtp_gateway(upstream: Arc<dyn Upstream>) -> TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let mut dir = std::env::temp_dir();
    dir.push(format!("xmit-gateway-smtp-test-{}", uuid::Uuid::new_v4()));
    let cache = CacheManager::open(&dir, 1024 * 1024, 1024 * 1024)
        .await
        .expect("open cache");

    tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.expect("accept");
        xmit_gateway::smtp::server::handle_connection(
            stream,
            peer,
            upstream,
            cache,
            10 * 1024 * 1024,
            None,
        )
        .await;
    });

    TcpStream::connect(addr).await.expect("connect to gateway")
}
