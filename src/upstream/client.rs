//! `RestUpstream`: the real HTTP transport for the [`super::Upstream`]
//! trait.
//!
//! Every call is wrapped in a timeout (default 30s via
//! `GatewayConfig::api_timeout`) and, for idempotent reads, retried with
//! exponential backoff and full jitter (base 200-500ms, cap 10s, max 2-3
//! attempts). A request is retryable if it failed at the transport level
//! (timeout, reset, connection refused) or the response status was 429,
//! 502, or 503.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::models::{Body, FolderStatus, MailboxFolder, MailboxMessage, MessageFields, Sender};
use super::{OutboundMessage, SearchCriteria, Upstream};

const RETRY_BASE_MS: u64 = 200;
const RETRY_BASE_MAX_MS: u64 = 500;
const RETRY_CAP_MS: u64 = 10_000;
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Idempotency {
    Read,
    Write,
}

pub struct RestUpstream {
    http: Client,
    base_url: String,
}

impl RestUpstream {
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("building the upstream HTTP client should never fail");
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        api_key: &str,
        body: Option<serde_json::Value>,
        idempotency: Idempotency,
    ) -> Result<T> {
        let attempts = match idempotency {
            Idempotency::Read => MAX_ATTEMPTS,
            Idempotency::Write => 1,
        };

        let mut last_err: Option<Error> = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let mut req = self
                .http
                .request(method.clone(), self.url(path))
                .bearer_auth(api_key);
            if let Some(ref b) = body {
                req = req.json(b);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<T>()
                            .await
                            .map_err(|e| Error::Internal(format!("decoding response: {e}")));
                    }
                    let retryable = is_retryable_status(status);
                    let text = resp.text().await.unwrap_or_default();
                    let err = classify_status_error(status, text);
                    if !retryable {
                        return Err(err);
                    }
                    warn!(attempt, %status, "upstream call failed, retrying");
                    last_err = Some(err);
                }
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect() || e.is_request();
                    let err = Error::UpstreamTransient(e.to_string());
                    if !transient {
                        return Err(err);
                    }
                    debug!(attempt, error = %e, "transport error, retrying");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Internal("no attempts made".into())))
    }

    async fn request_no_content(
        &self,
        method: Method,
        path: &str,
        api_key: &str,
        body: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut req = self
            .http
            .request(method, self.url(path))
            .bearer_auth(api_key);
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| Error::UpstreamTransient(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(classify_status_error(status, text))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 502 | 503)
}

/// Classify a non-success HTTP status into the matching error kind.
/// 429 is its own `RateLimited` kind (spec §6/§7: rate-limited maps to a
/// distinct SMTP 451, separate from the 421 bucket for transport-level
/// transience); 502/503 are `UpstreamTransient`; everything else is
/// `UpstreamPermanent`. 429 and 502/503 are still retried by the caller
/// via `is_retryable_status` regardless of which kind they end up as.
fn classify_status_error(status: StatusCode, text: String) -> Error {
    match status.as_u16() {
        429 => Error::RateLimited(format!("{status}: {text}")),
        502 | 503 => Error::UpstreamTransient(format!("{status}: {text}")),
        _ => Error::UpstreamPermanent {
            status: status.as_u16(),
            message: text,
        },
    }
}

/// Exponential backoff with full jitter: `uniform(0, min(cap, base *
/// 2^attempt))`.
fn backoff_delay(attempt: u32) -> Duration {
    let base = rand::thread_rng().gen_range(RETRY_BASE_MS..=RETRY_BASE_MAX_MS);
    let exp = base.saturating_mul(1u64 << attempt.min(10));
    let capped = exp.min(RETRY_CAP_MS);
    let jittered = rand::thread_rng().gen_range(0..=capped);
    Duration::from_millis(jittered)
}

#[async_trait]
impl Upstream for RestUpstream {
    async fn validate_key(&self, api_key: &str) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct WorkspaceResp {
            #[serde(rename = "workspaceId")]
            workspace_id: String,
        }
        let resp: WorkspaceResp = self
            .request_json(
                Method::GET,
                "/api/workspaces",
                api_key,
                None,
                Idempotency::Read,
            )
            .await?;
        Ok(resp.workspace_id)
    }

    async fn list_senders(&self, api_key: &str) -> Result<Vec<Sender>> {
        self.request_json(
            Method::GET,
            "/api/mailbox/accounts",
            api_key,
            None,
            Idempotency::Read,
        )
        .await
    }

    async fn get_sender_by_email(&self, api_key: &str, email: &str) -> Result<Option<Sender>> {
        let senders = self.list_senders(api_key).await?;
        Ok(senders
            .into_iter()
            .find(|s| s.email.eq_ignore_ascii_case(email)))
    }

    async fn list_folders(&self, api_key: &str, sender_id: &str) -> Result<Vec<MailboxFolder>> {
        self.request_json(
            Method::GET,
            &format!("/api/mailbox/{sender_id}/folders"),
            api_key,
            None,
            Idempotency::Read,
        )
        .await
    }

    async fn folder_status(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
    ) -> Result<FolderStatus> {
        let path = format!(
            "/api/mailbox/{sender_id}/folders/{}/status",
            urlencode(folder)
        );
        self.request_json(Method::GET, &path, api_key, None, Idempotency::Read)
            .await
    }

    async fn list_messages(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uids: Option<&[u32]>,
        fields: MessageFields,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<MailboxMessage>> {
        let mut path = format!(
            "/api/mailbox/{sender_id}/folders/{}/messages?fields={}",
            urlencode(folder),
            fields.as_query_param()
        );
        if let Some(uids) = uids {
            let joined = uids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            path.push_str(&format!("&uids={joined}"));
        }
        if let Some(limit) = limit {
            path.push_str(&format!("&limit={limit}"));
        }
        if let Some(offset) = offset {
            path.push_str(&format!("&offset={offset}"));
        }
        self.request_json(Method::GET, &path, api_key, None, Idempotency::Read)
            .await
    }

    async fn get_message(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        fields: MessageFields,
    ) -> Result<Option<MailboxMessage>> {
        let path = format!(
            "/api/mailbox/{sender_id}/messages/{uid}?folder={}&fields={}",
            urlencode(folder),
            fields.as_query_param()
        );
        match self
            .request_json::<MailboxMessage>(Method::GET, &path, api_key, None, Idempotency::Read)
            .await
        {
            Ok(msg) => Ok(Some(msg)),
            Err(Error::UpstreamPermanent { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_body(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        peek: bool,
    ) -> Result<Body> {
        let path = format!(
            "/api/mailbox/{sender_id}/messages/{uid}/body?folder={}&peek={peek}",
            urlencode(folder)
        );
        self.request_json(Method::GET, &path, api_key, None, Idempotency::Read)
            .await
    }

    async fn update_flags(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        flags: Vec<String>,
    ) -> Result<Vec<String>> {
        #[derive(serde::Deserialize)]
        struct FlagsResp {
            flags: Vec<String>,
        }
        let path = format!(
            "/api/mailbox/{sender_id}/messages/{uid}/flags?folder={}",
            urlencode(folder)
        );
        let resp: FlagsResp = self
            .request_json(
                Method::PATCH,
                &path,
                api_key,
                Some(json!({ "flags": flags })),
                Idempotency::Write,
            )
            .await?;
        Ok(resp.flags)
    }

    async fn copy_message(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        dest_folder: &str,
    ) -> Result<u32> {
        #[derive(serde::Deserialize)]
        struct NewUid {
            #[serde(rename = "newUid")]
            new_uid: u32,
        }
        let path = format!(
            "/api/mailbox/{sender_id}/messages/{uid}/copy?folder={}",
            urlencode(folder)
        );
        let resp: NewUid = self
            .request_json(
                Method::POST,
                &path,
                api_key,
                Some(json!({ "destination": dest_folder })),
                Idempotency::Write,
            )
            .await?;
        Ok(resp.new_uid)
    }

    async fn move_message(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        dest_folder: &str,
    ) -> Result<u32> {
        #[derive(serde::Deserialize)]
        struct NewUid {
            #[serde(rename = "newUid")]
            new_uid: u32,
        }
        let path = format!(
            "/api/mailbox/{sender_id}/messages/{uid}/move?folder={}",
            urlencode(folder)
        );
        let resp: NewUid = self
            .request_json(
                Method::POST,
                &path,
                api_key,
                Some(json!({ "destination": dest_folder })),
                Idempotency::Write,
            )
            .await?;
        Ok(resp.new_uid)
    }

    async fn append_message(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        raw: &[u8],
        flags: Option<Vec<String>>,
        date: Option<DateTime<Utc>>,
    ) -> Result<u32> {
        #[derive(serde::Deserialize)]
        struct UidResp {
            uid: u32,
        }
        use base64::Engine as _;
        let path = format!("/api/mailbox/{sender_id}/folders/{}/append", urlencode(folder));
        let payload = json!({
            "message": base64::engine::general_purpose::STANDARD.encode(raw),
            "flags": flags,
            "date": date,
        });
        let resp: UidResp = self
            .request_json(Method::POST, &path, api_key, Some(payload), Idempotency::Write)
            .await?;
        Ok(resp.uid)
    }

    async fn delete_message(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        uid: u32,
        expunge: bool,
    ) -> Result<()> {
        let path = format!(
            "/api/mailbox/{sender_id}/messages/{uid}?folder={}&expunge={expunge}",
            urlencode(folder)
        );
        self.request_no_content(Method::DELETE, &path, api_key, None)
            .await
    }

    async fn search(
        &self,
        api_key: &str,
        sender_id: &str,
        folder: &str,
        criteria: &SearchCriteria,
    ) -> Result<Vec<u32>> {
        #[derive(serde::Deserialize)]
        struct SearchResp {
            uids: Vec<u32>,
        }
        let path = format!(
            "/api/mailbox/{sender_id}/folders/{}/search",
            urlencode(folder)
        );
        let payload = json!({ "criteria": format!("{criteria:?}") });
        let resp: SearchResp = self
            .request_json(Method::POST, &path, api_key, Some(payload), Idempotency::Write)
            .await?;
        Ok(resp.uids)
    }

    async fn sync(&self, api_key: &str, sender_id: &str) -> Result<()> {
        let path = format!("/api/mailbox/{sender_id}/sync");
        self.request_no_content(Method::POST, &path, api_key, None)
            .await
    }

    async fn create_folder(&self, api_key: &str, sender_id: &str, name: &str) -> Result<()> {
        let path = format!("/api/mailbox/{sender_id}/folders");
        self.request_no_content(
            Method::POST,
            &path,
            api_key,
            Some(json!({ "name": name })),
        )
        .await
    }

    async fn delete_folder(&self, api_key: &str, sender_id: &str, folder_id: &str) -> Result<()> {
        let path = format!("/api/mailbox/{sender_id}/folders/{folder_id}");
        self.request_no_content(Method::DELETE, &path, api_key, None)
            .await
    }

    async fn send_message(&self, api_key: &str, sender_id: &str, outbound: &OutboundMessage) -> Result<()> {
        use base64::Engine as _;
        let path = format!("/api/mailbox/{sender_id}/send");
        let payload = json!({
            "from": outbound.envelope_from,
            "to": outbound.envelope_to,
            "subject": outbound.subject,
            "message": base64::engine::general_purpose::STANDARD.encode(&outbound.raw),
        });
        self.request_no_content(Method::POST, &path, api_key, Some(payload))
            .await
    }
}

fn urlencode(s: &str) -> String {
    percent_encode(s)
}

/// Minimal percent-encoding for path/query segments. Folder names are
/// the only untrusted-ish input placed into the URL; this covers the
/// characters that would otherwise break path or query parsing.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
