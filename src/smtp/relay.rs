//! SMTP protocol state machine: EHLO/HELO, STARTTLS, AUTH PLAIN/LOGIN,
//! MAIL FROM/RCPT TO/DATA, mapped onto the upstream's `send_message`.
//!
//! Unlike the IMAP side, one line of client input here does not always
//! correspond to one command -- `AUTH LOGIN` is a two-round-trip
//! continuation, and `DATA` switches the reader into raw-line
//! accumulation until the lone-dot terminator. [`SmtpSession`] owns
//! that state so the connection loop only ever does "read a line, hand
//! it to `handle_line`, write the reply lines back".

use std::sync::Arc;

use base64::Engine as _;
use mail_parser::MessageParser;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::error::Error;
use crate::upstream::adapter::ApiClient;
use crate::upstream::{OutboundMessage, Upstream};

const MAX_RECIPIENTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Greeted,
    Authenticated,
}

enum Pending {
    AuthPlainContinuation,
    AuthLoginUsername,
    AuthLoginPassword { username: String },
    Data { buffer: Vec<u8> },
}

/// What the connection loop should do after handing a line to
/// [`SmtpSession::handle_line`].
#[derive(Debug, Default)]
pub struct Outcome {
    /// Reply lines to write verbatim (each already CRLF-free; the
    /// caller appends `\r\n`).
    pub lines: Vec<String>,
    /// Perform the STARTTLS handshake now, after writing `lines`.
    pub start_tls: bool,
    /// Close the connection after writing `lines`.
    pub close: bool,
}

impl Outcome {
    fn reply(code: u16, text: impl Into<String>) -> Self {
        Self {
            lines: vec![format!("{code} {}", text.into())],
            ..Self::default()
        }
    }
}

pub struct SmtpSession {
    upstream: Arc<dyn Upstream>,
    cache: Arc<CacheManager>,
    max_message_size: u64,
    require_tls: bool,
    state: State,
    tls_active: bool,
    pending: Option<Pending>,
    workspace_id: Option<String>,
    sender_id: Option<String>,
    api_client: Option<ApiClient>,
    mail_from: Option<String>,
    rcpt_to: Vec<String>,
}

impl SmtpSession {
    #[must_use]
    pub fn new(
        upstream: Arc<dyn Upstream>,
        cache: Arc<CacheManager>,
        max_message_size: u64,
        require_tls: bool,
        tls_active: bool,
    ) -> Self {
        Self {
            upstream,
            cache,
            max_message_size,
            require_tls,
            state: State::Greeted,
            tls_active,
            pending: None,
            workspace_id: None,
            sender_id: None,
            api_client: None,
            mail_from: None,
            rcpt_to: Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.state, State::Authenticated)
    }

    /// Record that the transport has been upgraded to TLS, after the
    /// connection loop completes the handshake following a
    /// `start_tls` [`Outcome`].
    pub const fn mark_tls_active(&mut self) {
        self.tls_active = true;
    }

    fn authed_or_reject(&self) -> Option<Outcome> {
        if self.is_authenticated() {
            None
        } else {
            Some(Outcome::reply(530, "5.7.0 Authentication required"))
        }
    }

    /// Handle one line of client input (or, mid-`DATA`, one line of the
    /// message body).
    pub async fn handle_line(&mut self, line: &str) -> Outcome {
        if let Some(pending) = self.pending.take() {
            return self.handle_pending(pending, line).await;
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        let mut parts = trimmed.splitn(2, ' ');
        let verb = parts.next().unwrap_or("").to_ascii_uppercase();
        let rest = parts.next().unwrap_or("").trim();

        match verb.as_str() {
            "EHLO" => self.handle_ehlo(rest),
            "HELO" => Outcome::reply(250, format!("Hello {rest}")),
            "STARTTLS" => self.handle_starttls(),
            "AUTH" => self.handle_auth(rest).await,
            "MAIL" => self.handle_mail_from(rest),
            "RCPT" => self.handle_rcpt_to(rest),
            "DATA" => self.handle_data_start(),
            "RSET" => {
                self.mail_from = None;
                self.rcpt_to.clear();
                Outcome::reply(250, "2.0.0 OK")
            }
            "NOOP" => Outcome::reply(250, "2.0.0 OK"),
            "QUIT" => Outcome {
                lines: vec!["221 2.0.0 Bye".to_string()],
                close: true,
                ..Outcome::default()
            },
            "" => Outcome::reply(500, "5.5.2 Error: bad syntax"),
            other => Outcome::reply(502, format!("5.5.1 Command not implemented: {other}")),
        }
    }

    fn handle_ehlo(&mut self, domain: &str) -> Outcome {
        let domain = if domain.is_empty() { "client" } else { domain };
        let mut lines = vec![format!("250-Transmit Hello {domain}")];
        if !self.tls_active && self.require_tls {
            lines.push("250-STARTTLS".to_string());
        }
        lines.push("250-AUTH PLAIN LOGIN".to_string());
        lines.push(format!("250-SIZE {}", self.max_message_size));
        lines.push("250 8BITMIME".to_string());
        Outcome { lines, ..Outcome::default() }
    }

    fn handle_starttls(&self) -> Outcome {
        if self.tls_active {
            return Outcome::reply(503, "5.5.1 Already in TLS");
        }
        Outcome {
            lines: vec!["220 2.0.0 Ready to start TLS".to_string()],
            start_tls: true,
            ..Outcome::default()
        }
    }

    async fn handle_auth(&mut self, rest: &str) -> Outcome {
        if !self.tls_active && self.require_tls {
            return Outcome::reply(530, "5.7.0 Must issue STARTTLS first");
        }
        let mut parts = rest.splitn(2, ' ');
        let mechanism = parts.next().unwrap_or("").to_ascii_uppercase();
        let arg = parts.next().map(str::trim);
        match mechanism.as_str() {
            "PLAIN" => match arg {
                Some(encoded) => self.finish_auth_plain(encoded).await,
                None => {
                    self.pending = Some(Pending::AuthPlainContinuation);
                    Outcome::reply(334, "")
                }
            },
            "LOGIN" => {
                self.pending = Some(Pending::AuthLoginUsername);
                Outcome {
                    lines: vec!["334 VXNlcm5hbWU6".to_string()],
                    ..Outcome::default()
                }
            }
            other => Outcome::reply(504, format!("5.5.4 Unrecognized authentication mechanism: {other}")),
        }
    }

    async fn handle_pending(&mut self, pending: Pending, line: &str) -> Outcome {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        match pending {
            Pending::AuthPlainContinuation => self.finish_auth_plain(trimmed).await,
            Pending::AuthLoginUsername => {
                let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(trimmed) else {
                    return Outcome::reply(501, "5.5.2 Invalid base64");
                };
                let username = String::from_utf8_lossy(&decoded).into_owned();
                self.pending = Some(Pending::AuthLoginPassword { username });
                Outcome {
                    lines: vec!["334 UGFzc3dvcmQ6".to_string()],
                    ..Outcome::default()
                }
            }
            Pending::AuthLoginPassword { username } => {
                let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(trimmed) else {
                    return Outcome::reply(501, "5.5.2 Invalid base64");
                };
                let password = String::from_utf8_lossy(&decoded).into_owned();
                self.authenticate(&username, &password).await
            }
            Pending::Data { mut buffer } => {
                if trimmed == "." {
                    return self.finish_data(buffer).await;
                }
                let unstuffed = trimmed.strip_prefix('.').unwrap_or(trimmed);
                buffer.extend_from_slice(unstuffed.as_bytes());
                buffer.extend_from_slice(b"\r\n");
                if buffer.len() as u64 > self.max_message_size {
                    return Outcome::reply(552, "5.3.4 Message size exceeds fixed maximum message size");
                }
                self.pending = Some(Pending::Data { buffer });
                Outcome::default()
            }
        }
    }

    async fn finish_auth_plain(&mut self, encoded: &str) -> Outcome {
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
            return Outcome::reply(501, "5.5.2 Invalid base64");
        };
        let parts: Vec<&[u8]> = decoded.splitn(3, |&b| b == 0).collect();
        if parts.len() != 3 {
            return Outcome::reply(501, "5.5.2 Malformed AUTH PLAIN response");
        }
        let username = String::from_utf8_lossy(parts[1]).into_owned();
        let password = String::from_utf8_lossy(parts[2]).into_owned();
        self.authenticate(&username, &password).await
    }

    async fn authenticate(&mut self, username: &str, password: &str) -> Outcome {
        if !password.starts_with("pm_live_") && !password.starts_with("pm_test_") {
            return Outcome::reply(535, "5.7.8 Authentication credentials invalid");
        }
        let probe = ApiClient::new(self.upstream.clone(), self.cache.clone(), password.to_string());
        let workspace_id = match probe.validate_key().await {
            Ok(id) => id,
            Err(_) => return Outcome::reply(535, "5.7.8 Authentication credentials invalid"),
        };
        if username != "api" && username != "*" {
            match probe.get_sender_by_email(&workspace_id, username).await {
                Ok(Some(sender)) => self.sender_id = Some(sender.id),
                Ok(None) => return Outcome::reply(535, "5.7.8 Authentication credentials invalid"),
                Err(_) => return Outcome::reply(454, "4.7.0 Temporary authentication failure"),
            }
        }
        self.workspace_id = Some(workspace_id);
        self.api_client = Some(probe);
        self.state = State::Authenticated;
        Outcome::reply(235, "2.7.0 Authentication successful")
    }

    fn handle_mail_from(&mut self, rest: &str) -> Outcome {
        if let Some(outcome) = self.authed_or_reject() {
            return outcome;
        }
        let Some(address) = extract_address(rest, "FROM:") else {
            return Outcome::reply(550, "5.1.7 Bad sender address syntax");
        };
        self.mail_from = Some(address);
        self.rcpt_to.clear();
        Outcome::reply(250, "2.1.0 OK")
    }

    fn handle_rcpt_to(&mut self, rest: &str) -> Outcome {
        if let Some(outcome) = self.authed_or_reject() {
            return outcome;
        }
        if self.mail_from.is_none() {
            return Outcome::reply(503, "5.5.1 MAIL FROM required before RCPT TO");
        }
        let Some(address) = extract_address(rest, "TO:") else {
            return Outcome::reply(550, "5.1.1 Bad recipient address syntax");
        };
        if self.rcpt_to.len() >= MAX_RECIPIENTS {
            return Outcome::reply(452, "4.5.3 Too many recipients");
        }
        self.rcpt_to.push(address);
        Outcome::reply(250, "2.1.5 OK")
    }

    fn handle_data_start(&mut self) -> Outcome {
        if let Some(outcome) = self.authed_or_reject() {
            return outcome;
        }
        if self.mail_from.is_none() || self.rcpt_to.is_empty() {
            return Outcome::reply(503, "5.5.1 MAIL FROM/RCPT TO required before DATA");
        }
        self.pending = Some(Pending::Data { buffer: Vec::new() });
        Outcome {
            lines: vec!["354 Start mail input; end with <CRLF>.<CRLF>".to_string()],
            ..Outcome::default()
        }
    }

    async fn finish_data(&mut self, buffer: Vec<u8>) -> Outcome {
        let Some(client) = self.api_client.clone() else {
            return Outcome::reply(451, "4.3.0 Requested action aborted: local error");
        };
        let Some(workspace_id) = self.workspace_id.clone() else {
            return Outcome::reply(451, "4.3.0 Requested action aborted: local error");
        };
        let Some(from) = self.mail_from.clone() else {
            return Outcome::reply(503, "5.5.1 MAIL FROM required");
        };
        let subject = MessageParser::default()
            .parse(&buffer)
            .and_then(|m| m.subject().map(ToString::to_string));

        let outbound = OutboundMessage {
            envelope_from: from,
            envelope_to: self.rcpt_to.clone(),
            subject,
            raw: buffer,
        };

        let sender_id = match &self.sender_id {
            Some(id) => id.clone(),
            None => match client.get_sender_by_email(&workspace_id, &outbound.envelope_from).await {
                Ok(Some(sender)) => sender.id,
                Ok(None) => return Outcome::reply(550, "5.1.0 Sender address rejected"),
                Err(e) => return reply_for_error(&e),
            },
        };

        self.mail_from = None;
        self.rcpt_to.clear();

        match client.send_message(&sender_id, &outbound).await {
            Ok(()) => Outcome::reply(250, "2.0.0 OK: message accepted"),
            Err(e) => {
                warn!(error = %e, "upstream rejected submitted message");
                reply_for_error(&e)
            }
        }
    }
}

/// Extract the angle-bracketed (or bare) address after a `MAIL FROM:`/
/// `RCPT TO:` prefix, case-insensitively, ignoring trailing `SIZE=`/
/// `BODY=` parameters.
fn extract_address(rest: &str, prefix: &str) -> Option<String> {
    let rest = rest.trim();
    let body = if rest.len() >= prefix.len() && rest[..prefix.len()].eq_ignore_ascii_case(prefix) {
        &rest[prefix.len()..]
    } else {
        return None;
    };
    let body = body.trim();
    let addr_part = body.split_whitespace().next().unwrap_or(body);
    let addr = addr_part.strip_prefix('<').and_then(|s| s.strip_suffix('>')).unwrap_or(addr_part);
    if addr.is_empty() || !addr.contains('@') {
        debug!(addr, "rejecting address without @");
        return None;
    }
    Some(addr.to_string())
}

/// Map a gateway error to the SMTP reply code the submission relay
/// returns to the client (spec: auth->535, missing/invalid addresses->550,
/// too large->552, rate-limited->451, timeouts/unavailable/network->421,
/// parse/internal->451).
#[must_use]
pub fn reply_for_error(err: &Error) -> Outcome {
    match err {
        Error::AuthFailure(msg) => Outcome::reply(535, format!("5.7.8 {msg}")),
        Error::MailboxNotFound(msg) | Error::CannotCreate(msg) | Error::CannotDelete(msg) => {
            Outcome::reply(550, format!("5.1.1 {msg}"))
        }
        Error::TooLarge(msg) => Outcome::reply(552, format!("5.3.4 {msg}")),
        Error::RateLimited(msg) => Outcome::reply(451, format!("4.7.0 {msg}")),
        Error::UpstreamTransient(msg) => Outcome::reply(421, format!("4.3.0 {msg}")),
        Error::UpstreamPermanent { message, .. } => Outcome::reply(550, format!("5.1.0 {message}")),
        Error::Io(_) | Error::Tls(_) => Outcome::reply(421, "4.3.0 Service not available"),
        Error::Protocol(msg) | Error::StateViolation(msg) | Error::Internal(msg) | Error::Config(msg) => {
            Outcome::reply(451, format!("4.3.0 {msg}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_angle_bracketed_address() {
        assert_eq!(extract_address("FROM:<a@b.com>", "FROM:"), Some("a@b.com".to_string()));
    }

    #[test]
    fn extracts_address_with_size_parameter() {
        assert_eq!(
            extract_address("FROM:<a@b.com> SIZE=1000", "FROM:"),
            Some("a@b.com".to_string())
        );
    }

    #[test]
    fn rejects_address_without_at_sign() {
        assert_eq!(extract_address("FROM:<notanaddress>", "FROM:"), None);
    }

    #[test]
    fn reply_for_auth_failure_is_535() {
        let outcome = reply_for_error(&Error::AuthFailure("bad key".into()));
        assert!(outcome.lines[0].starts_with("535"));
    }

    #[test]
    fn reply_for_too_large_is_552() {
        let outcome = reply_for_error(&Error::TooLarge("too big".into()));
        assert!(outcome.lines[0].starts_with("552"));
    }

    #[test]
    fn reply_for_upstream_transient_is_421() {
        let outcome = reply_for_error(&Error::UpstreamTransient("timeout".into()));
        assert!(outcome.lines[0].starts_with("421"));
    }

    #[test]
    fn reply_for_rate_limited_is_451() {
        let outcome = reply_for_error(&Error::RateLimited("slow down".into()));
        assert!(outcome.lines[0].starts_with("451"));
    }
}
