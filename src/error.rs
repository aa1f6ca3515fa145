//! Error taxonomy for the gateway.
//!
//! Every variant maps to exactly one of the error kinds in the gateway's
//! design: protocol-syntax, state-violation, auth-failure,
//! mailbox-not-found, upstream-transient, upstream-permanent, and
//! internal. The mapping back to wire responses lives in
//! `imap::formatter` and `smtp::relay`, not here -- this module only
//! classifies.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("command not allowed in current state: {0}")]
    StateViolation(String),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("mailbox not found: {0}")]
    MailboxNotFound(String),

    #[error("mailbox cannot be created: {0}")]
    CannotCreate(String),

    #[error("mailbox cannot be deleted: {0}")]
    CannotDelete(String),

    #[error("message too large: {0}")]
    TooLarge(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("upstream request failed (will retry): {0}")]
    UpstreamTransient(String),

    #[error("upstream rejected request: {status} {message}")]
    UpstreamPermanent { status: u16, message: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short, tag-friendly message suitable for an IMAP `BAD`/`NO` response
    /// or an SMTP reply line. Never includes a trailing CRLF.
    #[must_use]
    pub fn short_message(&self) -> String {
        match self {
            Self::UpstreamPermanent { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether a failed upstream call of this kind is safe to retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamTransient(_) | Self::RateLimited(_))
    }
}
