//! IMAP message flags
//!
//! Provides a strongly-typed enum for IMAP flags instead of raw
//! strings. Standard system flags have dedicated variants; arbitrary
//! keyword flags use the `Keyword` variant.

use std::fmt;

/// An IMAP message flag.
///
/// System flags (prefixed with `\` in the IMAP protocol) have
/// dedicated variants. User-defined keyword flags use [`Flag::Keyword`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message is a draft (`\Draft`).
    Draft,
    /// Message has recently arrived in this session (`\Recent`).
    Recent,
    /// A user-defined keyword flag (no `\` prefix).
    Keyword(String),
}

impl Flag {
    /// The IMAP wire representation of this flag.
    ///
    /// System flags include the leading backslash (e.g. `\Seen`).
    /// Keyword flags are returned as-is.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(kw) => kw,
        }
    }

    /// Parse a single wire token (e.g. `\Seen`, `$Important`) into a
    /// `Flag`. Matching on the backslash-prefixed name is
    /// case-insensitive, per RFC 3501.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        match token {
            t if t.eq_ignore_ascii_case("\\Seen") => Self::Seen,
            t if t.eq_ignore_ascii_case("\\Answered") => Self::Answered,
            t if t.eq_ignore_ascii_case("\\Flagged") => Self::Flagged,
            t if t.eq_ignore_ascii_case("\\Deleted") => Self::Deleted,
            t if t.eq_ignore_ascii_case("\\Draft") => Self::Draft,
            t if t.eq_ignore_ascii_case("\\Recent") => Self::Recent,
            other => Self::Keyword(other.to_string()),
        }
    }

    /// Parse a parenthesised, space-separated flag list like
    /// `(\Seen \Draft)` (parentheses optional) into a `Vec<Flag>`.
    #[must_use]
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split_whitespace()
            .map(Self::parse)
            .collect()
    }

    /// Render a flag list back to wire form: `(\Seen \Draft)`.
    #[must_use]
    pub fn render_list(flags: &[Self]) -> String {
        let joined = flags
            .iter()
            .map(Self::as_imap_str)
            .collect::<Vec<_>>()
            .join(" ");
        format!("({joined})")
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}
