//! Folder special-use tags and mailbox-name normalization.
//!
//! Provides the RFC 6154 special-use vocabulary plus the alias table and
//! normalization rules the gateway uses to resolve mailbox names:
//! client folder names coming from Apple Mail, Outlook, and Gmail vary
//! wildly (`Deleted Messages`, `[Gmail]/Sent Mail`, ...) and must
//! collapse onto the small set of canonical names the upstream
//! actually uses.

use std::fmt;

/// RFC 6154 special-use tag for a folder, as reported by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialUse {
    Inbox,
    Sent,
    Drafts,
    Trash,
    Archive,
    Junk,
}

impl SpecialUse {
    /// Parse the upstream's lowercase tag string (`"inbox"`, `"sent"`, ...).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "inbox" => Some(Self::Inbox),
            "sent" => Some(Self::Sent),
            "drafts" => Some(Self::Drafts),
            "trash" => Some(Self::Trash),
            "archive" => Some(Self::Archive),
            "junk" => Some(Self::Junk),
            _ => None,
        }
    }

    /// The IMAP backslash atom used in a `LIST` flags list, e.g. `\Inbox`.
    #[must_use]
    pub const fn as_backslash_atom(self) -> &'static str {
        match self {
            Self::Inbox => "\\Inbox",
            Self::Sent => "\\Sent",
            Self::Drafts => "\\Drafts",
            Self::Trash => "\\Trash",
            Self::Archive => "\\Archive",
            Self::Junk => "\\Junk",
        }
    }
}

impl fmt::Display for SpecialUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_backslash_atom())
    }
}

/// Fixed alias table mapping well-known client-side folder names to the
/// gateway's canonical names. Comparison is case-insensitive; the table
/// itself stores the canonical capitalization on the right.
const ALIASES: &[(&str, &str)] = &[
    ("inbox", "INBOX"),
    ("sent messages", "Sent"),
    ("sent items", "Sent"),
    ("sent mail", "Sent"),
    ("[gmail]/sent mail", "Sent"),
    ("drafts", "Drafts"),
    ("draft", "Drafts"),
    ("[gmail]/drafts", "Drafts"),
    ("deleted messages", "Trash"),
    ("deleted items", "Trash"),
    ("trash", "Trash"),
    ("[gmail]/trash", "Trash"),
    ("junk e-mail", "Junk"),
    ("junk", "Junk"),
    ("spam", "Junk"),
    ("[gmail]/spam", "Junk"),
    ("archive", "Archive"),
    ("all mail", "Archive"),
    ("[gmail]/all mail", "Archive"),
];

/// Normalize a client-supplied folder name against the alias table. Names
/// not found in the table pass through unchanged (a user-created folder
/// keeps its own name).
#[must_use]
pub fn normalize_folder_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    for (alias, canonical) in ALIASES {
        if lower == *alias {
            return (*canonical).to_string();
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_use_round_trips() {
        assert_eq!(SpecialUse::from_tag("inbox"), Some(SpecialUse::Inbox));
        assert_eq!(SpecialUse::Inbox.as_backslash_atom(), "\\Inbox");
        assert_eq!(SpecialUse::from_tag("bogus"), None);
    }

    #[test]
    fn normalizes_apple_deleted_messages() {
        assert_eq!(normalize_folder_name("Deleted Messages"), "Trash");
    }

    #[test]
    fn normalizes_outlook_deleted_items() {
        assert_eq!(normalize_folder_name("Deleted Items"), "Trash");
    }

    #[test]
    fn normalizes_gmail_variants() {
        assert_eq!(normalize_folder_name("[Gmail]/Sent Mail"), "Sent");
        assert_eq!(normalize_folder_name("[Gmail]/All Mail"), "Archive");
    }

    #[test]
    fn normalization_is_case_insensitive() {
        assert_eq!(normalize_folder_name("JUNK E-MAIL"), "Junk");
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(normalize_folder_name("My Projects"), "My Projects");
    }

    #[test]
    fn display_matches_backslash_atom() {
        assert_eq!(format!("{}", SpecialUse::Trash), "\\Trash");
    }
}
