//! Cache key namespacing and TTL table.
//!
//! Keys are namespaced `<kind>:<senderId>[:<folder>[:<uid>]]` so that
//! pattern-delete on invalidation can use an anchored regex without
//! risking prefix collisions between kinds (e.g. a `folder-status`
//! delete must never also match `folder-list`).

use std::time::Duration;

pub const TTL_API_KEY: Duration = Duration::from_secs(10 * 60);
pub const TTL_SENDERS: Duration = Duration::from_secs(10 * 60);
pub const TTL_FOLDERS: Duration = Duration::from_secs(5 * 60);
pub const TTL_FOLDER_STATUS: Duration = Duration::from_secs(2 * 60);
pub const TTL_MESSAGE_LIST: Duration = Duration::from_secs(2 * 60);
pub const TTL_MESSAGE: Duration = Duration::from_secs(2 * 60);
pub const TTL_BODY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn escape(segment: &str) -> String {
    segment.replace(':', "_")
}

#[must_use]
pub fn api_key(key_fingerprint: &str) -> String {
    format!("apikey:{}", escape(key_fingerprint))
}

#[must_use]
pub fn senders(workspace_id: &str) -> String {
    format!("senders:{}", escape(workspace_id))
}

#[must_use]
pub fn folders(sender_id: &str) -> String {
    format!("folders:{}", escape(sender_id))
}

#[must_use]
pub fn folder_status(sender_id: &str, folder: &str) -> String {
    format!("folder-status:{}:{}", escape(sender_id), escape(folder))
}

#[must_use]
pub fn message_list(sender_id: &str, folder: &str, query_suffix: &str) -> String {
    format!(
        "message-list:{}:{}:{}",
        escape(sender_id),
        escape(folder),
        escape(query_suffix)
    )
}

#[must_use]
pub fn message(sender_id: &str, folder: &str, uid: u32) -> String {
    format!("message:{}:{}:{uid}", escape(sender_id), escape(folder))
}

#[must_use]
pub fn body(sender_id: &str, folder: &str, uid: u32) -> String {
    format!("body:{}:{}:{uid}", escape(sender_id), escape(folder))
}

/// Anchored regex matching every key under a folder's message-list and
/// per-message/body caches, for invalidation after a write that changes
/// a folder's message set or status.
#[must_use]
pub fn folder_scope_pattern(sender_id: &str, folder: &str) -> String {
    format!(
        "^(message-list|message|body|folder-status):{}:{}(:|$)",
        regex::escape(&escape(sender_id)),
        regex::escape(&escape(folder))
    )
}

/// Anchored regex matching every cached entry invalidated by a change
/// to a single message: its own metadata and body, plus the folder's
/// message list and status (both of which summarize that message).
#[must_use]
pub fn message_scope_pattern(sender_id: &str, folder: &str, uid: u32) -> String {
    let sid = regex::escape(&escape(sender_id));
    let f = regex::escape(&escape(folder));
    format!("^((message|body):{sid}:{f}:{uid}$|(message-list|folder-status):{sid}:{f}(:|$))")
}

/// Anchored regex matching every cached entry for a sender, used after
/// `sync` and after folder create/delete: every key namespaced by this
/// exact sender id, plus the global `senders:*` list cache (which may
/// embed any sender and so is always dropped wholesale). The sender id
/// segment is anchored on both sides so `invalidateSender("abc")` never
/// matches a sibling id like `abcd`.
#[must_use]
pub fn sender_scope_pattern(sender_id: &str) -> String {
    let sid = regex::escape(&escape(sender_id));
    format!("^(senders:.*|(folders|folder-status|message-list|message):{sid}(:|$))")
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn folder_scope_pattern_matches_related_keys() {
        let re = Regex::new(&folder_scope_pattern("s1", "INBOX")).unwrap();
        assert!(re.is_match(&message("s1", "INBOX", 42)));
        assert!(re.is_match(&body("s1", "INBOX", 42)));
        assert!(re.is_match(&folder_status("s1", "INBOX")));
        assert!(re.is_match(&message_list("s1", "INBOX", "limit=10")));
        assert!(!re.is_match(&message("s1", "Sent", 42)));
    }

    #[test]
    fn message_scope_pattern_is_precise_about_the_uid() {
        let re = Regex::new(&message_scope_pattern("s1", "INBOX", 42)).unwrap();
        assert!(re.is_match(&message("s1", "INBOX", 42)));
        assert!(!re.is_match(&message("s1", "INBOX", 43)));
        assert!(!re.is_match(&message("s1", "Sent", 42)));
    }

    #[test]
    fn message_scope_pattern_also_drops_the_folders_list_and_status() {
        let re = Regex::new(&message_scope_pattern("s1", "INBOX", 42)).unwrap();
        assert!(re.is_match(&folder_status("s1", "INBOX")));
        assert!(re.is_match(&message_list("s1", "INBOX", "limit=10")));
        assert!(!re.is_match(&folder_status("s1", "Sent")));
    }

    #[test]
    fn sender_scope_pattern_does_not_match_sibling_prefix() {
        let re = Regex::new(&sender_scope_pattern("abc")).unwrap();
        assert!(re.is_match(&folders("abc")));
        assert!(re.is_match(&folder_status("abc", "INBOX")));
        assert!(!re.is_match(&folders("abcd")));
        assert!(!re.is_match(&folder_status("abcd", "INBOX")));
    }

    #[test]
    fn sender_scope_pattern_always_drops_global_sender_list() {
        let re = Regex::new(&sender_scope_pattern("abc")).unwrap();
        assert!(re.is_match(&senders("other-workspace")));
    }
}
