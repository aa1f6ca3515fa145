//! Per-connection session state.
//!
//! Each `Session` owns its own socket buffer (via the framer), message
//! UID vector, idle timer, and literal-in-progress state -- never
//! shared across connections. The Cache Manager and upstream client are
//! injected and shared.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotAuthenticated,
    Authenticated,
    Selected,
    Logout,
}

#[derive(Debug, Clone)]
pub struct SelectedFolder {
    pub sender_id: String,
    pub name: String,
    pub uid_validity: u64,
    pub uid_next: u64,
    pub read_write: bool,
    /// Ascending, deduplicated UIDs of every message in the folder at
    /// selection time, kept in sync as commands splice it: always
    /// strictly ascending, with length equal to the folder's EXISTS
    /// count.
    pub message_uids: Vec<u32>,
}

pub struct Session {
    pub state: SessionState,
    /// Set once LOGIN resolves to a specific sender (an email username);
    /// `None` when the session logged in as `api`/`*` ("any sender").
    pub pinned_sender: Option<String>,
    pub workspace_id: Option<String>,
    /// The upstream API key bound by a successful LOGIN/AUTHENTICATE.
    /// `None` before authentication; the connection loop uses this (not
    /// the password on the wire) to build the [`crate::upstream::adapter::ApiClient`]
    /// for every later command.
    pub api_key: Option<String>,
    pub selected: Option<SelectedFolder>,
    pub idling: bool,
    pub idle_tag: Option<String>,
    pub idle_timeout: Duration,
}

impl Session {
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            state: SessionState::NotAuthenticated,
            pinned_sender: None,
            workspace_id: None,
            api_key: None,
            selected: None,
            idling: false,
            idle_tag: None,
            idle_timeout,
        }
    }

    #[must_use]
    pub const fn command_allowed(&self, name: &str) -> bool {
        match name {
            "CAPABILITY" | "NOOP" | "LOGOUT" => true,
            "LOGIN" | "AUTHENTICATE" => matches!(self.state, SessionState::NotAuthenticated),
            "LIST" | "LSUB" | "STATUS" | "SELECT" | "EXAMINE" | "CREATE" | "DELETE"
            | "SUBSCRIBE" | "UNSUBSCRIBE" | "APPEND" | "NAMESPACE" | "RENAME" => matches!(
                self.state,
                SessionState::Authenticated | SessionState::Selected
            ),
            "CHECK" | "CLOSE" | "EXPUNGE" | "SEARCH" | "FETCH" | "STORE" | "COPY" | "MOVE"
            | "IDLE" => matches!(self.state, SessionState::Selected),
            _ => false,
        }
    }

    /// Sequence number for a UID in the currently selected folder,
    /// 1-based, recomputed against the *current* vector (MOVE/EXPUNGE
    /// require recomputation after every splice).
    #[must_use]
    pub fn sequence_of(&self, uid: u32) -> Option<usize> {
        self.selected
            .as_ref()
            .and_then(|f| f.message_uids.iter().position(|&u| u == uid))
            .map(|idx| idx + 1)
    }

    /// Remove a UID from the selected folder's vector, used by
    /// MOVE/EXPUNGE to keep subsequent sequence numbers correct.
    pub fn splice_uid(&mut self, uid: u32) {
        if let Some(folder) = self.selected.as_mut() {
            folder.message_uids.retain(|&u| u != uid);
        }
    }
}
