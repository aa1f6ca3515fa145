//! Command dispatch: turns a parsed [`Command`] plus the current
//! [`Session`] into an ordered list of [`Response`]s, the last of which
//! is tagged. Every error path here is caught and turned into a wire
//! response rather than propagated out of the connection loop.

use base64::Engine as _;
use tracing::warn;

use crate::error::Error;
use crate::flag::Flag;
use crate::upstream::adapter::ApiClient;
use crate::upstream::models::MessageFields;

use super::commands::{self, Command, StoreAction};
use super::formatter;
use super::parser::command::{unquote, ParsedCommand};
use super::parser::fetch_items::{self, FetchItem};
use super::parser::sequence;
use super::response::Response;
use super::rfc822;
use super::session::{SelectedFolder, Session, SessionState};

const SERVER_CAPABILITIES: &str =
    "IMAP4rev1 IDLE NAMESPACE UIDPLUS MOVE SPECIAL-USE AUTH=PLAIN AUTH=LOGIN";

const MESSAGE_LIST_CEILING: u32 = 10_000;

pub async fn dispatch(
    session: &mut Session,
    client: &ApiClient,
    parsed: &ParsedCommand,
) -> Vec<Response> {
    if !session.command_allowed(&parsed.name) {
        return vec![Response::bad(
            &parsed.tag,
            format!("{} not allowed in current state", parsed.name),
        )];
    }

    let command = match commands::from_parsed(parsed) {
        Ok(c) => c,
        Err(e) => return vec![formatter::to_imap_response(&parsed.tag, &e)],
    };

    handle(session, client, &parsed.tag, command, None).await
}

/// Dispatch an `APPEND` once its literal payload has arrived. The
/// framer delivers the command line and the literal as two separate
/// frames; the session layer re-parses the line to rebuild the
/// [`Command::Append`] and attaches `literal` here.
pub async fn dispatch_append(
    session: &mut Session,
    client: &ApiClient,
    parsed: &ParsedCommand,
    literal: Vec<u8>,
) -> Vec<Response> {
    if !session.command_allowed(&parsed.name) {
        return vec![Response::bad(&parsed.tag, "APPEND not allowed in current state")];
    }
    let command = match commands::from_parsed(parsed) {
        Ok(c) => c,
        Err(e) => return vec![formatter::to_imap_response(&parsed.tag, &e)],
    };
    handle(session, client, &parsed.tag, command, Some(literal)).await
}

async fn handle(
    session: &mut Session,
    client: &ApiClient,
    tag: &str,
    command: Command,
    append_literal: Option<Vec<u8>>,
) -> Vec<Response> {
    match command {
        Command::Capability => vec![
            Response::Untagged(format!("CAPABILITY {SERVER_CAPABILITIES}")),
            Response::ok(tag, "CAPABILITY completed"),
        ],
        Command::Noop | Command::Check => vec![Response::ok(tag, "completed")],
        Command::Logout => {
            session.state = SessionState::Logout;
            vec![
                Response::Untagged("BYE logging out".to_string()),
                Response::ok(tag, "LOGOUT completed"),
            ]
        }
        Command::Login { username, password } => handle_login(session, client, tag, &username, &password).await,
        Command::Authenticate { mechanism, initial_response } => {
            handle_authenticate(session, client, tag, &mechanism, initial_response.as_deref()).await
        }
        Command::List { reference, pattern } => {
            handle_list_lsub(session, client, tag, &reference, &pattern, "LIST").await
        }
        Command::Lsub { reference, pattern } => {
            handle_list_lsub(session, client, tag, &reference, &pattern, "LSUB").await
        }
        Command::Status { mailbox, items } => handle_status(session, client, tag, &mailbox, &items).await,
        Command::Select { mailbox } => handle_select(session, client, tag, &mailbox, true).await,
        Command::Examine { mailbox } => handle_select(session, client, tag, &mailbox, false).await,
        Command::Create { mailbox } => handle_create(session, client, tag, &mailbox).await,
        Command::Delete { mailbox } => handle_delete(session, client, tag, &mailbox).await,
        Command::Rename { .. } => vec![Response::no(tag, "RENAME not supported")],
        Command::Subscribe { .. } => vec![Response::ok(tag, "SUBSCRIBE completed")],
        Command::Unsubscribe { .. } => vec![Response::ok(tag, "UNSUBSCRIBE completed")],
        Command::Append { mailbox, flags, date, .. } => {
            handle_append(session, client, tag, &mailbox, &flags, date.as_deref(), append_literal.unwrap_or_default()).await
        }
        Command::Close => handle_close(session, client, tag).await,
        Command::Expunge => handle_expunge(session, client, tag).await,
        Command::Search { use_uid, keys } => handle_search(session, client, tag, use_uid, &keys).await,
        Command::Fetch { use_uid, sequence_set, items } => {
            handle_fetch(session, client, tag, use_uid, &sequence_set, &items).await
        }
        Command::Store { use_uid, sequence_set, action, silent, flags } => {
            handle_store(session, client, tag, use_uid, &sequence_set, action, silent, &flags).await
        }
        Command::Copy { use_uid, sequence_set, mailbox } => {
            handle_copy(session, client, tag, use_uid, &sequence_set, &mailbox).await
        }
        Command::Move { use_uid, sequence_set, mailbox } => {
            handle_move(session, client, tag, use_uid, &sequence_set, &mailbox).await
        }
        Command::Idle => {
            session.idling = true;
            session.idle_tag = Some(tag.to_string());
            vec![Response::Continuation("idling".to_string())]
        }
        Command::Namespace => vec![
            Response::Untagged(r#"NAMESPACE (("" "/")) NIL NIL"#.to_string()),
            Response::ok(tag, "NAMESPACE completed"),
        ],
    }
}

/// Called when the framer delivers `DONE` while `session.idling` is
/// set, or when the idle timer fires.
#[must_use]
pub fn end_idle(session: &mut Session, timed_out: bool) -> Vec<Response> {
    session.idling = false;
    let Some(tag) = session.idle_tag.take() else {
        return Vec::new();
    };
    if timed_out {
        vec![Response::ok(tag, "IDLE terminated (timeout)")]
    } else {
        vec![Response::ok(tag, "IDLE terminated")]
    }
}

fn password_has_valid_prefix(password: &str) -> bool {
    password.starts_with("pm_live_") || password.starts_with("pm_test_")
}

/// Extract the (username, password) pair a `LOGIN` or inline-SASL-PLAIN
/// `AUTHENTICATE` command is about to try, before it is dispatched.
///
/// The password *is* the upstream API key (see [`Command::Login`]), but
/// `ApiClient` binds its key at construction time, and the same `client`
/// reference is handed to every command including the one that
/// validates it. The connection loop calls this first so it can build
/// (or rebuild) the `ApiClient` with the right candidate key before
/// calling [`dispatch`]/[`dispatch_append`].
#[must_use]
pub fn peek_credentials(parsed: &ParsedCommand) -> Option<(String, String)> {
    match parsed.name.as_str() {
        "LOGIN" => {
            let username = unquote(parsed.args.first()?);
            let password = unquote(parsed.args.get(1)?);
            Some((username, password))
        }
        "AUTHENTICATE" if parsed.args.first().is_some_and(|m| m.eq_ignore_ascii_case("PLAIN")) => {
            decode_sasl_plain(parsed.args.get(1)?)
        }
        _ => None,
    }
}

/// Decode a SASL PLAIN initial response (`authzid\0authcid\0password`,
/// base64) into `(authcid, password)`.
fn decode_sasl_plain(encoded: &str) -> Option<(String, String)> {
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let parts: Vec<&[u8]> = decoded.splitn(3, |&b| b == 0).collect();
    if parts.len() != 3 {
        return None;
    }
    let authcid = String::from_utf8_lossy(parts[1]).into_owned();
    let password = String::from_utf8_lossy(parts[2]).into_owned();
    Some((authcid, password))
}

async fn bind_sender(
    session: &mut Session,
    client: &ApiClient,
    workspace_id: &str,
    username: &str,
) -> Result<(), Error> {
    if username == "api" || username == "*" {
        session.pinned_sender = None;
        return Ok(());
    }
    match client.get_sender_by_email(workspace_id, username).await? {
        Some(sender) => {
            session.pinned_sender = Some(sender.id);
            Ok(())
        }
        None => Err(Error::AuthFailure(format!("no sender for {username}"))),
    }
}

async fn handle_login(
    session: &mut Session,
    client: &ApiClient,
    tag: &str,
    username: &str,
    password: &str,
) -> Vec<Response> {
    if !password_has_valid_prefix(password) {
        return vec![Response::no_coded(tag, "AUTHENTICATIONFAILED", "invalid credentials")];
    }
    let workspace_id = match client.validate_key().await {
        Ok(id) => id,
        Err(_) => return vec![Response::no_coded(tag, "AUTHENTICATIONFAILED", "invalid credentials")],
    };
    if let Err(e) = bind_sender(session, client, &workspace_id, username).await {
        return vec![Response::no_coded(tag, "AUTHENTICATIONFAILED", e.short_message())];
    }
    session.workspace_id = Some(workspace_id);
    session.api_key = Some(password.to_string());
    session.state = SessionState::Authenticated;
    vec![Response::ok(tag, "LOGIN completed")]
}

async fn handle_authenticate(
    session: &mut Session,
    client: &ApiClient,
    tag: &str,
    mechanism: &str,
    initial_response: Option<&str>,
) -> Vec<Response> {
    if mechanism != "PLAIN" {
        return vec![Response::no(tag, "unsupported SASL mechanism")];
    }
    let Some(encoded) = initial_response else {
        // A real server would emit a continuation and read the next
        // line; this gateway requires the inline initial response.
        return vec![Response::bad(tag, "AUTHENTICATE PLAIN requires an initial response")];
    };
    let Some((authcid, password)) = decode_sasl_plain(encoded) else {
        return vec![Response::bad(tag, "malformed SASL PLAIN response")];
    };
    handle_login(session, client, tag, &authcid, &password).await
}

async fn accessible_senders(
    session: &Session,
    client: &ApiClient,
    workspace_id: &str,
) -> Result<Vec<crate::upstream::models::Sender>, Error> {
    if let Some(sender_id) = &session.pinned_sender {
        let senders = client.list_senders(workspace_id).await?;
        Ok(senders.into_iter().filter(|s| &s.id == sender_id).collect())
    } else {
        client.list_senders(workspace_id).await
    }
}

async fn handle_list_lsub(
    session: &Session,
    client: &ApiClient,
    tag: &str,
    _reference: &str,
    pattern: &str,
    command_name: &str,
) -> Vec<Response> {
    let Some(workspace_id) = session.workspace_id.clone() else {
        return vec![Response::bad(tag, "not authenticated")];
    };
    let senders = match accessible_senders(session, client, &workspace_id).await {
        Ok(s) => s,
        Err(e) => return vec![Response::no(tag, e.short_message())],
    };

    let mut responses = Vec::new();
    for sender in &senders {
        let folders = match client.list_folders(&sender.id).await {
            Ok(f) => f,
            Err(_) => continue,
        };
        for folder in folders {
            let display_name = if session.pinned_sender.is_some() {
                folder.name.clone()
            } else {
                format!("{}/{}", sender.email, folder.name)
            };
            if !wildcard_match(pattern, &display_name) {
                continue;
            }
            let mut flags = Vec::new();
            if let Some(special) = folder.special_use_tag() {
                flags.push(special.as_backslash_atom().to_string());
            }
            let mut line = Vec::new();
            formatter::list_response(&mut line, &flags, "/", &display_name);
            responses.push(Response::UntaggedRaw({
                let mut raw = b"* ".to_vec();
                raw.extend_from_slice(&line);
                raw.extend_from_slice(b"\r\n");
                raw
            }));
        }
    }
    responses.push(Response::ok(tag, format!("{command_name} completed")));
    responses
}

/// Minimal IMAP wildcard matcher: `*` matches any run of characters
/// (including `/`), `%` matches any run except `/`.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    fn matches(pat: &[char], name: &[char]) -> bool {
        match pat.first() {
            None => name.is_empty(),
            Some('*') => {
                (0..=name.len()).any(|i| matches(&pat[1..], &name[i..]))
            }
            Some('%') => (0..=name.len())
                .take_while(|&i| !name[..i].contains(&'/'))
                .any(|i| matches(&pat[1..], &name[i..])),
            Some(c) => name.first() == Some(c) && matches(&pat[1..], &name[1..]),
        }
    }
    let pat: Vec<char> = pattern.chars().collect();
    let name_chars: Vec<char> = name.chars().collect();
    matches(&pat, &name_chars)
}

async fn resolve_or_reply(
    session: &Session,
    client: &ApiClient,
    tag: &str,
    mailbox: &str,
) -> Result<crate::upstream::adapter::ResolvedMailbox, Vec<Response>> {
    let Some(workspace_id) = session.workspace_id.clone() else {
        return Err(vec![Response::bad(tag, "not authenticated")]);
    };
    match client
        .resolve_mailbox(&workspace_id, session.pinned_sender.as_deref(), mailbox)
        .await
    {
        Ok(Some(resolved)) => Ok(resolved),
        Ok(None) => Err(vec![Response::no(tag, "mailbox not found")]),
        Err(e) => Err(vec![Response::no(tag, e.short_message())]),
    }
}

async fn handle_status(
    session: &Session,
    client: &ApiClient,
    tag: &str,
    mailbox: &str,
    items: &[String],
) -> Vec<Response> {
    let resolved = match resolve_or_reply(session, client, tag, mailbox).await {
        Ok(r) => r,
        Err(responses) => return responses,
    };
    let status = match client.folder_status(&resolved.sender_id, &resolved.folder).await {
        Ok(s) => s,
        Err(e) => return vec![Response::no(tag, e.short_message())],
    };

    let mut parts = Vec::new();
    for item in items {
        match item.as_str() {
            "MESSAGES" => parts.push(format!("MESSAGES {}", status.exists)),
            "RECENT" => parts.push(format!("RECENT {}", status.recent)),
            "UIDNEXT" => parts.push(format!("UIDNEXT {}", status.uid_next)),
            "UIDVALIDITY" => parts.push(format!("UIDVALIDITY {}", status.uid_validity)),
            "UNSEEN" => parts.push(format!("UNSEEN {}", status.unseen)),
            _ => {}
        }
    }
    vec![
        Response::Untagged(format!("STATUS \"{mailbox}\" ({})", parts.join(" "))),
        Response::ok(tag, "STATUS completed"),
    ]
}

async fn handle_select(
    session: &mut Session,
    client: &ApiClient,
    tag: &str,
    mailbox: &str,
    read_write: bool,
) -> Vec<Response> {
    let resolved = match resolve_or_reply(session, client, tag, mailbox).await {
        Ok(r) => r,
        Err(responses) => return responses,
    };
    let status = match client.folder_status(&resolved.sender_id, &resolved.folder).await {
        Ok(s) => s,
        Err(e) => return vec![Response::no(tag, e.short_message())],
    };

    let fields = MessageFields {
        uid: true,
        flags: true,
        ..Default::default()
    };
    let messages = match client
        .list_messages(&resolved.sender_id, &resolved.folder, None, fields, Some(MESSAGE_LIST_CEILING), None)
        .await
    {
        Ok(m) => m,
        Err(e) => return vec![Response::no(tag, e.short_message())],
    };
    let mut uids: Vec<u32> = messages.iter().map(|m| m.uid).collect();
    uids.sort_unstable();
    uids.dedup();

    let unseen_index = messages
        .iter()
        .filter(|m| !m.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Seen")))
        .map(|m| m.uid)
        .min()
        .and_then(|uid| uids.iter().position(|u| *u == uid))
        .map(|i| i + 1);

    session.selected = Some(SelectedFolder {
        sender_id: resolved.sender_id,
        name: resolved.folder,
        uid_validity: status.uid_validity,
        uid_next: status.uid_next,
        read_write,
        message_uids: uids,
    });
    session.state = SessionState::Selected;

    let mut responses = vec![
        Response::Untagged(format!("{} EXISTS", status.exists)),
        Response::Untagged(format!("{} RECENT", status.recent)),
        Response::Untagged(format!(
            "FLAGS ({})",
            Flag::render_list(&[Flag::Seen, Flag::Answered, Flag::Flagged, Flag::Deleted, Flag::Draft])
                .trim_start_matches('(')
                .trim_end_matches(')')
        )),
        Response::Untagged(
            "OK [PERMANENTFLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)] Flags permitted"
                .to_string(),
        ),
    ];
    responses.push(Response::Untagged(format!(
        "OK [UIDVALIDITY {}] UIDs valid",
        status.uid_validity
    )));
    responses.push(Response::Untagged(format!("OK [UIDNEXT {}]", status.uid_next)));
    if let Some(seq) = unseen_index {
        responses.push(Response::Untagged(format!("OK [UNSEEN {seq}]")));
    }
    let code = if read_write { "READ-WRITE" } else { "READ-ONLY" };
    responses.push(Response::ok_coded(tag, code, "SELECT completed"));
    responses
}

async fn handle_create(session: &Session, client: &ApiClient, tag: &str, mailbox: &str) -> Vec<Response> {
    let Some(sender_id) = session.pinned_sender.clone() else {
        return vec![Response::no(tag, "CREATE requires a pinned sender")];
    };
    match client.create_folder(&sender_id, &crate::folder::normalize_folder_name(mailbox)).await {
        Ok(()) => vec![Response::ok(tag, "CREATE completed")],
        Err(e) => vec![Response::no(tag, e.short_message())],
    }
}

async fn handle_delete(session: &Session, client: &ApiClient, tag: &str, mailbox: &str) -> Vec<Response> {
    let resolved = match resolve_or_reply(session, client, tag, mailbox).await {
        Ok(r) => r,
        Err(responses) => return responses,
    };
    match client.delete_folder(&resolved.sender_id, &resolved.folder).await {
        Ok(()) => vec![Response::ok(tag, "DELETE completed")],
        Err(e) => vec![Response::no(tag, e.short_message())],
    }
}

async fn handle_append(
    session: &Session,
    client: &ApiClient,
    tag: &str,
    mailbox: &str,
    flags: &[String],
    date: Option<&str>,
    message: Vec<u8>,
) -> Vec<Response> {
    let resolved = match resolve_or_reply(session, client, tag, mailbox).await {
        Ok(r) => r,
        Err(_) => return vec![Response::no_coded(tag, "TRYCREATE", "mailbox not found")],
    };
    let parsed_date = date.and_then(|d| super::parser::date::parse_date_time(d).ok());
    let flags = if flags.is_empty() { None } else { Some(flags.to_vec()) };

    match client
        .append_message(&resolved.sender_id, &resolved.folder, &message, flags, parsed_date)
        .await
    {
        Ok(new_uid) => {
            let status = client
                .folder_status(&resolved.sender_id, &resolved.folder)
                .await
                .ok();
            let uid_validity = status.map_or(0, |s| s.uid_validity);
            vec![Response::ok_coded(
                tag,
                format!("APPENDUID {uid_validity} {new_uid}"),
                "APPEND completed",
            )]
        }
        Err(e) => vec![Response::no(tag, e.short_message())],
    }
}

async fn handle_close(session: &mut Session, client: &ApiClient, tag: &str) -> Vec<Response> {
    // CLOSE silently expunges \Deleted messages but emits no untagged
    // EXPUNGE.
    if let Some(folder) = session.selected.clone() {
        if let Err(e) = expunge_deleted(session, client, &folder, false).await {
            session.state = SessionState::Authenticated;
            session.selected = None;
            return vec![Response::no(tag, e.short_message())];
        }
    }
    session.state = SessionState::Authenticated;
    session.selected = None;
    vec![Response::ok(tag, "CLOSE completed")]
}

async fn handle_expunge(session: &mut Session, client: &ApiClient, tag: &str) -> Vec<Response> {
    let Some(folder) = session.selected.clone() else {
        return vec![Response::bad(tag, "no mailbox selected")];
    };
    match expunge_deleted(session, client, &folder, true).await {
        Ok(mut responses) => {
            responses.push(Response::ok(tag, "EXPUNGE completed"));
            responses
        }
        Err(e) => vec![Response::no(tag, e.short_message())],
    }
}

async fn expunge_deleted(
    session: &mut Session,
    client: &ApiClient,
    folder: &SelectedFolder,
    emit_untagged: bool,
) -> Result<Vec<Response>, Error> {
    let fields = MessageFields {
        uid: true,
        flags: true,
        ..Default::default()
    };
    let messages = client
        .list_messages(&folder.sender_id, &folder.name, None, fields, Some(MESSAGE_LIST_CEILING), None)
        .await?;
    let mut responses = Vec::new();
    for msg in messages {
        if !msg.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Deleted")) {
            continue;
        }
        client
            .delete_message(&folder.sender_id, &folder.name, msg.uid, true)
            .await?;
        if let Some(seq) = session.sequence_of(msg.uid) {
            if emit_untagged {
                responses.push(Response::Untagged(format!("{seq} EXPUNGE")));
            }
        }
        session.splice_uid(msg.uid);
    }
    Ok(responses)
}

async fn handle_search(
    session: &Session,
    client: &ApiClient,
    tag: &str,
    use_uid: bool,
    keys: &[crate::imap::parser::search::SearchKey],
) -> Vec<Response> {
    let Some(folder) = session.selected.as_ref() else {
        return vec![Response::bad(tag, "no mailbox selected")];
    };
    let uids = match client.search(&folder.sender_id, &folder.name, &keys.to_vec()).await {
        Ok(u) => u,
        Err(e) => return vec![Response::no(tag, e.short_message())],
    };

    let results: Vec<u32> = if use_uid {
        uids
    } else {
        uids.into_iter()
            .filter_map(|uid| session.sequence_of(uid).map(|s| s as u32))
            .collect()
    };

    let body = results
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        Response::Untagged(format!("SEARCH {body}").trim_end().to_string()),
        Response::ok(tag, "SEARCH completed"),
    ]
}

async fn handle_fetch(
    session: &Session,
    client: &ApiClient,
    tag: &str,
    use_uid: bool,
    sequence_set: &str,
    items: &[FetchItem],
) -> Vec<Response> {
    let Some(folder) = session.selected.as_ref() else {
        return vec![Response::bad(tag, "no mailbox selected")];
    };
    let max = if use_uid {
        folder.message_uids.last().copied().unwrap_or(0)
    } else {
        folder.message_uids.len() as u32
    };
    let resolved = match sequence::resolve(sequence_set, max) {
        Ok(r) => r,
        Err(e) => return vec![Response::bad(tag, e.short_message())],
    };
    let target_uids = sequence::resolve_to_uids(&resolved, &folder.message_uids, use_uid);

    let needs_body = fetch_items::needs_body(items);
    let needs_envelope = items.iter().any(|i| matches!(i, FetchItem::Envelope))
        || (needs_body && items.iter().any(|i| matches!(i, FetchItem::Rfc822Header)));
    let peek = needs_body && fetch_items::all_body_items_peek(items);

    let fields = MessageFields {
        flags: items.iter().any(|i| matches!(i, FetchItem::Flags)),
        uid: true,
        internal_date: items.iter().any(|i| matches!(i, FetchItem::InternalDate)),
        size: items.iter().any(|i| matches!(i, FetchItem::Rfc822Size)),
        envelope: needs_envelope,
        body_structure: items.iter().any(|i| matches!(i, FetchItem::BodyStructure)),
    };

    let messages = match client
        .list_messages(&folder.sender_id, &folder.name, Some(&target_uids), fields, None, None)
        .await
    {
        Ok(m) => m,
        Err(e) => return vec![Response::no(tag, e.short_message())],
    };

    let mut responses = Vec::new();
    for msg in messages {
        let Some(seq) = session.sequence_of(msg.uid) else {
            continue;
        };

        let body = if needs_body {
            match client.get_body(&folder.sender_id, &folder.name, msg.uid, peek).await {
                Ok(b) => Some(b),
                Err(e) => {
                    warn!(uid = msg.uid, error = %e, "skipping message body fetch error");
                    continue;
                }
            }
        } else {
            None
        };

        let mut line = format!("{seq} FETCH (").into_bytes();
        let mut first = true;
        for item in items {
            if !first {
                line.push(b' ');
            }
            first = false;
            push_fetch_item(&mut line, item, &msg, body.as_ref());
        }
        line.push(b')');
        let mut raw = b"* ".to_vec();
        raw.extend_from_slice(&line);
        raw.extend_from_slice(b"\r\n");
        responses.push(Response::UntaggedRaw(raw));
    }
    responses.push(Response::ok(tag, "FETCH completed"));
    responses
}

fn push_fetch_item(
    out: &mut Vec<u8>,
    item: &FetchItem,
    msg: &crate::upstream::models::MailboxMessage,
    body: Option<&crate::upstream::models::Body>,
) {
    match item {
        FetchItem::Flags => {
            out.extend_from_slice(b"FLAGS (");
            out.extend_from_slice(msg.flags.join(" ").as_bytes());
            out.push(b')');
        }
        FetchItem::Uid => out.extend_from_slice(format!("UID {}", msg.uid).as_bytes()),
        FetchItem::InternalDate => {
            out.extend_from_slice(b"INTERNALDATE ");
            formatter::push_string(out, &formatter::imap_internal_date(&msg.internal_date));
        }
        FetchItem::Rfc822Size => out.extend_from_slice(format!("RFC822.SIZE {}", msg.size).as_bytes()),
        FetchItem::Envelope => {
            out.extend_from_slice(b"ENVELOPE ");
            if let Some(env) = &msg.envelope {
                formatter::push_envelope(out, env);
            } else {
                out.extend_from_slice(b"NIL");
            }
        }
        FetchItem::BodyStructure => {
            out.extend_from_slice(b"BODYSTRUCTURE ");
            if let Some(bs) = &msg.body_structure {
                formatter::push_body_structure(out, bs);
            } else {
                out.extend_from_slice(b"NIL");
            }
        }
        FetchItem::Rfc822 => {
            let full = rfc822::reconstruct(body, msg.envelope.as_ref());
            out.extend_from_slice(b"RFC822 ");
            formatter::push_literal(out, &full);
        }
        FetchItem::Rfc822Header => {
            let full = rfc822::reconstruct(body, msg.envelope.as_ref());
            let (header, _) = rfc822::split_header_body(&full);
            out.extend_from_slice(b"RFC822.HEADER ");
            formatter::push_literal(out, header);
        }
        FetchItem::Rfc822Text => {
            let full = rfc822::reconstruct(body, msg.envelope.as_ref());
            let (_, text) = rfc822::split_header_body(&full);
            out.extend_from_slice(b"RFC822.TEXT ");
            formatter::push_literal(out, text);
        }
        FetchItem::Body { section, partial, .. } => {
            let full = rfc822::reconstruct(body, msg.envelope.as_ref());
            let extracted = rfc822::extract_section(&full, section, body);
            let sliced = rfc822::apply_partial(&extracted, *partial);
            out.extend_from_slice(b"BODY[");
            push_section_label(out, section);
            out.push(b']');
            if let Some(p) = partial {
                out.extend_from_slice(format!("<{}>", p.start).as_bytes());
            }
            out.push(b' ');
            formatter::push_literal(out, &sliced);
        }
    }
}

fn push_section_label(out: &mut Vec<u8>, section: &super::parser::fetch_items::Section) {
    use super::parser::fetch_items::Section;
    match section {
        Section::Full => {}
        Section::Header => out.extend_from_slice(b"HEADER"),
        Section::Text => out.extend_from_slice(b"TEXT"),
        Section::HeaderFields(fields) => {
            out.extend_from_slice(b"HEADER.FIELDS (");
            out.extend_from_slice(fields.join(" ").as_bytes());
            out.push(b')');
        }
        Section::HeaderFieldsNot(fields) => {
            out.extend_from_slice(b"HEADER.FIELDS.NOT (");
            out.extend_from_slice(fields.join(" ").as_bytes());
            out.push(b')');
        }
        Section::Mime(path) => {
            out.extend_from_slice(&join_path(path));
            if !path.is_empty() {
                out.push(b'.');
            }
            out.extend_from_slice(b"MIME");
        }
        Section::Part(path) => out.extend_from_slice(&join_path(path)),
        Section::PartHeader(path) => {
            out.extend_from_slice(&join_path(path));
            out.extend_from_slice(b".HEADER");
        }
        Section::PartText(path) => {
            out.extend_from_slice(&join_path(path));
            out.extend_from_slice(b".TEXT");
        }
    }
}

fn join_path(path: &[u32]) -> Vec<u8> {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
        .into_bytes()
}

async fn handle_store(
    session: &Session,
    client: &ApiClient,
    tag: &str,
    use_uid: bool,
    sequence_set: &str,
    action: StoreAction,
    silent: bool,
    flags: &[String],
) -> Vec<Response> {
    let Some(folder) = session.selected.as_ref() else {
        return vec![Response::bad(tag, "no mailbox selected")];
    };
    let max = if use_uid {
        folder.message_uids.last().copied().unwrap_or(0)
    } else {
        folder.message_uids.len() as u32
    };
    let resolved = match sequence::resolve(sequence_set, max) {
        Ok(r) => r,
        Err(e) => return vec![Response::bad(tag, e.short_message())],
    };
    let target_uids = sequence::resolve_to_uids(&resolved, &folder.message_uids, use_uid);

    let mut responses = Vec::new();
    for uid in target_uids {
        let desired = match action {
            StoreAction::Set => flags.to_vec(),
            StoreAction::Add | StoreAction::Remove => {
                let current = match client
                    .get_message(
                        &folder.sender_id,
                        &folder.name,
                        uid,
                        MessageFields { flags: true, uid: true, ..Default::default() },
                    )
                    .await
                {
                    Ok(Some(m)) => m.flags,
                    _ => continue,
                };
                if action == StoreAction::Add {
                    let mut merged = current;
                    for f in flags {
                        if !merged.contains(f) {
                            merged.push(f.clone());
                        }
                    }
                    merged
                } else {
                    current.into_iter().filter(|f| !flags.contains(f)).collect()
                }
            }
        };

        let new_flags = match client.update_flags(&folder.sender_id, &folder.name, uid, desired).await {
            Ok(f) => f,
            Err(e) => {
                warn!(uid, error = %e, "STORE failed for message, skipping");
                continue;
            }
        };

        if !silent {
            if let Some(seq) = session.sequence_of(uid) {
                responses.push(Response::Untagged(format!(
                    "{seq} FETCH (FLAGS ({}))",
                    new_flags.join(" ")
                )));
            }
        }
    }
    responses.push(Response::ok(tag, "STORE completed"));
    responses
}

async fn handle_copy(
    session: &Session,
    client: &ApiClient,
    tag: &str,
    use_uid: bool,
    sequence_set: &str,
    mailbox: &str,
) -> Vec<Response> {
    let Some(folder) = session.selected.as_ref() else {
        return vec![Response::bad(tag, "no mailbox selected")];
    };
    let resolved = match resolve_or_reply(session, client, tag, mailbox).await {
        Ok(r) => r,
        Err(responses) => return responses,
    };
    let max = if use_uid {
        folder.message_uids.last().copied().unwrap_or(0)
    } else {
        folder.message_uids.len() as u32
    };
    let set = match sequence::resolve(sequence_set, max) {
        Ok(s) => s,
        Err(e) => return vec![Response::bad(tag, e.short_message())],
    };
    let source_uids = sequence::resolve_to_uids(&set, &folder.message_uids, use_uid);

    let mut new_uids = Vec::new();
    for uid in &source_uids {
        match client
            .copy_message(&folder.sender_id, &folder.name, *uid, &resolved.folder)
            .await
        {
            Ok(new_uid) => new_uids.push(new_uid),
            Err(e) => warn!(uid, error = %e, "COPY failed for message, skipping"),
        }
    }
    if new_uids.is_empty() {
        return vec![Response::no(tag, "COPY failed")];
    }
    let target_uidvalidity = client
        .folder_status(&resolved.sender_id, &resolved.folder)
        .await
        .map(|s| s.uid_validity)
        .unwrap_or(0);
    vec![Response::ok_coded(
        tag,
        format!(
            "COPYUID {target_uidvalidity} {} {}",
            join_uids(&source_uids),
            join_uids(&new_uids)
        ),
        "COPY completed",
    )]
}

async fn handle_move(
    session: &mut Session,
    client: &ApiClient,
    tag: &str,
    use_uid: bool,
    sequence_set: &str,
    mailbox: &str,
) -> Vec<Response> {
    let Some(folder) = session.selected.clone() else {
        return vec![Response::bad(tag, "no mailbox selected")];
    };
    let resolved = match resolve_or_reply(session, client, tag, mailbox).await {
        Ok(r) => r,
        Err(responses) => return responses,
    };
    let max = if use_uid {
        folder.message_uids.last().copied().unwrap_or(0)
    } else {
        folder.message_uids.len() as u32
    };
    let set = match sequence::resolve(sequence_set, max) {
        Ok(s) => s,
        Err(e) => return vec![Response::bad(tag, e.short_message())],
    };
    let source_uids = sequence::resolve_to_uids(&set, &folder.message_uids, use_uid);

    let mut responses = Vec::new();
    let mut new_uids = Vec::new();
    let mut moved_source_uids = Vec::new();
    for uid in source_uids {
        match client
            .move_message(&folder.sender_id, &folder.name, uid, &resolved.folder)
            .await
        {
            Ok(new_uid) => {
                if let Some(seq) = session.sequence_of(uid) {
                    responses.push(Response::Untagged(format!("{seq} EXPUNGE")));
                }
                session.splice_uid(uid);
                new_uids.push(new_uid);
                moved_source_uids.push(uid);
            }
            Err(e) => warn!(uid, error = %e, "MOVE failed for message, skipping"),
        }
    }

    if new_uids.is_empty() {
        return vec![Response::no(tag, "MOVE failed")];
    }
    let target_uidvalidity = client
        .folder_status(&resolved.sender_id, &resolved.folder)
        .await
        .map(|s| s.uid_validity)
        .unwrap_or(0);
    responses.push(Response::ok_coded(
        tag,
        format!(
            "COPYUID {target_uidvalidity} {} {}",
            join_uids(&moved_source_uids),
            join_uids(&new_uids)
        ),
        "MOVE completed",
    ));
    responses
}

fn join_uids(uids: &[u32]) -> String {
    uids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}
