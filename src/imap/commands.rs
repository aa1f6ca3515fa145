//! The `Command` enum: one exhaustively-matched variant per IMAP
//! command, so the dispatcher's match is exhaustiveness-checked rather
//! than relying on a name-to-handler lookup table.

use crate::error::{Error, Result};

use super::parser::command::{unquote, ParsedCommand};
use super::parser::fetch_items::{self, FetchItem};
use super::parser::search::{self, SearchKey};

#[derive(Debug, Clone)]
pub enum Command {
    Capability,
    Noop,
    Logout,
    Login { username: String, password: String },
    Authenticate { mechanism: String, initial_response: Option<String> },
    List { reference: String, pattern: String },
    Lsub { reference: String, pattern: String },
    Status { mailbox: String, items: Vec<String> },
    Select { mailbox: String },
    Examine { mailbox: String },
    Create { mailbox: String },
    Delete { mailbox: String },
    Rename { from: String, to: String },
    Subscribe { mailbox: String },
    Unsubscribe { mailbox: String },
    Append {
        mailbox: String,
        flags: Vec<String>,
        date: Option<String>,
        message: Vec<u8>,
    },
    Check,
    Close,
    Expunge,
    Search { use_uid: bool, keys: Vec<SearchKey> },
    Fetch { use_uid: bool, sequence_set: String, items: Vec<FetchItem> },
    Store {
        use_uid: bool,
        sequence_set: String,
        action: StoreAction,
        silent: bool,
        flags: Vec<String>,
    },
    Copy { use_uid: bool, sequence_set: String, mailbox: String },
    Move { use_uid: bool, sequence_set: String, mailbox: String },
    Idle,
    Namespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Set,
    Add,
    Remove,
}

/// Build a typed [`Command`] from a tokenized command line. Arguments
/// are taken at face value; upstream-facing validation (mailbox
/// existence, auth format) happens in the dispatcher.
pub fn from_parsed(cmd: &ParsedCommand) -> Result<Command> {
    let args = &cmd.args;
    match cmd.name.as_str() {
        "CAPABILITY" => Ok(Command::Capability),
        "NOOP" => Ok(Command::Noop),
        "LOGOUT" => Ok(Command::Logout),
        "LOGIN" => {
            let username = unquote(arg(args, 0, "LOGIN")?);
            let password = unquote(arg(args, 1, "LOGIN")?);
            Ok(Command::Login { username, password })
        }
        "AUTHENTICATE" => {
            let mechanism = arg(args, 0, "AUTHENTICATE")?.to_ascii_uppercase();
            let initial_response = args.get(1).cloned();
            Ok(Command::Authenticate {
                mechanism,
                initial_response,
            })
        }
        "LIST" => Ok(Command::List {
            reference: unquote(arg(args, 0, "LIST")?),
            pattern: unquote(arg(args, 1, "LIST")?),
        }),
        "LSUB" => Ok(Command::Lsub {
            reference: unquote(arg(args, 0, "LSUB")?),
            pattern: unquote(arg(args, 1, "LSUB")?),
        }),
        "STATUS" => {
            let mailbox = unquote(arg(args, 0, "STATUS")?);
            let items_raw = arg(args, 1, "STATUS")?;
            let items = strip_parens(items_raw)
                .split_whitespace()
                .map(|s| s.to_ascii_uppercase())
                .collect();
            Ok(Command::Status { mailbox, items })
        }
        "SELECT" => Ok(Command::Select {
            mailbox: unquote(arg(args, 0, "SELECT")?),
        }),
        "EXAMINE" => Ok(Command::Examine {
            mailbox: unquote(arg(args, 0, "EXAMINE")?),
        }),
        "CREATE" => Ok(Command::Create {
            mailbox: unquote(arg(args, 0, "CREATE")?),
        }),
        "DELETE" => Ok(Command::Delete {
            mailbox: unquote(arg(args, 0, "DELETE")?),
        }),
        "RENAME" => Ok(Command::Rename {
            from: unquote(arg(args, 0, "RENAME")?),
            to: unquote(arg(args, 1, "RENAME")?),
        }),
        "SUBSCRIBE" => Ok(Command::Subscribe {
            mailbox: unquote(arg(args, 0, "SUBSCRIBE")?),
        }),
        "UNSUBSCRIBE" => Ok(Command::Unsubscribe {
            mailbox: unquote(arg(args, 0, "UNSUBSCRIBE")?),
        }),
        "CHECK" => Ok(Command::Check),
        "CLOSE" => Ok(Command::Close),
        "EXPUNGE" => Ok(Command::Expunge),
        "SEARCH" => {
            let keys = search::parse(args)?;
            Ok(Command::Search {
                use_uid: cmd.use_uid,
                keys,
            })
        }
        "FETCH" => {
            let sequence_set = arg(args, 0, "FETCH")?.clone();
            let item_tokens = &args[1..];
            let item_tokens: Vec<String> = if item_tokens.len() == 1 {
                let stripped = strip_parens(&item_tokens[0]);
                if stripped != item_tokens[0] {
                    stripped.split_whitespace().map(str::to_string).collect()
                } else {
                    item_tokens.to_vec()
                }
            } else {
                item_tokens.to_vec()
            };
            let items = fetch_items::parse(&item_tokens)?;
            Ok(Command::Fetch {
                use_uid: cmd.use_uid,
                sequence_set,
                items,
            })
        }
        "STORE" => {
            let sequence_set = arg(args, 0, "STORE")?.clone();
            let action_token = arg(args, 1, "STORE")?.to_ascii_uppercase();
            let (action, silent) = parse_store_action(&action_token)?;
            let flags_raw = arg(args, 2, "STORE")?;
            let flags = crate::flag::Flag::parse_list(flags_raw)
                .iter()
                .map(|f| f.as_imap_str().to_string())
                .collect();
            Ok(Command::Store {
                use_uid: cmd.use_uid,
                sequence_set,
                action,
                silent,
                flags,
            })
        }
        "COPY" => Ok(Command::Copy {
            use_uid: cmd.use_uid,
            sequence_set: arg(args, 0, "COPY")?.clone(),
            mailbox: unquote(arg(args, 1, "COPY")?),
        }),
        "MOVE" => Ok(Command::Move {
            use_uid: cmd.use_uid,
            sequence_set: arg(args, 0, "MOVE")?.clone(),
            mailbox: unquote(arg(args, 1, "MOVE")?),
        }),
        "APPEND" => parse_append(args),
        "IDLE" => Ok(Command::Idle),
        "NAMESPACE" => Ok(Command::Namespace),
        other => Err(Error::Protocol(format!("unknown command: {other}"))),
    }
}

fn parse_store_action(token: &str) -> Result<(StoreAction, bool)> {
    let (base, silent) = token
        .strip_suffix(".SILENT")
        .map_or((token, false), |b| (b, true));
    let action = match base {
        "FLAGS" => StoreAction::Set,
        "+FLAGS" => StoreAction::Add,
        "-FLAGS" => StoreAction::Remove,
        other => return Err(Error::Protocol(format!("invalid STORE action: {other}"))),
    };
    Ok((action, silent))
}

fn parse_append(args: &[String]) -> Result<Command> {
    if args.is_empty() {
        return Err(Error::Protocol("APPEND requires a mailbox".into()));
    }
    let mailbox = unquote(&args[0]);
    let mut flags = Vec::new();
    let mut date = None;
    for tok in &args[1..] {
        if let Some(inner) = tok.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            flags = inner.split_whitespace().map(str::to_string).collect();
        } else if crate::imap::parser::date::parse_date_time(&unquote(tok)).is_ok() {
            date = Some(unquote(tok));
        }
    }
    Ok(Command::Append {
        mailbox,
        flags,
        date,
        // The literal payload is attached by the caller (the framer
        // delivers it as a separate `Frame::Literal` after this line);
        // the parser only handles the command prefix.
        message: Vec::new(),
    })
}

fn arg<'a>(args: &'a [String], idx: usize, cmd_name: &str) -> Result<&'a String> {
    args.get(idx)
        .ok_or_else(|| Error::Protocol(format!("{cmd_name} requires argument {idx}")))
}

fn strip_parens(s: &str) -> &str {
    s.strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(s)
}
