//! Wire formatting primitives.
//!
//! `NIL` for absent strings; otherwise a quoted string if it contains no
//! CR/LF/double-quote and is <=100 bytes, else a literal `{n}CRLF<bytes>`.
//! Byte length is always measured in UTF-8 bytes, never code units.
//! Everything that can carry a literal renders into a byte buffer
//! directly rather than through `String`, since a literal payload is
//! not itself valid UTF-8-terminated text.

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::upstream::models::{Address, BodyStructure, Envelope};

use super::response::Response;

const QUOTE_MAX_LEN: usize = 100;

/// Default error-to-wire mapping for handlers that have no
/// command-specific reason to choose otherwise. Several dispatcher
/// handlers still pick `NO` vs `BAD` themselves where the same error
/// kind means different things for different commands (e.g. a failed
/// LOGIN is always `NO AUTHENTICATIONFAILED`, never this generic
/// path); this covers the rest.
#[must_use]
pub fn to_imap_response(tag: &str, err: &Error) -> Response {
    match err {
        Error::Protocol(_) | Error::StateViolation(_) => Response::bad(tag, err.short_message()),
        Error::AuthFailure(_) => Response::no_coded(tag, "AUTHENTICATIONFAILED", err.short_message()),
        Error::MailboxNotFound(_) | Error::CannotDelete(_) => Response::no(tag, err.short_message()),
        Error::CannotCreate(_) => Response::no_coded(tag, "TRYCREATE", err.short_message()),
        _ => Response::no(tag, format!("Failed to complete: {}", err.short_message())),
    }
}

/// Append the formatted form of an optional string to `out`.
pub fn push_nstring(out: &mut Vec<u8>, value: Option<&str>) {
    match value {
        None => out.extend_from_slice(b"NIL"),
        Some(s) => push_string(out, s),
    }
}

/// Append a quoted string or literal for a required string.
pub fn push_string(out: &mut Vec<u8>, s: &str) {
    if s.len() <= QUOTE_MAX_LEN && !s.contains(['\r', '\n', '"']) {
        out.push(b'"');
        for c in s.chars() {
            if c == '\\' || c == '"' {
                out.push(b'\\');
            }
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        out.push(b'"');
    } else {
        push_literal(out, s.as_bytes());
    }
}

/// Append a literal: `{n}CRLF` followed by the raw bytes, `n` measured
/// in UTF-8 bytes.
pub fn push_literal(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'{');
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.extend_from_slice(b"}\r\n");
    out.extend_from_slice(bytes);
}

fn push_address(out: &mut Vec<u8>, addr: &Address) {
    out.push(b'(');
    push_nstring(out, addr.name.as_deref());
    out.push(b' ');
    push_nstring(out, addr.adl.as_deref());
    out.push(b' ');
    push_nstring(out, addr.mailbox.as_deref());
    out.push(b' ');
    push_nstring(out, addr.host.as_deref());
    out.push(b')');
}

fn push_address_list(out: &mut Vec<u8>, addrs: &[Address]) {
    if addrs.is_empty() {
        out.extend_from_slice(b"NIL");
        return;
    }
    out.push(b'(');
    for (i, addr) in addrs.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        push_address(out, addr);
    }
    out.push(b')');
}

/// `ENVELOPE`: `(date subject from sender reply-to to cc bcc
/// in-reply-to message-id)`.
pub fn push_envelope(out: &mut Vec<u8>, env: &Envelope) {
    out.push(b'(');
    push_nstring(out, env.date.map(|d| rfc822_date(&d)).as_deref());
    out.push(b' ');
    push_nstring(out, env.subject.as_deref());
    out.push(b' ');
    push_address_list(out, &env.from);
    out.push(b' ');
    push_address_list(out, if env.sender.is_empty() { &env.from } else { &env.sender });
    out.push(b' ');
    push_address_list(
        out,
        if env.reply_to.is_empty() { &env.from } else { &env.reply_to },
    );
    out.push(b' ');
    push_address_list(out, &env.to);
    out.push(b' ');
    push_address_list(out, &env.cc);
    out.push(b' ');
    push_address_list(out, &env.bcc);
    out.push(b' ');
    push_nstring(out, env.in_reply_to.as_deref());
    out.push(b' ');
    push_nstring(out, env.message_id.as_deref());
    out.push(b')');
}

/// `BODYSTRUCTURE`: single part `("TYPE" "SUBTYPE" params id desc
/// encoding size [lines])`; multipart `(part1 part2 ... "SUBTYPE")`.
pub fn push_body_structure(out: &mut Vec<u8>, bs: &BodyStructure) {
    out.push(b'(');
    if bs.is_multipart() {
        for part in &bs.parts {
            push_body_structure(out, part);
        }
        out.push(b' ');
        push_string(out, &bs.subtype);
    } else {
        push_string(out, &bs.kind);
        out.push(b' ');
        push_string(out, &bs.subtype);
        out.push(b' ');
        if bs.params.is_empty() {
            out.extend_from_slice(b"NIL");
        } else {
            out.push(b'(');
            for (i, (k, v)) in bs.params.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                push_string(out, k);
                out.push(b' ');
                push_string(out, v);
            }
            out.push(b')');
        }
        out.push(b' ');
        push_nstring(out, bs.id.as_deref());
        out.push(b' ');
        push_nstring(out, bs.description.as_deref());
        out.push(b' ');
        push_nstring(out, bs.encoding.as_deref());
        out.push(b' ');
        out.extend_from_slice(bs.size.to_string().as_bytes());
        if let Some(lines) = bs.lines {
            out.push(b' ');
            out.extend_from_slice(lines.to_string().as_bytes());
        }
    }
    out.push(b')');
}

/// `INTERNALDATE`: `DD-Mon-YYYY HH:MM:SS +0000`, UTC, day zero-padded
/// with a leading space rather than a zero (per RFC 3501 date-day-fixed).
#[must_use]
pub fn imap_internal_date(dt: &DateTime<Utc>) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    use chrono::Datelike;
    use chrono::Timelike;
    let day = dt.day();
    let day_str = if day < 10 {
        format!(" {day}")
    } else {
        day.to_string()
    };
    format!(
        "{day_str}-{}-{:04} {:02}:{:02}:{:02} +0000",
        MONTHS[(dt.month0()) as usize],
        dt.year(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}

/// The ENVELOPE date field: RFC 822 `Date:` header text (e.g. `Wed, 17
/// Jul 1996 02:23:25 +0000`), distinct from `INTERNALDATE`'s own
/// format. The upstream hands back a parsed timestamp rather than the
/// original header bytes, so this reconstructs the header's wire form
/// from it rather than reusing `imap_internal_date`.
#[must_use]
pub fn rfc822_date(dt: &DateTime<Utc>) -> String {
    dt.to_rfc2822()
}

/// `LIST (flags) "<delim>" <name>`.
pub fn list_response(out: &mut Vec<u8>, flags: &[String], delim: &str, name: &str) {
    out.extend_from_slice(b"LIST (");
    out.extend_from_slice(flags.join(" ").as_bytes());
    out.extend_from_slice(b") ");
    push_string(out, delim);
    out.push(b' ');
    push_string(out, name);
}
