//! RFC 822 message reconstruction and `BODY[section]<partial>`
//! extraction.
//!
//! If the upstream returned raw headers, those are used verbatim;
//! otherwise a minimal header block is synthesised from the envelope.
//! `Content-Type` is `multipart/alternative; boundary=...` when both
//! text and html bodies are present, else `text/plain` or `text/html`.
//! All line terminators in synthesised output are CRLF. Slicing for a
//! partial fetch is always byte-based: literal payloads are never
//! treated as UTF-8 strings of unknown length.

use crate::imap::parser::fetch_items::{Partial, Section};
use crate::upstream::models::{Body, Envelope};

const BOUNDARY: &str = "xmit-gateway-boundary";

/// Reconstruct the full RFC 822 byte stream for a message.
#[must_use]
pub fn reconstruct(body: Option<&Body>, envelope: Option<&Envelope>) -> Vec<u8> {
    if let Some(body) = body {
        if let Some(headers) = &body.headers {
            let mut out = to_crlf(headers);
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&body_bytes(body));
            return out;
        }
    }

    let mut out = synthesize_headers(envelope, body);
    out.extend_from_slice(b"\r\n");
    if let Some(body) = body {
        out.extend_from_slice(&body_bytes(body));
    }
    out
}

fn synthesize_headers(envelope: Option<&Envelope>, body: Option<&Body>) -> Vec<u8> {
    let mut header = String::new();
    if let Some(env) = envelope {
        if let Some(subject) = &env.subject {
            header.push_str("Subject: ");
            header.push_str(subject);
            header.push_str("\r\n");
        }
        if let Some(from) = env.from.first() {
            header.push_str("From: ");
            header.push_str(&format_address(from));
            header.push_str("\r\n");
        }
        if !env.to.is_empty() {
            header.push_str("To: ");
            header.push_str(
                &env.to
                    .iter()
                    .map(format_address)
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            header.push_str("\r\n");
        }
        if let Some(date) = env.date {
            header.push_str("Date: ");
            header.push_str(&crate::imap::formatter::imap_internal_date(&date));
            header.push_str("\r\n");
        }
        if let Some(message_id) = &env.message_id {
            header.push_str("Message-ID: ");
            header.push_str(message_id);
            header.push_str("\r\n");
        }
    }

    let has_text = body.is_some_and(|b| b.text.is_some());
    let has_html = body.is_some_and(|b| b.html.is_some());
    let content_type = if has_text && has_html {
        format!("multipart/alternative; boundary=\"{BOUNDARY}\"")
    } else if has_html {
        "text/html; charset=utf-8".to_string()
    } else {
        "text/plain; charset=utf-8".to_string()
    };
    header.push_str("Content-Type: ");
    header.push_str(&content_type);
    header.push_str("\r\n");

    header.into_bytes()
}

fn format_address(addr: &crate::upstream::models::Address) -> String {
    let mailbox = addr.mailbox.as_deref().unwrap_or("");
    let host = addr.host.as_deref().unwrap_or("");
    match &addr.name {
        Some(name) if !name.is_empty() => format!("{name} <{mailbox}@{host}>"),
        _ => format!("{mailbox}@{host}"),
    }
}

fn body_bytes(body: &Body) -> Vec<u8> {
    match (&body.text, &body.html) {
        (Some(text), Some(html)) => {
            let mut out = Vec::new();
            out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            out.extend_from_slice(b"Content-Type: text/plain; charset=utf-8\r\n\r\n");
            out.extend_from_slice(&to_crlf(text));
            out.extend_from_slice(format!("\r\n--{BOUNDARY}\r\n").as_bytes());
            out.extend_from_slice(b"Content-Type: text/html; charset=utf-8\r\n\r\n");
            out.extend_from_slice(&to_crlf(html));
            out.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
            out
        }
        (Some(text), None) => to_crlf(text),
        (None, Some(html)) => to_crlf(html),
        (None, None) => Vec::new(),
    }
}

fn to_crlf(s: &str) -> Vec<u8> {
    s.replace("\r\n", "\n").replace('\n', "\r\n").into_bytes()
}

/// Split a full RFC 822 byte stream at the first blank-line separator
/// into `(header_bytes, body_bytes)`. If no blank line is found, the
/// whole stream is treated as header with an empty body.
#[must_use]
pub fn split_header_body(full: &[u8]) -> (&[u8], &[u8]) {
    let sep = full.windows(4).position(|w| w == b"\r\n\r\n");
    match sep {
        Some(pos) => (&full[..pos + 2], &full[pos + 4..]),
        None => (full, &[]),
    }
}

/// Extract the bytes for a FETCH `section` from a reconstructed
/// message. MIME part paths are resolved approximately: part `1` is
/// the text alternative, part `2` the html alternative, when both
/// exist; a single-part message falls back to its only content for
/// any part path.
#[must_use]
pub fn extract_section(full: &[u8], section: &Section, body: Option<&Body>) -> Vec<u8> {
    match section {
        Section::Full => full.to_vec(),
        Section::Header => {
            let (header, _) = split_header_body(full);
            header.to_vec()
        }
        Section::Text => {
            let (_, body_bytes) = split_header_body(full);
            body_bytes.to_vec()
        }
        Section::HeaderFields(fields) => extract_header_fields(full, fields, false),
        Section::HeaderFieldsNot(fields) => extract_header_fields(full, fields, true),
        Section::Mime(_) => {
            let (header, _) = split_header_body(full);
            header.to_vec()
        }
        Section::Part(path) | Section::PartHeader(path) | Section::PartText(path) => {
            extract_mime_part(body, path)
        }
    }
}

fn extract_header_fields(full: &[u8], fields: &[String], negate: bool) -> Vec<u8> {
    let (header, _) = split_header_body(full);
    let text = String::from_utf8_lossy(header);
    let wanted: Vec<String> = fields.iter().map(|f| f.to_ascii_lowercase()).collect();
    let mut out = String::new();
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let field_name = line
            .split_once(':')
            .map(|(name, _)| name.trim().to_ascii_lowercase());
        let matches = field_name.is_some_and(|name| wanted.contains(&name));
        if matches != negate {
            out.push_str(line);
            out.push_str("\r\n");
        }
    }
    out.push_str("\r\n");
    out.into_bytes()
}

/// Approximate MIME part selection: `1` selects the plain-text
/// alternative, `2` selects html, when a multipart body has both;
/// otherwise any part path falls back to the message's only content.
fn extract_mime_part(body: Option<&Body>, path: &[u32]) -> Vec<u8> {
    let Some(body) = body else {
        return Vec::new();
    };
    let first = path.first().copied().unwrap_or(1);
    match (first, &body.text, &body.html) {
        (2, _, Some(html)) => to_crlf(html),
        (_, Some(text), _) => to_crlf(text),
        (_, None, Some(html)) => to_crlf(html),
        _ => Vec::new(),
    }
}

/// Clamp `<start.length>` to the byte length and slice.
#[must_use]
pub fn apply_partial(bytes: &[u8], partial: Option<Partial>) -> Vec<u8> {
    let Some(partial) = partial else {
        return bytes.to_vec();
    };
    let start = (partial.start as usize).min(bytes.len());
    let end = start.saturating_add(partial.length as usize).min(bytes.len());
    bytes[start..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::models::Address;

    #[test]
    fn split_finds_blank_line_separator() {
        let full = b"Subject: x\r\n\r\nbody text";
        let (h, b) = split_header_body(full);
        assert_eq!(h, b"Subject: x\r\n");
        assert_eq!(b, b"body text");
    }

    #[test]
    fn reconstruct_uses_raw_headers_when_present() {
        let body = Body {
            text: Some("hi".into()),
            html: None,
            headers: Some("Subject: raw\r\n".into()),
        };
        let full = reconstruct(Some(&body), None);
        let text = String::from_utf8(full).unwrap();
        assert!(text.starts_with("Subject: raw\r\n\r\nhi"));
    }

    #[test]
    fn reconstruct_synthesizes_multipart_when_both_present() {
        let body = Body {
            text: Some("plain".into()),
            html: Some("<p>html</p>".into()),
            headers: None,
        };
        let full = reconstruct(Some(&body), None);
        let text = String::from_utf8(full).unwrap();
        assert!(text.contains("multipart/alternative"));
        assert!(text.contains("plain"));
        assert!(text.contains("<p>html</p>"));
    }

    #[test]
    fn extract_header_fields_is_case_insensitive() {
        let full = b"Subject: hi\r\nFrom: a@b.com\r\n\r\nbody";
        let out = extract_header_fields(full, &["subject".to_string()], false);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Subject: hi"));
        assert!(!text.contains("From:"));
    }

    #[test]
    fn partial_clamps_to_byte_length() {
        let bytes = b"0123456789";
        let out = apply_partial(bytes, Some(Partial { start: 5, length: 100 }));
        assert_eq!(out, b"56789");
    }

    #[test]
    fn mime_part_approximation_selects_text_then_html() {
        let body = Body {
            text: Some("plain".into()),
            html: Some("html".into()),
            headers: None,
        };
        assert_eq!(extract_mime_part(Some(&body), &[1]), b"plain");
        assert_eq!(extract_mime_part(Some(&body), &[2]), b"html");
    }

    #[test]
    fn format_address_includes_name_when_present() {
        let addr = Address {
            name: Some("Bob".into()),
            mailbox: Some("bob".into()),
            host: Some("example.com".into()),
            ..Default::default()
        };
        assert_eq!(format_address(&addr), "Bob <bob@example.com>");
    }
}
