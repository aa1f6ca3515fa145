//! FETCH item and macro parsing.
//!
//! Macros expand before item-level parsing: `ALL` => FLAGS INTERNALDATE
//! RFC822.SIZE ENVELOPE; `FAST` => the first three of those; `FULL` =>
//! ALL + BODY. Each item may carry a `[section]` and a `<start.length>`
//! partial specifier; section is `""`, `HEADER`, `HEADER.FIELDS (a b
//! ...)`, `TEXT`, or a dotted numeric MIME part path.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Full,
    Header,
    HeaderFields(Vec<String>),
    HeaderFieldsNot(Vec<String>),
    Text,
    Part(Vec<u32>),
    PartHeader(Vec<u32>),
    PartText(Vec<u32>),
    Mime(Vec<u32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partial {
    pub start: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    Flags,
    Uid,
    InternalDate,
    Rfc822Size,
    Envelope,
    BodyStructure,
    Rfc822,
    Rfc822Header,
    Rfc822Text,
    Body {
        peek: bool,
        section: Section,
        partial: Option<Partial>,
    },
}

/// Tokens here are top-level space-separated FETCH item names, already
/// split by the command tokenizer with bracket/paren-awareness (so
/// `BODY[HEADER.FIELDS (To From)]<0.100>` arrives as one token).
pub fn parse(tokens: &[String]) -> Result<Vec<FetchItem>> {
    let mut expanded = Vec::new();
    for tok in tokens {
        match tok.to_ascii_uppercase().as_str() {
            "ALL" => expanded.extend(["FLAGS", "INTERNALDATE", "RFC822.SIZE", "ENVELOPE"]),
            "FAST" => expanded.extend(["FLAGS", "INTERNALDATE", "RFC822.SIZE"]),
            "FULL" => expanded.extend([
                "FLAGS",
                "INTERNALDATE",
                "RFC822.SIZE",
                "ENVELOPE",
                "BODY",
            ]),
            _ => expanded.push(tok.as_str()),
        }
    }

    expanded.iter().map(|tok| parse_item(tok)).collect()
}

fn parse_item(tok: &str) -> Result<FetchItem> {
    let upper = tok.to_ascii_uppercase();
    if upper == "FLAGS" {
        return Ok(FetchItem::Flags);
    }
    if upper == "UID" {
        return Ok(FetchItem::Uid);
    }
    if upper == "INTERNALDATE" {
        return Ok(FetchItem::InternalDate);
    }
    if upper == "RFC822.SIZE" {
        return Ok(FetchItem::Rfc822Size);
    }
    if upper == "ENVELOPE" {
        return Ok(FetchItem::Envelope);
    }
    if upper == "BODYSTRUCTURE" {
        return Ok(FetchItem::BodyStructure);
    }
    if upper == "RFC822" {
        return Ok(FetchItem::Rfc822);
    }
    if upper == "RFC822.HEADER" {
        return Ok(FetchItem::Rfc822Header);
    }
    if upper == "RFC822.TEXT" {
        return Ok(FetchItem::Rfc822Text);
    }

    let (peek, rest) = if let Some(rest) = upper.strip_prefix("BODY.PEEK") {
        (true, rest)
    } else if let Some(rest) = upper.strip_prefix("BODY") {
        (false, rest)
    } else {
        return Err(Error::Protocol(format!("unknown FETCH item: {tok:?}")));
    };

    // `rest` holds the untouched-case suffix from the original token,
    // sliced at the same byte offset as the uppercased prefix match.
    let offset = tok.len() - rest.len();
    let rest = &tok[offset..];

    let (bracketed, after) = if let Some(stripped) = rest.strip_prefix('[') {
        let end = stripped
            .find(']')
            .ok_or_else(|| Error::Protocol(format!("unterminated section in {tok:?}")))?;
        (&stripped[..end], &stripped[end + 1..])
    } else {
        ("", rest)
    };

    let section = parse_section(bracketed)?;
    let partial = parse_partial(after)?;
    Ok(FetchItem::Body {
        peek,
        section,
        partial,
    })
}

fn parse_section(raw: &str) -> Result<Section> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Section::Full);
    }
    let upper = raw.to_ascii_uppercase();
    if upper == "HEADER" {
        return Ok(Section::Header);
    }
    if upper == "TEXT" {
        return Ok(Section::Text);
    }
    if upper.starts_with("HEADER.FIELDS.NOT") {
        return Ok(Section::HeaderFieldsNot(parse_field_list(raw)?));
    }
    if upper.starts_with("HEADER.FIELDS") {
        return Ok(Section::HeaderFields(parse_field_list(raw)?));
    }
    if upper == "MIME" {
        return Ok(Section::Mime(Vec::new()));
    }

    // Dotted numeric MIME path, optionally suffixed with .HEADER/.TEXT/.MIME.
    let mut parts: Vec<&str> = raw.split('.').collect();
    let mut suffix = None;
    if let Some(last) = parts.last() {
        match last.to_ascii_uppercase().as_str() {
            "HEADER" => {
                suffix = Some("HEADER");
                parts.pop();
            }
            "TEXT" => {
                suffix = Some("TEXT");
                parts.pop();
            }
            "MIME" => {
                suffix = Some("MIME");
                parts.pop();
            }
            _ => {}
        }
    }
    let path: Vec<u32> = parts
        .iter()
        .map(|p| {
            p.parse::<u32>()
                .map_err(|_| Error::Protocol(format!("invalid MIME part path: {raw:?}")))
        })
        .collect::<Result<_>>()?;
    if path.is_empty() {
        return Err(Error::Protocol(format!("empty section: {raw:?}")));
    }
    Ok(match suffix {
        Some("HEADER") => Section::PartHeader(path),
        Some("TEXT") => Section::PartText(path),
        Some("MIME") => Section::Mime(path),
        _ => Section::Part(path),
    })
}

fn parse_field_list(raw: &str) -> Result<Vec<String>> {
    let open = raw
        .find('(')
        .ok_or_else(|| Error::Protocol(format!("HEADER.FIELDS requires a field list: {raw:?}")))?;
    let close = raw
        .rfind(')')
        .ok_or_else(|| Error::Protocol(format!("HEADER.FIELDS requires a field list: {raw:?}")))?;
    if close <= open {
        return Err(Error::Protocol(format!(
            "HEADER.FIELDS requires a field list: {raw:?}"
        )));
    }
    Ok(raw[open + 1..close]
        .split_whitespace()
        .map(str::to_string)
        .collect())
}

fn parse_partial(raw: &str) -> Result<Option<Partial>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let inner = raw
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(|| Error::Protocol(format!("malformed partial specifier: {raw:?}")))?;
    let (start, length) = inner
        .split_once('.')
        .ok_or_else(|| Error::Protocol(format!("malformed partial specifier: {raw:?}")))?;
    Ok(Some(Partial {
        start: start
            .parse()
            .map_err(|_| Error::Protocol(format!("malformed partial specifier: {raw:?}")))?,
        length: length
            .parse()
            .map_err(|_| Error::Protocol(format!("malformed partial specifier: {raw:?}")))?,
    }))
}

#[must_use]
pub fn needs_body(items: &[FetchItem]) -> bool {
    items.iter().any(|i| {
        matches!(
            i,
            FetchItem::Body { .. } | FetchItem::Rfc822 | FetchItem::Rfc822Header | FetchItem::Rfc822Text
        )
    })
}

#[must_use]
pub fn all_body_items_peek(items: &[FetchItem]) -> bool {
    items.iter().all(|i| match i {
        FetchItem::Body { peek, .. } => *peek,
        FetchItem::Rfc822Header => true,
        _ => true,
    })
}
