//! SEARCH criteria parsing.
//!
//! The list is a linear scan: keywords with a one-argument value consume
//! the next token, `LARGER`/`SMALLER` consume an integer, `NOT` negates
//! the next criterion, `OR` takes two criteria. The resulting list is
//! passed unevaluated to the upstream -- this module only has to produce
//! a faithful structured form of it, not evaluate it.

use chrono::NaiveDate;

use crate::error::{Error, Result};

/// A single SEARCH criterion, or a combinator over other criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    All,
    Answered,
    Bcc(String),
    Before(NaiveDate),
    Body(String),
    Cc(String),
    Deleted,
    Draft,
    Flagged,
    From(String),
    Header(String, String),
    Keyword(String),
    Larger(u64),
    New,
    Not(Box<SearchKey>),
    Old,
    On(NaiveDate),
    Or(Box<SearchKey>, Box<SearchKey>),
    Recent,
    Seen,
    SentBefore(NaiveDate),
    SentOn(NaiveDate),
    SentSince(NaiveDate),
    Since(NaiveDate),
    Smaller(u64),
    Subject(String),
    Text(String),
    To(String),
    Uid(String),
    Unanswered,
    Undeleted,
    Undraft,
    Unflagged,
    Unkeyword(String),
    Unseen,
    SequenceSet(String),
}

/// Parse a tokenized SEARCH argument list (already split respecting
/// quotes/brackets/parens by the command tokenizer) into a conjunction
/// of [`SearchKey`]s.
pub fn parse(tokens: &[String]) -> Result<Vec<SearchKey>> {
    let mut keys = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let (key, consumed) = parse_one(tokens, i)?;
        keys.push(key);
        i += consumed;
    }
    if keys.is_empty() {
        return Err(Error::Protocol("SEARCH requires at least one key".into()));
    }
    Ok(keys)
}

fn parse_one(tokens: &[String], i: usize) -> Result<(SearchKey, usize)> {
    let tok = tokens
        .get(i)
        .ok_or_else(|| Error::Protocol("unexpected end of SEARCH criteria".into()))?;
    let upper = tok.to_ascii_uppercase();

    macro_rules! arg {
        () => {{
            tokens
                .get(i + 1)
                .ok_or_else(|| Error::Protocol(format!("{upper} requires an argument")))?
                .clone()
        }};
    }
    macro_rules! date_arg {
        () => {{
            let raw = arg!();
            super::date::parse_search_date(&raw)?
        }};
    }
    macro_rules! int_arg {
        () => {{
            let raw = arg!();
            raw.parse::<u64>()
                .map_err(|_| Error::Protocol(format!("{upper} requires an integer argument")))?
        }};
    }

    match upper.as_str() {
        "ALL" => Ok((SearchKey::All, 1)),
        "ANSWERED" => Ok((SearchKey::Answered, 1)),
        "DELETED" => Ok((SearchKey::Deleted, 1)),
        "DRAFT" => Ok((SearchKey::Draft, 1)),
        "FLAGGED" => Ok((SearchKey::Flagged, 1)),
        "NEW" => Ok((SearchKey::New, 1)),
        "OLD" => Ok((SearchKey::Old, 1)),
        "RECENT" => Ok((SearchKey::Recent, 1)),
        "SEEN" => Ok((SearchKey::Seen, 1)),
        "UNANSWERED" => Ok((SearchKey::Unanswered, 1)),
        "UNDELETED" => Ok((SearchKey::Undeleted, 1)),
        "UNDRAFT" => Ok((SearchKey::Undraft, 1)),
        "UNFLAGGED" => Ok((SearchKey::Unflagged, 1)),
        "UNSEEN" => Ok((SearchKey::Unseen, 1)),
        "BCC" => Ok((SearchKey::Bcc(arg!()), 2)),
        "BODY" => Ok((SearchKey::Body(arg!()), 2)),
        "CC" => Ok((SearchKey::Cc(arg!()), 2)),
        "FROM" => Ok((SearchKey::From(arg!()), 2)),
        "KEYWORD" => Ok((SearchKey::Keyword(arg!()), 2)),
        "SUBJECT" => Ok((SearchKey::Subject(arg!()), 2)),
        "TEXT" => Ok((SearchKey::Text(arg!()), 2)),
        "TO" => Ok((SearchKey::To(arg!()), 2)),
        "UID" => Ok((SearchKey::Uid(arg!()), 2)),
        "UNKEYWORD" => Ok((SearchKey::Unkeyword(arg!()), 2)),
        "BEFORE" => Ok((SearchKey::Before(date_arg!()), 2)),
        "ON" => Ok((SearchKey::On(date_arg!()), 2)),
        "SINCE" => Ok((SearchKey::Since(date_arg!()), 2)),
        "SENTBEFORE" => Ok((SearchKey::SentBefore(date_arg!()), 2)),
        "SENTON" => Ok((SearchKey::SentOn(date_arg!()), 2)),
        "SENTSINCE" => Ok((SearchKey::SentSince(date_arg!()), 2)),
        "LARGER" => Ok((SearchKey::Larger(int_arg!()), 2)),
        "SMALLER" => Ok((SearchKey::Smaller(int_arg!()), 2)),
        "HEADER" => {
            let field = arg!();
            let value = tokens
                .get(i + 2)
                .ok_or_else(|| Error::Protocol("HEADER requires field and value".into()))?
                .clone();
            Ok((SearchKey::Header(field, value), 3))
        }
        "NOT" => {
            let (inner, consumed) = parse_one(tokens, i + 1)?;
            Ok((SearchKey::Not(Box::new(inner)), 1 + consumed))
        }
        "OR" => {
            let (left, lc) = parse_one(tokens, i + 1)?;
            let (right, rc) = parse_one(tokens, i + 1 + lc)?;
            Ok((SearchKey::Or(Box::new(left), Box::new(right)), 1 + lc + rc))
        }
        _ => Ok((SearchKey::SequenceSet(tok.clone()), 1)),
    }
}
