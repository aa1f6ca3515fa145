//! Command-line tokenizer.
//!
//! `parse_command(line)` tokenises respecting double-quoted strings
//! (backslash-escapes), square brackets (for BODY sections), and
//! parentheses (for flag lists / FETCH sets); whitespace outside any of
//! these separates tokens. Produces `{tag, name, args, use_uid, raw}`.
//! If the first token after the tag is `UID`, it is shifted off: `name`
//! becomes `args[0]`, `args` becomes `args[1..]`, `use_uid` becomes
//! true.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub tag: String,
    pub name: String,
    pub args: Vec<String>,
    pub use_uid: bool,
    pub raw: String,
}

/// Split `line` into whitespace-separated tokens, treating
/// double-quoted spans, `[...]`, and `(...)` as opaque (their entire
/// span, including the delimiters, is kept as one token).
fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut depth_brackets = 0i32;
    let mut depth_parens = 0i32;
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                current.push(c);
            }
            '[' => {
                depth_brackets += 1;
                current.push(c);
            }
            ']' => {
                depth_brackets -= 1;
                if depth_brackets < 0 {
                    return Err(Error::Protocol("unbalanced ']'".into()));
                }
                current.push(c);
            }
            '(' => {
                depth_parens += 1;
                current.push(c);
            }
            ')' => {
                depth_parens -= 1;
                if depth_parens < 0 {
                    return Err(Error::Protocol("unbalanced ')'".into()));
                }
                current.push(c);
            }
            c if c.is_whitespace() && depth_brackets == 0 && depth_parens == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(Error::Protocol("unterminated quoted string".into()));
    }
    if depth_brackets != 0 || depth_parens != 0 {
        return Err(Error::Protocol("unbalanced bracket or paren".into()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Strip one layer of double-quotes and backslash-escapes from a token,
/// if it is quoted. Unquoted tokens (atoms, literals-already-inlined)
/// pass through unchanged.
#[must_use]
pub fn unquote(tok: &str) -> String {
    let Some(inner) = tok.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return tok.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub fn parse_command(line: &str) -> Result<ParsedCommand> {
    let raw = line.to_string();
    let tokens = tokenize(line)?;
    let mut iter = tokens.into_iter();
    let tag = iter
        .next()
        .ok_or_else(|| Error::Protocol("empty command line".into()))?;
    let mut name = iter
        .next()
        .ok_or_else(|| Error::Protocol("missing command name".into()))?
        .to_ascii_uppercase();
    let mut args: Vec<String> = iter.collect();
    let mut use_uid = false;

    if name == "UID" {
        use_uid = true;
        if args.is_empty() {
            return Err(Error::Protocol("UID requires a command name".into()));
        }
        name = args.remove(0).to_ascii_uppercase();
    }

    Ok(ParsedCommand {
        tag,
        name,
        args,
        use_uid,
        raw,
    })
}
