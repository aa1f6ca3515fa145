//! Sequence set parsing and materialization.
//!
//! A sequence set is comma-separated atoms, each `N`, `N:M`, `*`, or
//! `N:*`/`*:N`. `*` denotes the last UID in the folder. Ranges where
//! start>end are swapped. The set is materialized against a supplied UID
//! vector (UID variant) or against `1..=len` (sequence-number variant)
//! and returned as a deduplicated, ascending list.

use std::collections::BTreeSet;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Atom {
    Single(u32),
    Star,
    Range(RangeEnd, RangeEnd),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeEnd {
    Value(u32),
    Star,
}

fn parse_range_end(tok: &str) -> Result<RangeEnd> {
    if tok == "*" {
        Ok(RangeEnd::Star)
    } else {
        tok.parse::<u32>()
            .map(RangeEnd::Value)
            .map_err(|_| Error::Protocol(format!("invalid sequence number: {tok:?}")))
    }
}

fn parse_atom(tok: &str) -> Result<Atom> {
    if tok == "*" {
        return Ok(Atom::Star);
    }
    if let Some((lhs, rhs)) = tok.split_once(':') {
        return Ok(Atom::Range(parse_range_end(lhs)?, parse_range_end(rhs)?));
    }
    tok.parse::<u32>()
        .map(Atom::Single)
        .map_err(|_| Error::Protocol(format!("invalid sequence set atom: {tok:?}")))
}

/// Materialize a raw sequence set string against a 1-based universe of
/// size `max` (the number of UIDs, or the number of messages for plain
/// sequence numbers), where `*` resolves to `max`.
pub fn resolve(raw: &str, max: u32) -> Result<Vec<u32>> {
    let mut out = BTreeSet::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(Error::Protocol("empty sequence set atom".into()));
        }
        match parse_atom(part)? {
            Atom::Star => {
                if max > 0 {
                    out.insert(max);
                }
            }
            Atom::Single(n) => {
                out.insert(n);
            }
            Atom::Range(lo, hi) => {
                let lo = resolve_end(lo, max);
                let hi = resolve_end(hi, max);
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                for n in lo..=hi {
                    out.insert(n);
                }
            }
        }
    }
    Ok(out.into_iter().collect())
}

fn resolve_end(end: RangeEnd, max: u32) -> u32 {
    match end {
        RangeEnd::Value(n) => n,
        RangeEnd::Star => max,
    }
}

/// Resolve a sequence set against a UID vector: sequence numbers are
/// 1-based positions into `uids`; the UID variant treats the set's
/// numbers as UIDs directly and filters to those present in `uids`.
#[must_use]
pub fn resolve_to_uids(resolved: &[u32], uids: &[u32], use_uid: bool) -> Vec<u32> {
    if use_uid {
        let present: BTreeSet<u32> = uids.iter().copied().collect();
        resolved
            .iter()
            .copied()
            .filter(|uid| present.contains(uid))
            .collect()
    } else {
        resolved
            .iter()
            .filter_map(|&seq| {
                if seq == 0 {
                    None
                } else {
                    uids.get((seq - 1) as usize).copied()
                }
            })
            .collect()
    }
}
