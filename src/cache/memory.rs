//! In-memory cache tier: LRU by access, TTL, byte-bounded.

use std::time::{Duration, Instant};

use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;

use crate::error::{Error, Result};

const DEFAULT_MAX_ENTRIES: usize = 50_000;
const DEFAULT_MAX_MEMORY: usize = 50 * 1024 * 1024;

struct Entry {
    value: Vec<u8>,
    size: usize,
    expires_at: Instant,
}

pub struct MemoryCache {
    entries: LruCache<String, Entry>,
    max_entries: usize,
    max_memory: usize,
    bytes_used: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub entries: usize,
    pub bytes: usize,
}

impl MemoryCache {
    #[must_use]
    pub fn new(max_entries: usize, max_memory: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
            max_entries,
            max_memory,
            bytes_used: 0,
        }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_MEMORY)
    }

    /// Estimate the byte cost of a cached value: a string counts 2
    /// bytes/char (UTF-16-esque budget), numbers/bools a small fixed
    /// size, anything else (structured JSON) its serialized length
    /// doubled.
    #[must_use]
    pub fn estimate_size(value: &serde_json::Value) -> usize {
        match value {
            serde_json::Value::String(s) => s.chars().count() * 2,
            serde_json::Value::Number(_) => 8,
            serde_json::Value::Bool(_) => 4,
            serde_json::Value::Null => 4,
            other => serde_json::to_string(other).map(|s| s.len() * 2).unwrap_or(0),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.expires_at <= Instant::now(),
            None => return None,
        };
        if expired {
            self.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn set(&mut self, key: &str, value: Vec<u8>, estimated_size: usize, ttl: Duration) {
        self.remove(key);

        while self.entries.len() >= self.max_entries
            || self.bytes_used + estimated_size > self.max_memory
        {
            let Some((_, evicted)) = self.entries.pop_lru() else {
                break;
            };
            self.bytes_used = self.bytes_used.saturating_sub(evicted.size);
        }

        self.bytes_used += estimated_size;
        self.entries.put(
            key.to_string(),
            Entry {
                value,
                size: estimated_size,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.pop(key) {
            self.bytes_used = self.bytes_used.saturating_sub(entry.size);
        }
    }

    pub fn delete_pattern(&mut self, pattern: &str) -> Result<usize> {
        let re = Regex::new(pattern).map_err(|e| Error::Internal(format!("bad pattern: {e}")))?;
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|(k, _)| re.is_match(k))
            .map(|(k, _)| k.clone())
            .collect();
        let count = matching.len();
        for key in matching {
            self.remove(&key);
        }
        Ok(count)
    }

    pub fn prune(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            self.remove(&key);
        }
        count
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        Stats {
            entries: self.entries.len(),
            bytes: self.bytes_used,
        }
    }
}
