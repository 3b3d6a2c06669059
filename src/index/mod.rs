//! Index Module
//!
//! In-memory mirror of the persisted document.
//!
//! ## Responsibilities
//! - Insertion-ordered key → entry mapping
//! - Stable JSON encoding (`{"key": [value, created_at_ms, ttl_secs|null]}`)
//! - TTL bookkeeping per entry
//!
//! ## Data Structure Choice
//! `IndexMap` keeps insertion order, so the same sequence of operations
//! always produces byte-identical documents.

mod table;

pub use table::Index;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored value: always a JSON object
pub type Document = Map<String, Value>;

/// On-disk shape of an entry: a 3-element array
type RawEntry = (Document, u64, Option<u64>);

/// Entry stored in the Index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEntry", into = "RawEntry")]
pub struct Entry {
    /// The stored document
    pub value: Document,

    /// Creation time (unix millis), never mutated
    pub created_at: u64,

    /// Time-to-live in seconds; `None` never expires
    pub ttl: Option<u64>,
}

impl Entry {
    pub fn new(value: Document, created_at: u64, ttl: Option<u64>) -> Self {
        Self {
            value,
            created_at,
            ttl,
        }
    }

    /// Expired once strictly more than `ttl` seconds have elapsed since creation
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.ttl {
            None => false,
            Some(ttl) => now_ms.saturating_sub(self.created_at) > ttl.saturating_mul(1000),
        }
    }
}

impl From<RawEntry> for Entry {
    fn from((value, created_at, ttl): RawEntry) -> Self {
        Self::new(value, created_at, ttl)
    }
}

impl From<Entry> for RawEntry {
    fn from(entry: Entry) -> Self {
        (entry.value, entry.created_at, entry.ttl)
    }
}
