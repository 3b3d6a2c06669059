//! Index implementation
//!
//! IndexMap-based table; not synchronized on its own, the engine's lock guards it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StashError};

use super::Entry;

/// Ordered key → entry mapping mirrored into the buffer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index {
    entries: IndexMap<String, Entry>,
}

impl Index {
    /// Create a new empty Index
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a persisted document (padding already stripped)
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| StashError::CorruptStore(e.to_string()))
    }

    /// Encode the whole Index as one JSON document
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StashError::Serialization(e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Append a new entry; returns the previous entry if the key existed
    pub fn insert(&mut self, key: String, entry: Entry) -> Option<Entry> {
        self.entries.insert(key, entry)
    }

    /// Remove a key, returning its position so the removal can be undone
    pub fn remove(&mut self, key: &str) -> Option<(usize, Entry)> {
        self.entries
            .shift_remove_full(key)
            .map(|(position, _, entry)| (position, entry))
    }

    /// Put back an entry removed by [`Index::remove`] at its old position
    pub fn restore(&mut self, position: usize, key: String, entry: Entry) {
        let position = position.min(self.entries.len());
        self.entries.shift_insert(position, key, entry);
    }

    /// Drop every entry, handing back the previous contents
    pub fn take(&mut self) -> Index {
        std::mem::take(self)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
