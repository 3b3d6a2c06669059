//! Engine Module
//!
//! The key-value engine that owns the Index and the mapped buffer.
//!
//! ## Responsibilities
//! - Load the Index from the buffer on construction
//! - Enforce key/value/TTL constraints before any mutation
//! - Flush the whole Index through the buffer after every mutation
//! - Expire TTL'd keys lazily, when they are read
//! - Roll back the Index when a flush fails

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::buffer::MappedBuffer;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, SyncStrategy};
use crate::error::{Result, StashError};
use crate::index::{Document, Entry, Index};
use crate::validate;

/// The main storage engine
///
/// ## Concurrency Model: one coarse lock
///
/// - Every public operation takes `inner` for its full duration,
///   including the flush it triggers
/// - Reads take the same lock because a read may expire a key
/// - A failed flush is undone while the lock is still held, so no other
///   thread ever sees the rolled-back state
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Time source for `created_at` and expiry checks
    clock: Box<dyn Clock>,

    /// Index + buffer, always mutated together
    inner: Mutex<Inner>,
}

struct Inner {
    index: Index,
    buffer: MappedBuffer,
}

impl Engine {
    /// Load an engine from an already-sized, already-locked buffer
    pub fn new(buffer: MappedBuffer, config: Config) -> Result<Self> {
        Self::with_clock(buffer, config, SystemClock)
    }

    /// Same as [`Engine::new`] with an explicit time source
    ///
    /// Fails with `CorruptStore` when the buffer does not hold a valid
    /// document. An all-zero buffer is treated as an empty store and
    /// initialized with `{}`.
    pub fn with_clock(
        buffer: MappedBuffer,
        config: Config,
        clock: impl Clock + 'static,
    ) -> Result<Self> {
        config.validate()?;

        let (index, blank) = {
            let text = strip_padding(buffer.read_all());
            if text.is_empty() {
                (Index::new(), true)
            } else {
                (Index::from_json(text)?, false)
            }
        };

        let mut inner = Inner { index, buffer };
        if blank {
            debug!("blank buffer, writing empty document");
            inner.flush(config.sync_strategy)?;
        }

        debug!(
            entries = inner.index.len(),
            capacity = inner.buffer.capacity(),
            "engine loaded"
        );

        Ok(Self {
            config,
            clock: Box::new(clock),
            inner: Mutex::new(inner),
        })
    }

    /// Create a new key
    ///
    /// Steps:
    /// 1. Validate key and value (no lock needed)
    /// 2. Reject duplicates
    /// 3. Insert and flush, rolling back on failure
    pub fn create(&self, key: &str, value: Value, ttl: Option<u64>) -> Result<()> {
        validate::check_key(key, self.config.max_key_len)?;
        let document = validate::into_document(value, self.config.max_value_size)?;

        let mut inner = self.inner.lock();

        if inner.index.contains_key(key) {
            return Err(StashError::DuplicateKey(key.to_string()));
        }

        let entry = Entry::new(document, self.clock.now_ms(), ttl);
        inner.index.insert(key.to_string(), entry);

        inner.commit(self.config.sync_strategy, |index| {
            index.remove(key);
        })?;

        debug!(key, ?ttl, "created key");
        Ok(())
    }

    /// Create from untyped input: string key, object value, coercible TTL
    ///
    /// A `null` TTL means "never expires".
    pub fn create_from_json(&self, key: &Value, value: Value, ttl: Option<&Value>) -> Result<()> {
        let key = validate::key_from_json(key)?;
        let ttl = match ttl {
            None | Some(Value::Null) => None,
            Some(raw) => Some(validate::coerce_ttl(raw)?),
        };
        self.create(key, value, ttl)
    }

    /// Get the value stored under `key`
    ///
    /// An expired key is removed and flushed before `ExpiredKey` is returned;
    /// the next read of it sees `KeyNotFound`.
    pub fn get(&self, key: &str) -> Result<Document> {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();

        match inner.index.get(key) {
            None => return Err(StashError::KeyNotFound(key.to_string())),
            Some(entry) if !entry.is_expired(now) => return Ok(entry.value.clone()),
            Some(_) => {}
        }

        if let Some((position, entry)) = inner.index.remove(key) {
            inner.commit(self.config.sync_strategy, move |index| {
                index.restore(position, key.to_string(), entry);
            })?;
        }

        debug!(key, "key expired on read");
        Err(StashError::ExpiredKey(key.to_string()))
    }

    /// Delete a key; deleting an absent key is a no-op
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock();

        let Some((position, entry)) = inner.index.remove(key) else {
            return Ok(());
        };

        inner.commit(self.config.sync_strategy, move |index| {
            index.restore(position, key.to_string(), entry);
        })?;

        debug!(key, "deleted key");
        Ok(())
    }

    /// Drop every key and flush an empty document
    pub fn delete_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        let previous = inner.index.take();
        let dropped = previous.len();

        inner.commit(self.config.sync_strategy, move |index| {
            *index = previous;
        })?;

        debug!(dropped, "cleared store");
        Ok(())
    }

    /// Force mapped pages to disk regardless of the sync strategy
    pub fn sync(&self) -> Result<()> {
        self.inner.lock().buffer.sync()
    }

    /// Close the engine, syncing the buffer first
    pub fn close(self) -> Result<()> {
        self.sync()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of keys currently indexed (expired-but-unread keys included)
    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().index.is_empty()
    }

    /// Presence check that does not trigger expiry
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().index.contains_key(key)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().index.keys().map(str::to_string).collect()
    }

    /// Fixed buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.inner.lock().buffer.capacity()
    }

    /// Bytes of the buffer currently holding the document
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().buffer.used_len()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Engine")
            .field("entries", &inner.index.len())
            .field("buffer", &inner.buffer)
            .finish()
    }
}

impl Inner {
    /// Serialize the whole Index over the start of the buffer
    fn flush(&mut self, sync: SyncStrategy) -> Result<()> {
        let bytes = self.index.to_json()?;
        self.buffer.write_at(0, &bytes)?;

        if sync == SyncStrategy::EveryFlush {
            self.buffer.sync()?;
        }

        debug!(entries = self.index.len(), bytes = bytes.len(), "flushed index");
        Ok(())
    }

    /// Flush the pending mutation, or undo it and put the previous
    /// document back if the flush fails
    fn commit(&mut self, sync: SyncStrategy, undo: impl FnOnce(&mut Index)) -> Result<()> {
        let err = match self.flush(sync) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        undo(&mut self.index);

        // Buffer may already hold the rejected document if only the sync failed
        if let Err(restore_err) = self.flush(SyncStrategy::OsManaged) {
            warn!(error = %restore_err, "failed to rewrite previous document");
        }

        warn!(error = %err, "flush failed, mutation rolled back");
        Err(err)
    }
}

/// Drop the zero padding after the document
fn strip_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map(|pos| pos + 1)
        .unwrap_or(0);
    &bytes[..end]
}
