//! # StashKV
//!
//! A single-process key-value store persisted as one JSON document:
//! - String keys map to small JSON objects
//! - Optional per-key time-to-live, enforced lazily on read
//! - The whole dataset is rewritten into a fixed-capacity memory-mapped file
//!   after every mutation
//! - One coarse lock makes every operation linearizable across threads
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 store::open_store                            │
//! │        (file naming, exclusive flock, pre-fill)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Engine                                  │
//! │     create / get / delete / delete_all  (one Mutex)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐   flush   ┌──────────────┐
//!   │    Index    │ ────────► │ MappedBuffer │
//!   │ (IndexMap)  │ ◄──────── │   (mmap)     │
//!   └─────────────┘   load    └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use stashkv::{open_store, Config};
//! use serde_json::json;
//!
//! let config = Config::builder().storage_dir("/tmp/stash").build();
//! let store = open_store(&config, Some("users")).unwrap();
//!
//! store.create("alice", json!({"age": 31}), Some(60)).unwrap();
//! let value = store.get("alice").unwrap();
//! assert_eq!(value["age"], 31);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod clock;

pub mod buffer;
pub mod index;
pub mod validate;
pub mod engine;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StashError, Result};
pub use config::{Config, SyncStrategy};
pub use engine::Engine;
pub use index::Document;
pub use store::{default_file_name, open_store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StashKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
