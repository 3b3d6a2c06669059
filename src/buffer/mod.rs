//! Buffer Module
//!
//! Fixed-capacity, file-backed memory region the whole store is written into.
//!
//! ## Responsibilities
//! - Size the backing file to exactly `capacity` bytes
//! - Map it read-write into memory
//! - Expose the raw region for loading
//! - Overwrite-then-zero-pad writes that never exceed `capacity`
//!
//! ## File Layout
//! ```text
//! ┌──────────────────────────────┬─────────────────────────────────┐
//! │ JSON document (UTF-8)        │ 0x00 padding                    │
//! │ bytes [0, n)                 │ bytes [n, capacity)             │
//! └──────────────────────────────┴─────────────────────────────────┘
//! ```

mod mapped;

pub use mapped::MappedBuffer;
