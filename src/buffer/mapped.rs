//! Mapped buffer
//!
//! `MmapMut` over a file resized to the configured capacity.

use std::fs::File;

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::error::{Result, StashError};

/// A fixed-capacity, byte-addressable region backed by a file
///
/// ## Invariant
/// Every byte at or past `high_water` is zero. Writes only need to clear
/// `[end_of_write, high_water)` to keep the tail fully zero-padded.
pub struct MappedBuffer {
    /// Backing file, kept open so any advisory lock on it stays held
    _file: File,
    /// Writable mapping of the whole file
    mmap: MmapMut,
    /// Fixed size of the region in bytes
    capacity: usize,
    /// One past the last byte that may be non-zero
    high_water: usize,
}

impl MappedBuffer {
    /// Map `file` as a region of exactly `capacity` bytes
    ///
    /// Files shorter than `capacity` are zero-extended. Longer files are
    /// truncated only when everything past `capacity` is zero padding;
    /// otherwise the file is left untouched and `CapacityExceeded` is returned.
    pub fn open(file: File, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(StashError::Config(
                "buffer capacity must be > 0".to_string(),
            ));
        }

        let current_len = file.metadata()?.len();
        if current_len > capacity as u64 {
            check_tail_is_padding(&file, capacity)?;
        }
        if current_len != capacity as u64 {
            tracing::debug!(from = current_len, to = capacity, "resizing backing file");
            file.set_len(capacity as u64)?;
        }

        // SAFETY: the caller hands over the file handle and the store holds an
        // exclusive advisory lock on it, so no other mapping mutates it.
        let mmap = unsafe { MmapOptions::new().len(capacity).map_mut(&file)? };

        let high_water = mmap
            .iter()
            .rposition(|&b| b != 0)
            .map(|pos| pos + 1)
            .unwrap_or(0);

        Ok(Self {
            _file: file,
            mmap,
            capacity,
            high_water,
        })
    }

    /// The full `capacity`-length region, padding included
    pub fn read_all(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Write `data` at `offset`, then zero every byte after it up to `capacity`
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let required = offset.saturating_add(data.len());
        if required > self.capacity {
            return Err(StashError::CapacityExceeded {
                required,
                capacity: self.capacity,
            });
        }

        self.mmap[offset..required].copy_from_slice(data);

        // Everything past high_water is already zero
        if self.high_water > required {
            self.mmap[required..self.high_water].fill(0);
        }
        self.high_water = required;

        Ok(())
    }

    /// Force mapped pages out to the backing file
    pub fn sync(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Fixed size of the region
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length of the prefix that may hold non-zero bytes
    pub fn used_len(&self) -> usize {
        self.high_water
    }
}

/// Fail if shrinking `file` to `capacity` would cut into the document
fn check_tail_is_padding(file: &File, capacity: usize) -> Result<()> {
    // SAFETY: read-only view of a file the caller holds exclusively; it is
    // dropped before the file is resized.
    let whole = unsafe { Mmap::map(file)? };

    let document_end = whole
        .iter()
        .rposition(|&b| b != 0)
        .map(|pos| pos + 1)
        .unwrap_or(0);

    if document_end > capacity {
        tracing::warn!(
            document_end,
            capacity,
            "store does not fit the requested capacity, leaving file untouched"
        );
        return Err(StashError::CapacityExceeded {
            required: document_end,
            capacity,
        });
    }
    Ok(())
}

impl std::fmt::Debug for MappedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedBuffer")
            .field("capacity", &self.capacity)
            .field("used_len", &self.high_water)
            .finish()
    }
}
