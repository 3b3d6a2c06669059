//! Store acquisition
//!
//! Opens (or creates) a store file, takes the process-exclusive lock on it and
//! hands it to the engine.
//!
//! ## Steps
//! 1. Resolve `{storage_dir}/{file_name}` (generated from the clock if absent)
//! 2. Open/create the file read-write
//! 3. Non-blocking exclusive advisory lock; held for the engine's lifetime
//! 4. Pre-fill empty files with `{}` + zero padding
//! 5. Map the file and load the engine

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use fs2::FileExt;
use tracing::info;

use crate::buffer::MappedBuffer;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, EMPTY_DOCUMENT};
use crate::engine::Engine;
use crate::error::{Result, StashError};

/// Prefix of generated store file names
pub const FILE_NAME_PREFIX: &str = "LOCAL_STORAGE_";

/// Last timestamp handed out by `default_file_name`
static LAST_NAME_TS: AtomicU64 = AtomicU64::new(0);

/// Generate `LOCAL_STORAGE_<epoch_ms>`, unique within this process
pub fn default_file_name() -> String {
    let now = SystemClock.now_ms();
    let mut last = LAST_NAME_TS.load(Ordering::SeqCst);
    let ts = loop {
        let candidate = now.max(last + 1);
        match LAST_NAME_TS.compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => break candidate,
            Err(actual) => last = actual,
        }
    };
    format!("{}{}", FILE_NAME_PREFIX, ts)
}

/// Open the store file `file_name` (or a fresh generated one) under
/// `config.storage_dir`
pub fn open_store(config: &Config, file_name: Option<&str>) -> Result<Engine> {
    open_store_with_clock(config, file_name, SystemClock)
}

/// Same as [`open_store`] with an explicit time source
pub fn open_store_with_clock(
    config: &Config,
    file_name: Option<&str>,
    clock: impl Clock + 'static,
) -> Result<Engine> {
    config.validate()?;

    let file_name = match file_name {
        Some(name) => name.to_string(),
        None => default_file_name(),
    };
    let path = store_path(&config.storage_dir, &file_name)?;

    let file = acquire(&path, config.max_local_storage_size)?;
    let buffer = MappedBuffer::open(file, config.max_local_storage_size)?;

    Engine::with_clock(buffer, config.clone(), clock)
}

/// Open `path` and take the exclusive lock, pre-filling it when new
pub fn acquire(path: &Path, capacity: usize) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    info!("Acquiring file lock on {}", path.display());
    if let Err(e) = file.try_lock_exclusive() {
        let contended = e.kind() == std::io::ErrorKind::WouldBlock
            || e.raw_os_error() == fs2::lock_contended_error().raw_os_error();
        return if contended {
            Err(StashError::ResourceLocked(path.to_path_buf()))
        } else {
            Err(StashError::Io(e))
        };
    }
    info!("File lock acquired on {}", path.display());

    if file.metadata()?.len() == 0 {
        initialize(&file, capacity)?;
    }

    Ok(file)
}

/// Write the empty document and pad the file out to `capacity`
fn initialize(mut file: &File, capacity: usize) -> Result<()> {
    if capacity < EMPTY_DOCUMENT.len() {
        return Err(StashError::CapacityExceeded {
            required: EMPTY_DOCUMENT.len(),
            capacity,
        });
    }
    file.write_all(EMPTY_DOCUMENT)?;
    file.set_len(capacity as u64)?;
    file.flush()?;
    Ok(())
}

fn store_path(dir: &Path, file_name: &str) -> Result<PathBuf> {
    if file_name.is_empty() || file_name.contains(['/', '\\']) {
        return Err(StashError::Config(format!(
            "invalid store file name '{}'",
            file_name
        )));
    }
    fs::create_dir_all(dir)?;
    Ok(dir.join(file_name))
}
