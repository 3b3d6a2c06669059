//! StashKV CLI
//!
//! Opens a store file, runs one command against it and exits.

use clap::{Parser, Subcommand};
use serde_json::Value;
use stashkv::{open_store, Config, Engine, StashError, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

const EXIT_INVALID_INPUT: i32 = 2;

/// StashKV CLI
#[derive(Parser, Debug)]
#[command(name = "stashkv-cli")]
#[command(about = "CLI for the StashKV memory-mapped JSON store")]
#[command(version)]
struct Args {
    /// Directory holding store files
    #[arg(short, long, default_value = "./stashkv_data")]
    dir: String,

    /// Store file name (a LOCAL_STORAGE_<epoch_ms> name is generated if omitted)
    #[arg(short, long)]
    file: Option<String>,

    /// Store capacity in MB
    #[arg(short = 'm', long, default_value = "16")]
    capacity_mb: usize,

    /// msync after every flush
    #[arg(long)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a key
    Create {
        /// The key to create
        key: String,

        /// The value, as a JSON object
        value: String,

        /// Time-to-live in seconds
        #[arg(short, long)]
        ttl: Option<String>,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Delete every key
    Clear,

    /// List keys in insertion order
    Keys,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,stashkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let Some(capacity) = capacity_bytes(args.capacity_mb) else {
        tracing::error!("Capacity of {} MB is too large", args.capacity_mb);
        std::process::exit(EXIT_INVALID_INPUT);
    };

    let config = Config::builder()
        .storage_dir(&args.dir)
        .max_local_storage_size(capacity)
        .sync_strategy(if args.sync {
            SyncStrategy::EveryFlush
        } else {
            SyncStrategy::OsManaged
        })
        .build();

    let engine = match open_store(&config, args.file.as_deref()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = execute(engine, args.command) {
        tracing::error!("{}", e);
        std::process::exit(exit_code(&e));
    }
}

fn capacity_bytes(capacity_mb: usize) -> Option<usize> {
    capacity_mb.checked_mul(1024 * 1024)
}

/// Run one command, then close the engine whatever the outcome
///
/// An expiring `get` fails after it has already flushed, so the close is
/// still needed. The command's error wins over the close error.
fn execute(engine: Engine, command: Commands) -> Result<(), StashError> {
    let outcome = run(&engine, command);
    let closed = engine.close();
    outcome.and(closed)
}

/// 2 for rejected input, 1 for everything else
fn exit_code(err: &StashError) -> i32 {
    if err.is_invalid_input() {
        EXIT_INVALID_INPUT
    } else {
        1
    }
}

fn run(engine: &Engine, command: Commands) -> Result<(), StashError> {
    match command {
        Commands::Create { key, value, ttl } => {
            let value: Value = serde_json::from_str(&value)
                .map_err(|e| StashError::InvalidValue(e.to_string()))?;
            let ttl = ttl.map(Value::String);
            engine.create_from_json(&Value::String(key), value, ttl.as_ref())?;
            println!("OK");
        }
        Commands::Get { key } => {
            let document = engine.get(&key)?;
            println!("{}", Value::Object(document));
        }
        Commands::Del { key } => {
            engine.delete(&key)?;
            println!("OK");
        }
        Commands::Clear => {
            engine.delete_all()?;
            println!("OK");
        }
        Commands::Keys => {
            for key in engine.keys() {
                println!("{}", key);
            }
        }
    }
    Ok(())
}
