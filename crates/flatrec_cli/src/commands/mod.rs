//! CLI command implementations.

pub mod archive;
pub mod config;
pub mod entries;

use clap::ValueEnum;
use flatrec_core::{Config, FlatStore, Platform, Registry};
use flatrec_storage::DirVolume;
use serde::Serialize;
use std::path::PathBuf;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Writes command results in the selected format.
pub struct Output {
    format: Format,
}

impl Output {
    /// Creates an output writer.
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    /// Prints `value` as JSON, or calls `text` to print it as text.
    pub fn emit<T: Serialize>(
        &self,
        value: &T,
        text: impl FnOnce(&T),
    ) -> Result<(), Box<dyn std::error::Error>> {
        match self.format {
            Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
            Format::Text => text(value),
        }
        Ok(())
    }

    /// Reports a completed edit.
    pub fn done(&self, message: &str) {
        match self.format {
            Format::Json => println!("{}", serde_json::json!({ "ok": true, "message": message })),
            Format::Text => println!("{message}"),
        }
    }
}

/// Where and how to open the store.
pub struct StoreOptions {
    /// Directory holding the flat files.
    pub root: PathBuf,
    /// Optional JSON settings file.
    pub config: Option<PathBuf>,
    /// Scratch size override.
    pub scratch: Option<usize>,
    /// Disable per-write syncs.
    pub no_sync: bool,
}

/// Opens a store over the root directory and initializes it.
pub fn open_store(options: &StoreOptions) -> Result<FlatStore, Box<dyn std::error::Error>> {
    let (mut config, registry) = match &options.config {
        Some(path) => config::CliConfig::load(path)?.apply(Config::default(), Registry::default())?,
        None => (Config::default(), Registry::default()),
    };
    if let Some(scratch) = options.scratch {
        config = config.scratch_capacity(scratch);
    }
    if options.no_sync {
        config = config.auto_sync(false);
    }

    tracing::debug!(root = %options.root.display(), "opening store");
    let volume = DirVolume::open(&options.root)?;
    let mut store = FlatStore::new(Box::new(volume), Platform::host(), config, registry)?;
    store.begin()?;
    Ok(store)
}
