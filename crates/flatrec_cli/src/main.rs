//! flatrec CLI
//!
//! Command-line tools for inspecting and maintaining flatrec files in a
//! host directory.
//!
//! # Commands
//!
//! - `files` - List the registry and which files exist
//! - `cat`, `get`, `last`, `count`, `search` - Read entries
//! - `append`, `replace`, `insert`, `delete`, `headers`, `overwrite`, `wipe` - Edit entries
//! - `read-bytes` - Dump a raw byte range
//! - `archive`, `restore`, `prune`, `archives` - Manage timestamped archives
//! - `tree` - Print the directory tree

mod commands;

use clap::{Parser, Subcommand};
use commands::{Format, Output, StoreOptions};
use flatrec_core::FileKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// flatrec command-line tools.
#[derive(Parser)]
#[command(name = "flatrec")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the flat files
    #[arg(global = true, short, long, default_value = ".")]
    root: PathBuf,

    /// JSON file overriding settings and file names
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Scratch buffer size in bytes (overrides the config file)
    #[arg(global = true, long)]
    scratch: Option<usize>,

    /// Skip syncing after each write
    #[arg(global = true, long)]
    no_sync: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered files, their names, and sizes
    Files,

    /// Print a whole file
    Cat {
        /// File kind (e.g. user-table)
        kind: FileKind,

        /// Show delimiters and control bytes as escapes
        #[arg(short, long)]
        escape: bool,
    },

    /// Print one entry (0 is the header)
    Get {
        /// File kind
        kind: FileKind,
        /// Entry ordinal
        ordinal: u32,
    },

    /// Print the last entry
    Last {
        /// File kind
        kind: FileKind,
    },

    /// Count data entries (the header is not counted)
    Count {
        /// File kind
        kind: FileKind,
    },

    /// Find the entry containing the Nth occurrence of some text
    Search {
        /// File kind
        kind: FileKind,
        /// Text to find
        text: String,
        /// Which occurrence, counted from 1
        #[arg(short, long, default_value = "1")]
        occurrence: u32,
    },

    /// Append an entry
    Append {
        /// File kind
        kind: FileKind,
        /// Entry text
        text: String,
    },

    /// Replace an entry
    Replace {
        /// File kind
        kind: FileKind,
        /// Entry ordinal
        ordinal: u32,
        /// New entry text
        text: String,
    },

    /// Insert an entry before the one at an ordinal
    Insert {
        /// File kind
        kind: FileKind,
        /// Ordinal the new entry will have
        ordinal: u32,
        /// Entry text
        text: String,
    },

    /// Delete an entry
    Delete {
        /// File kind
        kind: FileKind,
        /// Entry ordinal
        ordinal: u32,
    },

    /// Write the header line
    Headers {
        /// File kind
        kind: FileKind,
        /// Header text
        headers: String,
        /// Overwrite an existing header
        #[arg(long)]
        force: bool,
    },

    /// Write raw text at a byte offset, padding with spaces past the end
    Overwrite {
        /// File kind
        kind: FileKind,
        /// Byte offset
        offset: u64,
        /// Text to write
        text: String,
    },

    /// Dump a byte range
    ReadBytes {
        /// File kind
        kind: FileKind,
        /// Byte offset
        offset: u64,
        /// Number of bytes
        count: usize,
    },

    /// Truncate a file to zero bytes
    Wipe {
        /// File kind
        kind: FileKind,
    },

    /// Copy every registered file into a new timestamped folder
    Archive,

    /// Restore the closest archive taken after a Unix time
    Restore {
        /// Unix time; the first archive strictly after it is restored
        after: u64,
    },

    /// Delete archives
    Prune {
        /// Delete archives older than this Unix time
        #[arg(short, long, conflicts_with = "all")]
        before: Option<u64>,

        /// Delete every archive
        #[arg(short, long)]
        all: bool,
    },

    /// List archive timestamps
    Archives,

    /// Print the directory tree
    Tree {
        /// Directory to start from, relative to the root
        #[arg(default_value = "")]
        path: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let out = Output::new(cli.format);
    if let Commands::Version = cli.command {
        println!("flatrec CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("flatrec Core v{}", flatrec_core::VERSION);
        return Ok(());
    }

    let options = StoreOptions {
        root: cli.root,
        config: cli.config,
        scratch: cli.scratch,
        no_sync: cli.no_sync,
    };
    let mut store = commands::open_store(&options)?;

    match cli.command {
        Commands::Files => commands::entries::files(&mut store, &out)?,
        Commands::Cat { kind, escape } => commands::entries::cat(&mut store, &out, kind, escape)?,
        Commands::Get { kind, ordinal } => commands::entries::get(&mut store, &out, kind, ordinal)?,
        Commands::Last { kind } => commands::entries::last(&mut store, &out, kind)?,
        Commands::Count { kind } => commands::entries::count(&mut store, &out, kind)?,
        Commands::Search {
            kind,
            text,
            occurrence,
        } => commands::entries::search(&mut store, &out, kind, &text, occurrence)?,
        Commands::Append { kind, text } => {
            store.append(kind, &text)?;
            out.done(&format!("appended to {kind}"));
        }
        Commands::Replace {
            kind,
            ordinal,
            text,
        } => {
            store.replace(kind, ordinal, &text)?;
            out.done(&format!("replaced entry {ordinal} of {kind}"));
        }
        Commands::Insert {
            kind,
            ordinal,
            text,
        } => {
            store.insert(kind, ordinal, &text)?;
            out.done(&format!("inserted entry {ordinal} into {kind}"));
        }
        Commands::Delete { kind, ordinal } => {
            store.delete(kind, ordinal)?;
            out.done(&format!("deleted entry {ordinal} of {kind}"));
        }
        Commands::Headers {
            kind,
            headers,
            force,
        } => {
            if store.set_headers(kind, &headers, !force)? {
                out.done(&format!("wrote headers of {kind}"));
            } else {
                out.done(&format!("{kind} already has headers; use --force to replace them"));
            }
        }
        Commands::Overwrite { kind, offset, text } => {
            store.overwrite_bytes(kind, offset, text.as_bytes())?;
            out.done(&format!("wrote {} bytes at {offset} in {kind}", text.len()));
        }
        Commands::ReadBytes {
            kind,
            offset,
            count,
        } => commands::entries::read_bytes(&mut store, &out, kind, offset, count)?,
        Commands::Wipe { kind } => {
            store.wipe_file(kind)?;
            out.done(&format!("wiped {kind}"));
        }
        Commands::Archive => commands::archive::archive(&mut store, &out)?,
        Commands::Restore { after } => commands::archive::restore(&mut store, &out, after)?,
        Commands::Prune { before, all } => {
            let before = match (before, all) {
                (Some(before), false) => before,
                (None, true) => 0,
                _ => return Err("prune needs --before <UNIX_TIME> or --all".into()),
            };
            commands::archive::prune(&mut store, &out, before)?;
        }
        Commands::Archives => commands::archive::archives(&mut store, &out)?,
        Commands::Tree { path } => commands::archive::tree(&mut store, &out, &path)?,
        Commands::Version => {}
    }

    store.close_current()?;
    Ok(())
}
