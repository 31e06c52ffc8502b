//! xmlpipe-export: stream a saved query result as an xmlpipe2 document set
//!
//! Usage:
//!   # Read a result dump from a file, write XML to stdout
//!   xmlpipe-export --keys id result.jsonl
//!
//!   # Composite key from stdin, debug log to a file
//!   cat result.jsonl | xmlpipe-export --keys user,day --debug export.log
//!
//! The input's first line declares the columns:
//!   {"columns": [{"name": "id", "kind": "int"}, {"name": "tags", "kind": "set<text>"}]}
//! and every following line is one row object.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use xmlpipe::{
    export_json_dump, ExportConfig, KeySpec, MemberMarkup, RetryPolicy, RowErrorPolicy,
    TimeoutAction,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnTimeout {
    Abort,
    Skip,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnRowError {
    Skip,
    Abort,
}

#[derive(Parser, Debug)]
#[command(name = "xmlpipe-export")]
#[command(about = "Export a query result as an xmlpipe2 document stream", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Names of key columns. A single int/bigint/varint key is used as the
    /// document id directly; anything else is hashed into one
    #[arg(long, value_name = "COLUMN,COLUMN", required = true, value_delimiter = ',')]
    keys: Vec<String>,

    /// Rows fetched per page
    #[arg(long, default_value_t = 1000)]
    page_size: usize,

    /// Retries for a page fetch that timed out
    #[arg(long, default_value_t = 4)]
    max_retries: u32,

    /// What to do when a page still times out after all retries
    #[arg(long, value_enum, default_value = "abort")]
    on_timeout: OnTimeout,

    /// With --on-timeout skip, abort after this many pages in a row were lost
    #[arg(long, default_value_t = 10)]
    max_skipped_pages: u32,

    /// What to do with a row that cannot be encoded
    #[arg(long, value_enum, default_value = "skip")]
    on_row_error: OnRowError,

    /// Write <mem> members inside CDATA instead of as elements
    #[arg(long)]
    cdata_members: bool,

    /// Write debug logging to this file
    #[arg(long, value_name = "FILE")]
    debug: Option<String>,

    /// Log progress to stderr
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let key_spec = KeySpec::new(
        args.keys
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty()),
    )?;

    let config = ExportConfig {
        page_size: args.page_size,
        retry: RetryPolicy {
            max_attempts: args.max_retries.saturating_add(1),
            ..RetryPolicy::default()
        },
        on_timeout: match args.on_timeout {
            OnTimeout::Abort => TimeoutAction::Abort,
            OnTimeout::Skip => TimeoutAction::Skip,
        },
        max_skipped_pages: args.max_skipped_pages,
        on_row_error: match args.on_row_error {
            OnRowError::Skip => RowErrorPolicy::Skip,
            OnRowError::Abort => RowErrorPolicy::Abort,
        },
        member_markup: if args.cdata_members {
            MemberMarkup::Cdata
        } else {
            MemberMarkup::Elements
        },
        progress_interval: args.page_size,
    };

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open input: {}", path))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };
    let sink = BufWriter::new(std::io::stdout().lock());

    let stats = export_json_dump(reader, key_spec, sink, config)?;
    if stats.rows_skipped > 0 || stats.pages_skipped > 0 {
        eprintln!(
            "⚠ Warning: {} rows and {} pages were skipped",
            stats.rows_skipped, stats.pages_skipped
        );
    }
    Ok(())
}

/// Logs go to stderr, or to the `--debug` file at debug level
fn init_logging(args: &Args) -> Result<()> {
    match &args.debug {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create debug file: {}", path))?;
            tracing_subscriber::fmt()
                .with_max_level(Level::DEBUG)
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            let default = if args.verbose { "debug" } else { "warn" };
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
                )
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
