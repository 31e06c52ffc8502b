//! # xmlpipe - wide-column query export for full-text indexing
//!
//! Turns the rows of one query result into an xmlpipe2 document stream, the
//! XML format a full-text search indexer bulk-loads.
//!
//! ## Modules
//!
//! - **encode**: per-row encoding (value text, document ids, structured text)
//! - **xmlpipe**: the `sphinx:docset` document stream
//! - **source**: paged result sources
//! - **driver**: the paging loop with retry and row-failure policies
//!
//! ## Quick Start
//!
//! ```rust
//! use xmlpipe::{encode_row, Column, ColumnKind, ColumnSchema, CqlValue, ExportContext, KeySpec, Row};
//!
//! # fn main() -> anyhow::Result<()> {
//! let schema = ColumnSchema::new(vec![
//!     Column::new("id", ColumnKind::Int32),
//!     Column::new("tags", ColumnKind::Text),
//! ])?;
//! let ctx = ExportContext::new(schema, KeySpec::new(["id"])?)?;
//!
//! let row = Row::new()
//!     .with("id", CqlValue::Int(42))
//!     .with("tags", CqlValue::Text("hello".to_string()));
//!
//! let fragment = encode_row(&row, &ctx)?;
//! assert_eq!(fragment.id.as_str(), "42");
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::io::{BufRead, Write};

pub mod driver;
pub mod encode;
pub mod error;
pub mod source;
pub mod types;
pub mod xmlpipe;

// Re-export commonly used types for convenience
pub use driver::{ExportDriver, ExportStats};
pub use encode::{encode_row, identify, DocumentFragment, ExportContext, RenderedValue};
pub use error::{ExportError, SourceError};
pub use source::{JsonDumpSource, MemorySource, Page, ResultSource};
pub use types::{
    Column, ColumnKind, ColumnSchema, CqlValue, DocumentId, ExportConfig, KeySpec, MemberMarkup,
    RetryPolicy, Row, RowErrorPolicy, TimeoutAction,
};
pub use xmlpipe::DocsetWriter;

/// Main entry point: export a JSON result-set dump as an xmlpipe2 stream
pub fn export_json_dump<R: BufRead, W: Write>(
    reader: R,
    key_spec: KeySpec,
    sink: W,
    config: ExportConfig,
) -> Result<ExportStats> {
    let mut source = JsonDumpSource::new(reader).context("Failed to read result header")?;
    ExportDriver::new(config)
        .run(&mut source, key_spec, sink)
        .context("Export failed")
}
