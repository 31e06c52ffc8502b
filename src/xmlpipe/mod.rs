//! xmlpipe2 output - the XML stream a full-text indexer bulk-loads
//!
//! The stream is one `sphinx:docset` root holding a `sphinx:document` per
//! row. Each document carries an `id` attribute and one child element per
//! column, named after the column.

pub mod writer;

pub use writer::DocsetWriter;
