use crate::types::ColumnKind;
use thiserror::Error;

/// Errors raised while preparing or running an export
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("key specification must name at least one column")]
    EmptyKeySpec,

    #[error("key column `{0}` is not part of the result schema")]
    MissingKeyColumn(String),

    #[error("column `{0}` appears more than once in the result schema")]
    DuplicateColumn(String),

    #[error("column `{0}` cannot be used as an XML element name")]
    InvalidElementName(String),

    #[error("row has no value for column `{0}`")]
    MissingColumn(String),

    #[error("column `{column}` holds a {found} value, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: ColumnKind,
        found: &'static str,
    },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to write document stream: {0}")]
    Output(#[from] std::io::Error),
}

/// Errors raised by a result source while fetching pages
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("read timed out: {0}")]
    Timeout(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed result data at line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("failed to read result data: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Timeouts are transient; the driver may retry the same fetch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Timeout(_))
    }
}
