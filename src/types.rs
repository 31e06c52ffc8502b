use crate::error::ExportError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use uuid::Uuid;

/// Semantic type tag of a result column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnKind {
    Int32,
    Int64,
    VarInt,
    Ascii,
    Text,
    Boolean,
    Double,
    Float,
    Blob,
    Counter,
    Decimal,
    Inet,
    Timestamp,
    TimeUuid,
    SetOf(Box<ColumnKind>),
    ListOf(Box<ColumnKind>),
    /// Anything the exporter does not know how to render; keeps the type name
    Unknown(String),
}

impl ColumnKind {
    /// Parse a CQL type name such as `bigint` or `set<text>`.
    ///
    /// Unrecognised names, and collections whose element is not a
    /// primitive kind, become `Unknown`.
    pub fn parse(name: &str) -> ColumnKind {
        let trimmed = name.trim();
        let lower = trimmed.to_ascii_lowercase();

        if let Some(inner) = collection_element(&lower, "set") {
            return match ColumnKind::parse(inner) {
                kind if kind.is_primitive() => ColumnKind::SetOf(Box::new(kind)),
                _ => ColumnKind::Unknown(trimmed.to_string()),
            };
        }
        if let Some(inner) = collection_element(&lower, "list") {
            return match ColumnKind::parse(inner) {
                kind if kind.is_primitive() => ColumnKind::ListOf(Box::new(kind)),
                _ => ColumnKind::Unknown(trimmed.to_string()),
            };
        }

        match lower.as_str() {
            "int" => ColumnKind::Int32,
            "bigint" => ColumnKind::Int64,
            "varint" => ColumnKind::VarInt,
            "ascii" => ColumnKind::Ascii,
            "text" | "varchar" => ColumnKind::Text,
            "boolean" => ColumnKind::Boolean,
            "double" => ColumnKind::Double,
            "float" => ColumnKind::Float,
            "blob" => ColumnKind::Blob,
            "counter" => ColumnKind::Counter,
            "decimal" => ColumnKind::Decimal,
            "inet" => ColumnKind::Inet,
            "timestamp" => ColumnKind::Timestamp,
            "timeuuid" => ColumnKind::TimeUuid,
            _ => ColumnKind::Unknown(trimmed.to_string()),
        }
    }

    /// Scalar kinds that may appear as collection elements
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            ColumnKind::SetOf(_) | ColumnKind::ListOf(_) | ColumnKind::Unknown(_)
        )
    }

    /// Int32, Int64 or VarInt: kinds eligible for the id fast path
    pub fn is_integral(&self) -> bool {
        matches!(self, ColumnKind::Int32 | ColumnKind::Int64 | ColumnKind::VarInt)
    }

    /// Ascii or Text: values offered to structured-text detection
    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnKind::Ascii | ColumnKind::Text)
    }
}

fn collection_element<'a>(name: &'a str, collection: &str) -> Option<&'a str> {
    name.strip_prefix(collection)?
        .trim_start()
        .strip_prefix('<')?
        .strip_suffix('>')
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Int32 => f.write_str("int"),
            ColumnKind::Int64 => f.write_str("bigint"),
            ColumnKind::VarInt => f.write_str("varint"),
            ColumnKind::Ascii => f.write_str("ascii"),
            ColumnKind::Text => f.write_str("text"),
            ColumnKind::Boolean => f.write_str("boolean"),
            ColumnKind::Double => f.write_str("double"),
            ColumnKind::Float => f.write_str("float"),
            ColumnKind::Blob => f.write_str("blob"),
            ColumnKind::Counter => f.write_str("counter"),
            ColumnKind::Decimal => f.write_str("decimal"),
            ColumnKind::Inet => f.write_str("inet"),
            ColumnKind::Timestamp => f.write_str("timestamp"),
            ColumnKind::TimeUuid => f.write_str("timeuuid"),
            ColumnKind::SetOf(inner) => write!(f, "set<{}>", inner),
            ColumnKind::ListOf(inner) => write!(f, "list<{}>", inner),
            ColumnKind::Unknown(name) => f.write_str(name),
        }
    }
}

impl From<String> for ColumnKind {
    fn from(name: String) -> Self {
        ColumnKind::parse(&name)
    }
}

impl From<ColumnKind> for String {
    fn from(kind: ColumnKind) -> Self {
        kind.to_string()
    }
}

/// One column of a result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Column {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered shape of a result set; order drives output element order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub columns: Vec<Column>,
}

impl ColumnSchema {
    /// Build a schema, rejecting duplicate column names
    pub fn new(columns: Vec<Column>) -> Result<Self, ExportError> {
        for (idx, column) in columns.iter().enumerate() {
            if columns[..idx].iter().any(|c| c.name == column.name) {
                return Err(ExportError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(ColumnSchema { columns })
    }

    pub fn kind_of(&self, name: &str) -> Option<&ColumnKind> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A dynamically typed cell value
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    Null,
    Int(i32),
    BigInt(i64),
    VarInt(BigInt),
    Counter(i64),
    Text(String),
    Boolean(bool),
    Double(f64),
    Float(f32),
    Blob(Vec<u8>),
    Decimal(BigDecimal),
    Inet(IpAddr),
    Timestamp(DateTime<Utc>),
    TimeUuid(Uuid),
    Set(Vec<CqlValue>),
    List(Vec<CqlValue>),
}

impl CqlValue {
    /// Short name of the value's variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            CqlValue::Null => "null",
            CqlValue::Int(_) => "int",
            CqlValue::BigInt(_) => "bigint",
            CqlValue::VarInt(_) => "varint",
            CqlValue::Counter(_) => "counter",
            CqlValue::Text(_) => "text",
            CqlValue::Boolean(_) => "boolean",
            CqlValue::Double(_) => "double",
            CqlValue::Float(_) => "float",
            CqlValue::Blob(_) => "blob",
            CqlValue::Decimal(_) => "decimal",
            CqlValue::Inet(_) => "inet",
            CqlValue::Timestamp(_) => "timestamp",
            CqlValue::TimeUuid(_) => "timeuuid",
            CqlValue::Set(_) => "set",
            CqlValue::List(_) => "list",
        }
    }

    /// Whether this value can be read as `kind`. Null fits every kind.
    pub fn fits(&self, kind: &ColumnKind) -> bool {
        match (self, kind) {
            (CqlValue::Null, _) => true,
            (CqlValue::Int(_), ColumnKind::Int32)
            | (CqlValue::BigInt(_), ColumnKind::Int64)
            | (CqlValue::VarInt(_), ColumnKind::VarInt)
            | (CqlValue::Counter(_), ColumnKind::Counter)
            | (CqlValue::Text(_), ColumnKind::Ascii | ColumnKind::Text)
            | (CqlValue::Boolean(_), ColumnKind::Boolean)
            | (CqlValue::Double(_), ColumnKind::Double)
            | (CqlValue::Float(_), ColumnKind::Float)
            | (CqlValue::Blob(_), ColumnKind::Blob)
            | (CqlValue::Decimal(_), ColumnKind::Decimal)
            | (CqlValue::Inet(_), ColumnKind::Inet)
            | (CqlValue::Timestamp(_), ColumnKind::Timestamp)
            | (CqlValue::TimeUuid(_), ColumnKind::TimeUuid) => true,
            (CqlValue::Set(items), ColumnKind::SetOf(elem))
            | (CqlValue::List(items), ColumnKind::ListOf(elem)) => {
                items.iter().all(|item| item.fits(elem))
            }
            (_, ColumnKind::Unknown(_)) => true,
            _ => false,
        }
    }
}

/// One result row: ordered `(column name, value)` pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, CqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Row { cells: Vec::new() }
    }

    /// Builder-style insert; replaces an existing value with the same name
    pub fn with(mut self, name: impl Into<String>, value: CqlValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: CqlValue) {
        let name = name.into();
        match self.cells.iter_mut().find(|(n, _)| *n == name) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CqlValue> {
        self.cells.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Checked read of `name` as `kind`
    pub fn value_of(&self, name: &str, kind: &ColumnKind) -> Result<&CqlValue, ExportError> {
        let value = self
            .get(name)
            .ok_or_else(|| ExportError::MissingColumn(name.to_string()))?;
        if value.fits(kind) {
            Ok(value)
        } else {
            Err(ExportError::TypeMismatch {
                column: name.to_string(),
                expected: kind.clone(),
                found: value.type_name(),
            })
        }
    }

    pub fn get_i32(&self, name: &str) -> Result<Option<i32>, ExportError> {
        match self.value_of(name, &ColumnKind::Int32)? {
            CqlValue::Int(v) => Ok(Some(*v)),
            _ => Ok(None),
        }
    }

    /// Reads bigint and counter columns
    pub fn get_i64(&self, name: &str) -> Result<Option<i64>, ExportError> {
        match self.get(name) {
            Some(CqlValue::Counter(v)) => Ok(Some(*v)),
            _ => match self.value_of(name, &ColumnKind::Int64)? {
                CqlValue::BigInt(v) => Ok(Some(*v)),
                _ => Ok(None),
            },
        }
    }

    pub fn get_varint(&self, name: &str) -> Result<Option<&BigInt>, ExportError> {
        match self.value_of(name, &ColumnKind::VarInt)? {
            CqlValue::VarInt(v) => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    pub fn get_text(&self, name: &str) -> Result<Option<&str>, ExportError> {
        match self.value_of(name, &ColumnKind::Text)? {
            CqlValue::Text(v) => Ok(Some(v.as_str())),
            _ => Ok(None),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>, ExportError> {
        match self.value_of(name, &ColumnKind::Boolean)? {
            CqlValue::Boolean(v) => Ok(Some(*v)),
            _ => Ok(None),
        }
    }

    pub fn get_f64(&self, name: &str) -> Result<Option<f64>, ExportError> {
        match self.value_of(name, &ColumnKind::Double)? {
            CqlValue::Double(v) => Ok(Some(*v)),
            _ => Ok(None),
        }
    }

    pub fn get_f32(&self, name: &str) -> Result<Option<f32>, ExportError> {
        match self.value_of(name, &ColumnKind::Float)? {
            CqlValue::Float(v) => Ok(Some(*v)),
            _ => Ok(None),
        }
    }

    pub fn get_bytes(&self, name: &str) -> Result<Option<&[u8]>, ExportError> {
        match self.value_of(name, &ColumnKind::Blob)? {
            CqlValue::Blob(v) => Ok(Some(v.as_slice())),
            _ => Ok(None),
        }
    }

    pub fn get_decimal(&self, name: &str) -> Result<Option<&BigDecimal>, ExportError> {
        match self.value_of(name, &ColumnKind::Decimal)? {
            CqlValue::Decimal(v) => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    pub fn get_inet(&self, name: &str) -> Result<Option<IpAddr>, ExportError> {
        match self.value_of(name, &ColumnKind::Inet)? {
            CqlValue::Inet(v) => Ok(Some(*v)),
            _ => Ok(None),
        }
    }

    /// Reads timestamp columns, and timeuuid columns through their embedded time
    pub fn get_timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>, ExportError> {
        match self.get(name) {
            Some(CqlValue::TimeUuid(id)) => Ok(crate::encode::value::timeuuid_instant(id)),
            _ => match self.value_of(name, &ColumnKind::Timestamp)? {
                CqlValue::Timestamp(v) => Ok(Some(*v)),
                _ => Ok(None),
            },
        }
    }

    /// Elements of a set or list column of the given collection kind
    pub fn get_collection(
        &self,
        name: &str,
        kind: &ColumnKind,
    ) -> Result<Option<&[CqlValue]>, ExportError> {
        match self.value_of(name, kind)? {
            CqlValue::Set(items) | CqlValue::List(items) => Ok(Some(items.as_slice())),
            _ => Ok(None),
        }
    }
}

/// Ordered, non-empty list of column names that form a document's identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec(Vec<String>);

impl KeySpec {
    pub fn new<I, S>(names: I) -> Result<Self, ExportError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(ExportError::EmptyKeySpec);
        }
        Ok(KeySpec(names))
    }

    /// Parse a comma-separated list, dropping empty items
    pub fn parse(list: &str) -> Result<Self, ExportError> {
        KeySpec::new(
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty()),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identifier written as the `id` attribute of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        DocumentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How nested integer lists found in text columns are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemberMarkup {
    /// Real `<mem>` child elements
    #[default]
    Elements,
    /// `<mem>` markup inside a CDATA section, as older exports wrote it
    Cdata,
}

/// What to do once a retryable read error outlives the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutAction {
    #[default]
    Abort,
    /// Log the failure and keep draining the result set
    Skip,
}

/// What to do with a row that fails to encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowErrorPolicy {
    #[default]
    Skip,
    Abort,
}

/// Bounded exponential backoff for retryable page fetches
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per page, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Upper bound on any single delay
    pub max_backoff: Duration,

    /// Factor applied to the delay after each retry
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        }
    }

    /// Delay to wait before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(300),
            multiplier: 2,
        }
    }
}

/// Configuration for one export run
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Rows requested per page from the result source
    pub page_size: usize,

    /// Retry behaviour for transient read failures
    pub retry: RetryPolicy,

    /// Action once retries for a page are exhausted
    pub on_timeout: TimeoutAction,

    /// Consecutive pages `TimeoutAction::Skip` may give up on before the
    /// export aborts anyway
    pub max_skipped_pages: u32,

    /// Action when a row cannot be encoded
    pub on_row_error: RowErrorPolicy,

    /// Rendering of structured text members
    pub member_markup: MemberMarkup,

    /// Rows between progress log lines
    pub progress_interval: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            page_size: 1000,
            retry: RetryPolicy::default(),
            on_timeout: TimeoutAction::Abort,
            max_skipped_pages: 10,
            on_row_error: RowErrorPolicy::Skip,
            member_markup: MemberMarkup::Elements,
            progress_interval: 1000,
        }
    }
}
