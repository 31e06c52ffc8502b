//! Document identity
//!
//! A document id is either the value of a single integral key column, or a
//! non-negative 64-bit hash over all key columns. The hash is the
//! `c + (h << 6) + (h << 16) - h` rolling hash over UTF-16 code units,
//! seeded with the first 32-bit or 64-bit integer key column.

use crate::encode::value::encode;
use crate::error::ExportError;
use crate::types::{ColumnKind, ColumnSchema, DocumentId, KeySpec, Row};
use once_cell::sync::Lazy;
use regex::Regex;

static ELEMENT_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}_][\p{L}\p{N}._-]*$").unwrap());

/// Per-query state: the result schema plus key columns resolved against it.
///
/// Built once per export run. Construction validates every precondition
/// the row encoder relies on, so a bad key list or column name fails
/// before any row is read.
#[derive(Debug, Clone)]
pub struct ExportContext {
    schema: ColumnSchema,
    key_spec: KeySpec,
    key_kinds: Vec<ColumnKind>,
}

impl ExportContext {
    pub fn new(schema: ColumnSchema, key_spec: KeySpec) -> Result<Self, ExportError> {
        if let Some(column) = schema
            .iter()
            .find(|c| !ELEMENT_NAME_REGEX.is_match(&c.name))
        {
            return Err(ExportError::InvalidElementName(column.name.clone()));
        }

        let key_kinds = key_spec
            .names()
            .iter()
            .map(|name| {
                schema
                    .kind_of(name)
                    .cloned()
                    .ok_or_else(|| ExportError::MissingKeyColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ExportContext {
            schema,
            key_spec,
            key_kinds,
        })
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn key_spec(&self) -> &KeySpec {
        &self.key_spec
    }

    /// Key column names paired with their resolved kinds, in declared order
    pub fn key_columns(&self) -> impl Iterator<Item = (&str, &ColumnKind)> {
        self.key_spec
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.key_kinds.iter())
    }

    /// Whether ids come straight from a single integral key column
    pub fn uses_fast_path(&self) -> bool {
        self.key_kinds.len() == 1 && self.key_kinds[0].is_integral()
    }
}

/// Derive the document id for `row`
pub fn identify(row: &Row, ctx: &ExportContext) -> Result<DocumentId, ExportError> {
    if ctx.uses_fast_path() {
        let (name, kind) = (&ctx.key_spec.names()[0], &ctx.key_kinds[0]);
        let text = match kind {
            ColumnKind::Int32 => row.get_i32(name)?.unwrap_or(0).to_string(),
            ColumnKind::Int64 => row.get_i64(name)?.unwrap_or(0).to_string(),
            _ => row
                .get_varint(name)?
                .map_or_else(|| "0".to_string(), |v| v.to_string()),
        };
        return Ok(DocumentId(text));
    }

    let mut hash_base: i64 = 0;
    let mut parts = Vec::with_capacity(ctx.key_kinds.len());
    for (name, kind) in ctx.key_columns() {
        if matches!(kind, ColumnKind::Int32 | ColumnKind::Int64) && hash_base == 0 {
            hash_base = read_hash_base(row, name, kind)?;
        } else {
            parts.push(encode(row.value_of(name, kind)?, kind));
        }
    }

    let accumulator = parts.join(" ");
    Ok(DocumentId(string_key(hash_base, Some(&accumulator)).to_string()))
}

/// Integer key value used as hash seed, always read as 32 bits
fn read_hash_base(row: &Row, name: &str, kind: &ColumnKind) -> Result<i64, ExportError> {
    let value = match kind {
        ColumnKind::Int64 => row.get_i64(name)?.map(|v| v as i32),
        _ => row.get_i32(name)?,
    };
    Ok(i64::from(value.unwrap_or(0)))
}

/// Rolling hash of `text` seeded with `hash_base`, folded to non-negative.
///
/// An absent text hashes to 0 whatever the seed. A hash of `i64::MIN`
/// cannot be negated and is returned unchanged.
pub fn string_key(hash_base: i64, text: Option<&str>) -> i64 {
    let Some(text) = text else {
        return 0;
    };

    let mut hash = hash_base;
    for unit in text.encode_utf16() {
        hash = i64::from(unit)
            .wrapping_add(hash.wrapping_shl(6))
            .wrapping_add(hash.wrapping_shl(16))
            .wrapping_sub(hash);
    }

    if hash > 0 {
        hash
    } else {
        (!hash).wrapping_add(1)
    }
}
