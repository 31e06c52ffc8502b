//! Result sources - where pages of rows come from
//!
//! The driver only needs the result schema and a way to fetch the next page.
//! `JsonDumpSource` reads a result set saved as JSON lines; `MemorySource`
//! serves scripted pages and failures.
//!
//! A page carries one `Result` per row, so a single undecodable row does not
//! cost the rows fetched alongside it.

use crate::error::SourceError;
use crate::types::{Column, ColumnKind, ColumnSchema, CqlValue, Row};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::io::BufRead;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

/// Rows of one fetch, in result order; a row that failed to decode is an `Err`
pub type Page = Vec<Result<Row, SourceError>>;

/// A paged result set
pub trait ResultSource {
    /// Shape of every row this source yields
    fn schema(&self) -> &ColumnSchema;

    /// Fetch up to `page_size` rows; `None` once the result set is drained.
    ///
    /// An `Err` here means the whole fetch failed; per-row decode failures
    /// are reported inside the page.
    fn next_page(&mut self, page_size: usize) -> Result<Option<Page>, SourceError>;
}

/// First line of a dump file
#[derive(Debug, Deserialize)]
struct DumpHeader {
    columns: Vec<Column>,
}

/// Reads a result-set dump: a header line `{"columns": [{"name": .., "kind": ..}]}`
/// followed by one JSON object per row.
pub struct JsonDumpSource<R: BufRead> {
    reader: R,
    schema: ColumnSchema,
    line: usize,
    buffer: String,
}

impl<R: BufRead> JsonDumpSource<R> {
    pub fn new(mut reader: R) -> Result<Self, SourceError> {
        let mut buffer = String::new();
        let mut line = 0;

        let header = loop {
            buffer.clear();
            if reader.read_line(&mut buffer)? == 0 {
                return Err(SourceError::Malformed {
                    line,
                    message: "missing column header".to_string(),
                });
            }
            line += 1;
            if !buffer.trim().is_empty() {
                break serde_json::from_str::<DumpHeader>(buffer.trim()).map_err(|err| {
                    SourceError::Malformed {
                        line,
                        message: format!("invalid column header: {}", err),
                    }
                })?;
            }
        };

        let schema = ColumnSchema::new(header.columns).map_err(|err| SourceError::Malformed {
            line,
            message: err.to_string(),
        })?;

        Ok(JsonDumpSource {
            reader,
            schema,
            line,
            buffer,
        })
    }

    fn parse_row(&self, text: &str) -> Result<Row, SourceError> {
        let malformed = |message: String| SourceError::Malformed {
            line: self.line,
            message,
        };

        let object: Map<String, Value> =
            serde_json::from_str(text).map_err(|err| malformed(err.to_string()))?;

        let mut row = Row::new();
        for column in self.schema.iter() {
            let value = match object.get(&column.name) {
                Some(json) => value_from_json(json, &column.kind)
                    .map_err(|msg| malformed(format!("column `{}`: {}", column.name, msg)))?,
                None => CqlValue::Null,
            };
            row.insert(column.name.clone(), value);
        }
        Ok(row)
    }
}

impl<R: BufRead> ResultSource for JsonDumpSource<R> {
    fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    fn next_page(&mut self, page_size: usize) -> Result<Option<Page>, SourceError> {
        let mut rows = Vec::with_capacity(page_size.min(1024));
        while rows.len() < page_size.max(1) {
            self.buffer.clear();
            if self.reader.read_line(&mut self.buffer)? == 0 {
                break;
            }
            self.line += 1;
            let text = self.buffer.trim();
            if text.is_empty() {
                continue;
            }
            rows.push(self.parse_row(text));
        }

        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }
}

/// Convert a JSON cell into a value of the declared kind
pub fn value_from_json(json: &Value, kind: &ColumnKind) -> Result<CqlValue, String> {
    if json.is_null() {
        return Ok(CqlValue::Null);
    }

    let value = match kind {
        ColumnKind::Int32 => {
            let v = integer(json)?;
            CqlValue::Int(i32::try_from(v).map_err(|_| format!("{} out of int range", v))?)
        }
        ColumnKind::Int64 => CqlValue::BigInt(integer(json)?),
        ColumnKind::Counter => CqlValue::Counter(integer(json)?),
        ColumnKind::VarInt => CqlValue::VarInt(
            BigInt::from_str(number_text(json)?.trim()).map_err(|e| e.to_string())?,
        ),
        ColumnKind::Ascii | ColumnKind::Text => CqlValue::Text(string(json)?.to_string()),
        ColumnKind::Boolean => CqlValue::Boolean(
            json.as_bool()
                .ok_or_else(|| format!("expected boolean, got {}", json))?,
        ),
        ColumnKind::Double => CqlValue::Double(float(json)?),
        ColumnKind::Float => CqlValue::Float(float(json)? as f32),
        ColumnKind::Blob => CqlValue::Blob(parse_blob(string(json)?)?),
        ColumnKind::Decimal => CqlValue::Decimal(
            BigDecimal::from_str(number_text(json)?.trim()).map_err(|e| e.to_string())?,
        ),
        ColumnKind::Inet => CqlValue::Inet(
            string(json)?
                .parse::<IpAddr>()
                .map_err(|e| e.to_string())?,
        ),
        ColumnKind::Timestamp => CqlValue::Timestamp(match json {
            Value::Number(_) => {
                let millis = integer(json)?;
                DateTime::from_timestamp_millis(millis)
                    .ok_or_else(|| format!("timestamp {} out of range", millis))?
            }
            _ => DateTime::parse_from_rfc3339(string(json)?)
                .map_err(|e| e.to_string())?
                .with_timezone(&Utc),
        }),
        ColumnKind::TimeUuid => {
            CqlValue::TimeUuid(Uuid::parse_str(string(json)?).map_err(|e| e.to_string())?)
        }
        ColumnKind::SetOf(elem) => CqlValue::Set(elements(json, elem)?),
        ColumnKind::ListOf(elem) => CqlValue::List(elements(json, elem)?),
        ColumnKind::Unknown(_) => CqlValue::Null,
    };
    Ok(value)
}

fn integer(json: &Value) -> Result<i64, String> {
    match json {
        Value::Number(n) => n.as_i64().ok_or_else(|| format!("{} is not a 64-bit integer", n)),
        Value::String(s) => s.trim().parse::<i64>().map_err(|e| e.to_string()),
        other => Err(format!("expected integer, got {}", other)),
    }
}

fn float(json: &Value) -> Result<f64, String> {
    match json {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{} is not a number", n)),
        Value::String(s) => s.trim().parse::<f64>().map_err(|e| e.to_string()),
        other => Err(format!("expected number, got {}", other)),
    }
}

fn string(json: &Value) -> Result<&str, String> {
    json.as_str()
        .ok_or_else(|| format!("expected string, got {}", json))
}

/// Digits of a number given either as a JSON number or as a string
fn number_text(json: &Value) -> Result<String, String> {
    match json {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        other => Err(format!("expected number, got {}", other)),
    }
}

fn elements(json: &Value, elem: &ColumnKind) -> Result<Vec<CqlValue>, String> {
    json.as_array()
        .ok_or_else(|| format!("expected array, got {}", json))?
        .iter()
        .map(|item| value_from_json(item, elem))
        .collect()
}

/// Hex digits with an optional `0x` prefix
pub fn parse_blob(text: &str) -> Result<Vec<u8>, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    hex::decode(digits).map_err(|err| format!("invalid blob `{}`: {}", text, err))
}

/// One scripted fetch result
#[derive(Debug)]
pub enum Fetch {
    Rows(Page),
    Fail(SourceError),
}

/// In-memory source replaying a script of pages and failures.
///
/// A scripted batch larger than the requested page size is split across
/// several fetches.
#[derive(Debug)]
pub struct MemorySource {
    schema: ColumnSchema,
    script: VecDeque<Fetch>,
}

impl MemorySource {
    pub fn new(schema: ColumnSchema) -> Self {
        MemorySource {
            schema,
            script: VecDeque::new(),
        }
    }

    pub fn from_rows(schema: ColumnSchema, rows: Vec<Row>) -> Self {
        MemorySource::new(schema).rows(rows)
    }

    pub fn rows(self, rows: Vec<Row>) -> Self {
        self.page(rows.into_iter().map(Ok).collect())
    }

    /// Script a batch that may include rows which failed to decode
    pub fn page(mut self, rows: Page) -> Self {
        self.script.push_back(Fetch::Rows(rows));
        self
    }

    pub fn failure(mut self, error: SourceError) -> Self {
        self.script.push_back(Fetch::Fail(error));
        self
    }
}

impl ResultSource for MemorySource {
    fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    fn next_page(&mut self, page_size: usize) -> Result<Option<Page>, SourceError> {
        loop {
            match self.script.pop_front() {
                None => return Ok(None),
                Some(Fetch::Fail(err)) => return Err(err),
                Some(Fetch::Rows(rows)) if rows.is_empty() => continue,
                Some(Fetch::Rows(mut rows)) => {
                    let page_size = page_size.max(1);
                    if rows.len() > page_size {
                        let rest = rows.split_off(page_size);
                        self.script.push_front(Fetch::Rows(rest));
                    }
                    return Ok(Some(rows));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn rows(page: Page) -> Vec<Row> {
        page.into_iter().map(|row| row.unwrap()).collect()
    }

    const DUMP: &str = r#"{"columns": [{"name": "id", "kind": "int"}, {"name": "tags", "kind": "set<text>"}, {"name": "price", "kind": "decimal"}]}
{"id": 1, "tags": ["a", "b"], "price": "12.50"}

{"id": 2, "tags": [], "price": 3}
{"id": 3}
"#;

    #[test]
    fn test_dump_source_pages() {
        let mut source = JsonDumpSource::new(Cursor::new(DUMP)).unwrap();
        assert_eq!(source.schema().len(), 3);

        let first = rows(source.next_page(2).unwrap().unwrap());
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].get("id"), Some(&CqlValue::Int(1)));
        assert_eq!(
            first[0].get("price"),
            Some(&CqlValue::Decimal(BigDecimal::from_str("12.50").unwrap()))
        );
        assert_eq!(first[1].get("tags"), Some(&CqlValue::Set(vec![])));

        let second = rows(source.next_page(2).unwrap().unwrap());
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].get("tags"), Some(&CqlValue::Null));

        assert!(source.next_page(2).unwrap().is_none());
    }

    #[test]
    fn test_dump_source_reports_line_of_bad_row() {
        let dump = "{\"columns\": [{\"name\": \"id\", \"kind\": \"int\"}]}\n\
                    {\"id\": 1}\n{\"id\": \"x\"}\n{\"id\": 3}\n";
        let mut source = JsonDumpSource::new(Cursor::new(dump)).unwrap();
        let page = source.next_page(10).unwrap().unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].as_ref().unwrap().get("id"), Some(&CqlValue::Int(1)));
        match &page[1] {
            Err(SourceError::Malformed { line, message }) => {
                assert_eq!(*line, 3);
                assert!(message.contains("id"));
            }
            other => panic!("expected malformed row, got {:?}", other),
        }
        assert_eq!(page[2].as_ref().unwrap().get("id"), Some(&CqlValue::Int(3)));
        assert!(source.next_page(10).unwrap().is_none());
    }

    #[test]
    fn test_dump_source_requires_header() {
        assert!(matches!(
            JsonDumpSource::new(Cursor::new("")),
            Err(SourceError::Malformed { .. })
        ));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(
            value_from_json(&json!("0xCAFE"), &ColumnKind::Blob).unwrap(),
            CqlValue::Blob(vec![0xca, 0xfe])
        );
        assert_eq!(
            value_from_json(&json!(1700000000000i64), &ColumnKind::Timestamp).unwrap(),
            CqlValue::Timestamp(DateTime::from_timestamp_millis(1_700_000_000_000).unwrap())
        );
        assert_eq!(
            value_from_json(&json!("2024-03-01T12:00:00+02:00"), &ColumnKind::Timestamp).unwrap(),
            CqlValue::Timestamp(DateTime::from_timestamp(1_709_287_200, 0).unwrap())
        );
        assert_eq!(
            value_from_json(&json!("123456789012345678901234"), &ColumnKind::VarInt).unwrap(),
            CqlValue::VarInt(BigInt::from_str("123456789012345678901234").unwrap())
        );
        assert_eq!(
            value_from_json(&json!(-5), &ColumnKind::VarInt).unwrap(),
            CqlValue::VarInt(BigInt::from(-5))
        );
        assert_eq!(
            value_from_json(&json!("1.5e3"), &ColumnKind::Decimal).unwrap(),
            CqlValue::Decimal(BigDecimal::from_str("1500").unwrap())
        );
        assert!(value_from_json(&json!("1.2.3"), &ColumnKind::Decimal).is_err());
        assert!(value_from_json(&json!("0xabc"), &ColumnKind::Blob).is_err());
        assert!(value_from_json(&json!("0xzz"), &ColumnKind::Blob).is_err());
        assert_eq!(
            value_from_json(&json!([1, 2]), &ColumnKind::ListOf(Box::new(ColumnKind::Int32)))
                .unwrap(),
            CqlValue::List(vec![CqlValue::Int(1), CqlValue::Int(2)])
        );
        assert!(value_from_json(&json!(3_000_000_000i64), &ColumnKind::Int32).is_err());
        assert!(value_from_json(&json!(1), &ColumnKind::Text).is_err());
    }

    #[test]
    fn test_memory_source_splits_and_fails() {
        let schema = ColumnSchema::new(vec![Column::new("id", ColumnKind::Int32)]).unwrap();
        let rows: Vec<Row> = (0..5).map(|i| Row::new().with("id", CqlValue::Int(i))).collect();
        let mut source = MemorySource::new(schema)
            .failure(SourceError::Timeout("slow".into()))
            .rows(rows);

        assert!(matches!(source.next_page(2), Err(SourceError::Timeout(_))));
        assert_eq!(source.next_page(2).unwrap().unwrap().len(), 2);
        assert_eq!(source.next_page(2).unwrap().unwrap().len(), 2);
        assert_eq!(source.next_page(2).unwrap().unwrap().len(), 1);
        assert!(source.next_page(2).unwrap().is_none());
    }
}
