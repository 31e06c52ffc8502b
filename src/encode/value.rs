//! Textual rendering of single cell values
//!
//! Every column kind has one canonical text form. Rendering never fails:
//! unknown kinds, and values that do not match the declared kind, come out
//! as the empty string.

use crate::types::{ColumnKind, CqlValue};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Render `value` as text according to its declared `kind`
pub fn encode(value: &CqlValue, kind: &ColumnKind) -> String {
    match (kind, value) {
        (_, CqlValue::Null) => String::new(),
        (ColumnKind::SetOf(elem), CqlValue::Set(items))
        | (ColumnKind::ListOf(elem), CqlValue::List(items)) => encode_collection(items, elem),
        (ColumnKind::SetOf(_) | ColumnKind::ListOf(_) | ColumnKind::Unknown(_), _) => String::new(),
        (kind, value) => encode_scalar(value, kind).unwrap_or_default(),
    }
}

/// Scalar rule for a primitive kind; `None` when value and kind disagree
fn encode_scalar(value: &CqlValue, kind: &ColumnKind) -> Option<String> {
    let text = match (kind, value) {
        (ColumnKind::Int32, CqlValue::Int(v)) => v.to_string(),
        (ColumnKind::Int64, CqlValue::BigInt(v)) => v.to_string(),
        (ColumnKind::Counter, CqlValue::Counter(v)) => v.to_string(),
        (ColumnKind::VarInt, CqlValue::VarInt(v)) => v.to_string(),
        (ColumnKind::Ascii | ColumnKind::Text, CqlValue::Text(v)) => v.clone(),
        (ColumnKind::Boolean, CqlValue::Boolean(v)) => v.to_string(),
        (ColumnKind::Double, CqlValue::Double(v)) => v.to_string(),
        (ColumnKind::Float, CqlValue::Float(v)) => v.to_string(),
        (ColumnKind::Blob, CqlValue::Blob(bytes)) => encode_blob(bytes),
        (ColumnKind::Decimal, CqlValue::Decimal(v)) => v.to_plain_string(),
        (ColumnKind::Inet, CqlValue::Inet(addr)) => addr.to_string(),
        (ColumnKind::Timestamp, CqlValue::Timestamp(at)) => encode_timestamp(at),
        (ColumnKind::TimeUuid, CqlValue::TimeUuid(id)) => match timeuuid_instant(id) {
            Some(at) => encode_timestamp(&at),
            None => id.hyphenated().to_string(),
        },
        _ => return None,
    };
    Some(text)
}

/// Elements joined by single spaces; an empty collection is the empty string
fn encode_collection(items: &[CqlValue], elem: &ColumnKind) -> String {
    if !elem.is_primitive() {
        return String::new();
    }
    items
        .iter()
        .map(|item| encode_scalar(item, elem).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `0x` followed by lowercase hex digits
pub fn encode_blob(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-03-01T12:00:00.000Z`
pub fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Instant embedded in a version 1 (time-based) uuid
pub fn timeuuid_instant(id: &Uuid) -> Option<DateTime<Utc>> {
    let (secs, nanos) = id.get_timestamp()?.to_unix();
    DateTime::from_timestamp(i64::try_from(secs).ok()?, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::TimeZone;
    use num_bigint::BigInt;
    use std::net::IpAddr;
    use std::str::FromStr;

    fn decimal(text: &str) -> String {
        encode(
            &CqlValue::Decimal(BigDecimal::from_str(text).unwrap()),
            &ColumnKind::Decimal,
        )
    }

    fn list_of(kind: ColumnKind) -> ColumnKind {
        ColumnKind::ListOf(Box::new(kind))
    }

    #[test]
    fn test_integers() {
        assert_eq!(encode(&CqlValue::Int(-42), &ColumnKind::Int32), "-42");
        assert_eq!(encode(&CqlValue::BigInt(1_000_000), &ColumnKind::Int64), "1000000");
        assert_eq!(encode(&CqlValue::Counter(7), &ColumnKind::Counter), "7");
        assert_eq!(
            encode(&CqlValue::VarInt(BigInt::from(i64::MIN)), &ColumnKind::VarInt),
            "-9223372036854775808"
        );
        let wide = "-123456789012345678901234567890123456789012345678901234567890";
        assert_eq!(
            encode(&CqlValue::VarInt(BigInt::from_str(wide).unwrap()), &ColumnKind::VarInt),
            wide
        );
    }

    #[test]
    fn test_text_and_boolean() {
        assert_eq!(encode(&CqlValue::Text("a <b>".into()), &ColumnKind::Ascii), "a <b>");
        assert_eq!(encode(&CqlValue::Boolean(true), &ColumnKind::Boolean), "true");
        assert_eq!(encode(&CqlValue::Boolean(false), &ColumnKind::Boolean), "false");
    }

    #[test]
    fn test_floats_use_shortest_form() {
        assert_eq!(encode(&CqlValue::Double(0.1), &ColumnKind::Double), "0.1");
        assert_eq!(encode(&CqlValue::Double(2.0), &ColumnKind::Double), "2");
        assert_eq!(encode(&CqlValue::Float(1.5), &ColumnKind::Float), "1.5");
        assert_eq!(encode(&CqlValue::Double(f64::NAN), &ColumnKind::Double), "NaN");
    }

    #[test]
    fn test_blob_is_hex() {
        let value = CqlValue::Blob(vec![0xca, 0xfe, 0x00, 0x01]);
        assert_eq!(encode(&value, &ColumnKind::Blob), "0xcafe0001");
        assert_eq!(encode(&CqlValue::Blob(vec![]), &ColumnKind::Blob), "0x");
    }

    #[test]
    fn test_decimal_keeps_full_scale() {
        assert_eq!(decimal("123.45"), "123.45");
        assert_eq!(decimal("-0.005"), "-0.005");
        assert_eq!(decimal("1.00"), "1.00");
        assert_eq!(decimal("12"), "12");
        assert_eq!(decimal("12e3"), "12000");
        assert_eq!(
            decimal("3.14159265358979323846264338327950288419716939937510"),
            "3.14159265358979323846264338327950288419716939937510"
        );
    }

    #[test]
    fn test_inet() {
        let v4: IpAddr = "10.0.0.1".parse().unwrap();
        let v6: IpAddr = "::1".parse().unwrap();
        assert_eq!(encode(&CqlValue::Inet(v4), &ColumnKind::Inet), "10.0.0.1");
        assert_eq!(encode(&CqlValue::Inet(v6), &ColumnKind::Inet), "::1");
    }

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(
            encode(&CqlValue::Timestamp(at), &ColumnKind::Timestamp),
            "2024-03-01T12:30:05.000Z"
        );
    }

    #[test]
    fn test_timeuuid_renders_embedded_time() {
        let id = Uuid::parse_str("e5f7b4a0-78ce-11e6-8b77-86f30ca893d3").unwrap();
        let text = encode(&CqlValue::TimeUuid(id), &ColumnKind::TimeUuid);
        assert!(text.starts_with("2016-09-12T09:54:29."), "unexpected rendering {}", text);
        assert!(text.ends_with('Z'));

        let random = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            encode(&CqlValue::TimeUuid(random), &ColumnKind::TimeUuid),
            "550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn test_list_joins_with_spaces() {
        let value = CqlValue::List(vec![CqlValue::Int(1), CqlValue::Int(2), CqlValue::Int(3)]);
        assert_eq!(encode(&value, &list_of(ColumnKind::Int32)), "1 2 3");
        assert_eq!(encode(&CqlValue::List(vec![]), &list_of(ColumnKind::Int32)), "");
    }

    #[test]
    fn test_set_contains_every_element() {
        let kind = ColumnKind::SetOf(Box::new(ColumnKind::Text));
        let value = CqlValue::Set(vec![
            CqlValue::Text("b".into()),
            CqlValue::Text("a".into()),
        ]);
        let text = encode(&value, &kind);
        let mut parts: Vec<&str> = text.split(' ').collect();
        parts.sort();
        assert_eq!(parts, vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_and_mismatched_render_empty() {
        let unknown = ColumnKind::Unknown("map<int, text>".into());
        assert_eq!(encode(&CqlValue::Int(1), &unknown), "");
        assert_eq!(encode(&CqlValue::Text("x".into()), &ColumnKind::Int32), "");
        assert_eq!(encode(&CqlValue::Int(1), &list_of(ColumnKind::Int32)), "");
        assert_eq!(encode(&CqlValue::Null, &ColumnKind::Text), "");
    }
}
