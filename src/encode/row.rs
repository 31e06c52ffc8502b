use crate::encode::identity::{identify, ExportContext};
use crate::encode::structured::{is_candidate, render, RenderedValue};
use crate::encode::value::encode;
use crate::error::ExportError;
use crate::types::{DocumentId, Row};

/// One column of an encoded document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Element name, identical to the column name
    pub name: String,
    pub value: RenderedValue,
}

/// One row rendered as a document: an id plus one field per column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFragment {
    pub id: DocumentId,

    /// Fields in schema order
    pub fields: Vec<Field>,

    /// Bracketed text values that failed to parse and were kept as text
    pub structured_fallbacks: usize,
}

impl DocumentFragment {
    pub fn field(&self, name: &str) -> Option<&RenderedValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

/// Encode one row against the export context.
///
/// Fails only when the row does not match the schema (missing column or a
/// value of the wrong type); nothing is written in that case.
pub fn encode_row(row: &Row, ctx: &ExportContext) -> Result<DocumentFragment, ExportError> {
    let id = identify(row, ctx)?;
    let mut fields = Vec::with_capacity(ctx.schema().len());
    let mut structured_fallbacks = 0;

    for column in ctx.schema().iter() {
        let value = row.value_of(&column.name, &column.kind)?;
        let rendered = if column.kind.is_textual() {
            let text = encode(value, &column.kind);
            let rendered = render(&text, &column.name);
            if is_candidate(&text) && matches!(rendered, RenderedValue::PlainText(_)) {
                structured_fallbacks += 1;
            }
            rendered
        } else {
            RenderedValue::PlainText(encode(value, &column.kind))
        };

        fields.push(Field {
            name: column.name.clone(),
            value: rendered,
        });
    }

    Ok(DocumentFragment {
        id,
        fields,
        structured_fallbacks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, ColumnKind, ColumnSchema, CqlValue, KeySpec};

    fn context(columns: Vec<(&str, ColumnKind)>, keys: &[&str]) -> ExportContext {
        let schema = ColumnSchema::new(
            columns
                .into_iter()
                .map(|(name, kind)| Column::new(name, kind))
                .collect(),
        )
        .unwrap();
        ExportContext::new(schema, KeySpec::new(keys.iter().copied()).unwrap()).unwrap()
    }

    fn text(value: &str) -> RenderedValue {
        RenderedValue::PlainText(value.to_string())
    }

    #[test]
    fn test_single_integer_key_row() {
        let ctx = context(vec![("id", ColumnKind::Int32), ("tags", ColumnKind::Text)], &["id"]);
        let row = Row::new()
            .with("id", CqlValue::Int(42))
            .with("tags", CqlValue::Text("hello".into()));

        let fragment = encode_row(&row, &ctx).unwrap();
        assert_eq!(fragment.id.as_str(), "42");
        assert_eq!(fragment.fields.len(), 2);
        assert_eq!(fragment.fields[0].name, "id");
        assert_eq!(fragment.fields[0].value, text("42"));
        assert_eq!(fragment.fields[1].name, "tags");
        assert_eq!(fragment.fields[1].value, text("hello"));
        assert_eq!(fragment.structured_fallbacks, 0);
    }

    #[test]
    fn test_fields_follow_schema_order() {
        let ctx = context(
            vec![
                ("z", ColumnKind::Boolean),
                ("a", ColumnKind::Int32),
                ("m", ColumnKind::ListOf(Box::new(ColumnKind::Int32))),
            ],
            &["a"],
        );
        let row = Row::new()
            .with("a", CqlValue::Int(1))
            .with("m", CqlValue::List(vec![CqlValue::Int(4), CqlValue::Int(5)]))
            .with("z", CqlValue::Boolean(true));

        let fragment = encode_row(&row, &ctx).unwrap();
        let names: Vec<&str> = fragment.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
        assert_eq!(fragment.field("m"), Some(&text("4 5")));
    }

    #[test]
    fn test_text_columns_are_inspected_for_members() {
        let ctx = context(
            vec![
                ("id", ColumnKind::Int32),
                ("sense", ColumnKind::Ascii),
                ("broken", ColumnKind::Text),
                ("raw", ColumnKind::Blob),
            ],
            &["id"],
        );
        let row = Row::new()
            .with("id", CqlValue::Int(1))
            .with("sense", CqlValue::Text("[[1,2],[3]]".into()))
            .with("broken", CqlValue::Text("[oops]".into()))
            .with("raw", CqlValue::Blob(b"[[1]]".to_vec()));

        let fragment = encode_row(&row, &ctx).unwrap();
        assert_eq!(
            fragment.field("sense"),
            Some(&RenderedValue::StructuredMembers(vec![vec![1, 2], vec![3]]))
        );
        assert_eq!(fragment.field("broken"), Some(&text("[oops]")));
        assert_eq!(fragment.field("raw"), Some(&text("0x5b5b315d5d")));
        assert_eq!(fragment.structured_fallbacks, 1);
    }

    #[test]
    fn test_composite_key_row() {
        let ctx = context(vec![("a", ColumnKind::Int32), ("b", ColumnKind::Text)], &["a", "b"]);
        let row = Row::new()
            .with("a", CqlValue::Int(7))
            .with("b", CqlValue::Text("x".into()));

        let first = encode_row(&row, &ctx).unwrap();
        let second = encode_row(&row, &ctx).unwrap();
        assert_eq!(first.id.as_str(), "459313");
        assert_eq!(first, second);
    }

    #[test]
    fn test_null_cells_render_empty() {
        let ctx = context(vec![("id", ColumnKind::Int32), ("note", ColumnKind::Text)], &["id"]);
        let row = Row::new()
            .with("id", CqlValue::Int(3))
            .with("note", CqlValue::Null);

        let fragment = encode_row(&row, &ctx).unwrap();
        assert_eq!(fragment.field("note"), Some(&text("")));
    }

    #[test]
    fn test_row_shape_errors() {
        let ctx = context(vec![("id", ColumnKind::Int32), ("note", ColumnKind::Text)], &["id"]);

        let missing = Row::new().with("id", CqlValue::Int(3));
        assert!(matches!(
            encode_row(&missing, &ctx),
            Err(ExportError::MissingColumn(name)) if name == "note"
        ));

        let mismatched = Row::new()
            .with("id", CqlValue::Int(3))
            .with("note", CqlValue::Double(1.0));
        assert!(matches!(
            encode_row(&mismatched, &ctx),
            Err(ExportError::TypeMismatch { .. })
        ));
    }
}
