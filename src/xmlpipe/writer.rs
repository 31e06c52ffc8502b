use crate::encode::structured::member_text;
use crate::encode::{DocumentFragment, RenderedValue};
use crate::types::MemberMarkup;
use std::io::{self, Write};

/// Writes the `sphinx:docset` envelope and one `sphinx:document` per fragment
pub struct DocsetWriter<W: Write> {
    writer: W,
    member_markup: MemberMarkup,
    documents: u64,
}

impl<W: Write> DocsetWriter<W> {
    pub fn new(writer: W) -> Self {
        DocsetWriter {
            writer,
            member_markup: MemberMarkup::default(),
            documents: 0,
        }
    }

    pub fn with_member_markup(mut self, markup: MemberMarkup) -> Self {
        self.member_markup = markup;
        self
    }

    /// XML declaration and the opening `sphinx:docset` tag
    pub fn start(&mut self) -> io::Result<()> {
        write!(
            self.writer,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><sphinx:docset>"
        )
    }

    /// Write one fragment.
    ///
    /// The document is rendered into a buffer first so a failed write never
    /// leaves half an element in the stream.
    pub fn write_document(&mut self, fragment: &DocumentFragment) -> io::Result<()> {
        let mut doc = String::with_capacity(256);
        doc.push_str("\n<sphinx:document id=\"");
        escape_into(&mut doc, fragment.id.as_str(), true);
        doc.push_str("\">");

        for field in &fragment.fields {
            doc.push('<');
            doc.push_str(&field.name);
            doc.push('>');
            match &field.value {
                RenderedValue::PlainText(text) => escape_into(&mut doc, text, false),
                RenderedValue::StructuredMembers(members) => {
                    self.members_into(&mut doc, members)
                }
            }
            doc.push_str("</");
            doc.push_str(&field.name);
            doc.push('>');
        }

        doc.push_str("</sphinx:document>");
        self.writer.write_all(doc.as_bytes())?;
        self.documents += 1;
        Ok(())
    }

    fn members_into(&self, doc: &mut String, members: &[Vec<i64>]) {
        let mut markup = String::new();
        for member in members {
            markup.push_str("<mem>");
            markup.push_str(&member_text(member));
            markup.push_str("</mem>");
        }
        match self.member_markup {
            MemberMarkup::Elements => doc.push_str(&markup),
            // digits, spaces and tags only, so `]]>` cannot occur
            MemberMarkup::Cdata if !markup.is_empty() => {
                doc.push_str("<![CDATA[");
                doc.push_str(&markup);
                doc.push_str("]]>");
            }
            MemberMarkup::Cdata => {}
        }
    }

    /// Closing `sphinx:docset` tag, then flush
    pub fn finish(&mut self) -> io::Result<()> {
        write!(self.writer, "\n</sphinx:docset>")?;
        self.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Documents written so far
    pub fn documents(&self) -> u64 {
        self.documents
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Escape XML markup characters; quotes only inside attribute values.
///
/// Characters XML 1.0 cannot carry at all, even as references, become U+FFFD.
fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\r' => out.push_str("&#13;"),
            _ if !is_xml_char(ch) => out.push(char::REPLACEMENT_CHARACTER),
            _ => out.push(ch),
        }
    }
}

/// The XML 1.0 `Char` production
fn is_xml_char(ch: char) -> bool {
    matches!(ch,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}
