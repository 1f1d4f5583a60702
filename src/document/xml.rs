//! XML rendering of a unit's result set
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <unit name="Growth">
//!   <row>
//!     <id type="integer">1</id>
//!     <val type="float">10.5</val>
//!   </row>
//! </unit>
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::SecondsFormat;
use std::borrow::Cow;
use std::fmt::Write;

use super::names::encode_name;
use super::DocumentBuilder;
use crate::errors::{SerializationCause, SerializationError};
use crate::models::{Document, ResultSet, Value};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
pub const UNIT_ELEMENT: &str = "unit";
pub const ROW_ELEMENT: &str = "row";

/// Renders result sets as one XML document per unit
#[derive(Debug, Clone, Default)]
pub struct XmlDocumentBuilder;

impl XmlDocumentBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentBuilder for XmlDocumentBuilder {
    fn build(&self, unit_name: &str, result: &ResultSet) -> Result<Document, SerializationError> {
        render(unit_name, result)
            .map(|content| Document {
                unit_name: unit_name.to_string(),
                content,
            })
            .map_err(|cause| SerializationError::new(unit_name, cause))
    }
}

fn render(unit_name: &str, result: &ResultSet) -> Result<String, SerializationCause> {
    ensure_representable(unit_name, || "unit name".to_string())?;

    let mut xml = String::with_capacity(128 + result.len() * 64);
    xml.push_str(XML_DECLARATION);
    xml.push('\n');

    let unit_attr = escape_attribute(unit_name);
    if result.is_empty() {
        let _ = writeln!(xml, "<{UNIT_ELEMENT} name=\"{unit_attr}\"/>");
        return Ok(xml);
    }

    // Element names are shared by every row
    let element_names = result
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            if column.name.is_empty() {
                Err(SerializationCause::EmptyColumnName { index })
            } else {
                Ok(encode_name(&column.name))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let _ = writeln!(xml, "<{UNIT_ELEMENT} name=\"{unit_attr}\">");
    for (row_index, row) in result.rows().iter().enumerate() {
        if row.len() != element_names.len() {
            return Err(SerializationCause::ShapeMismatch {
                row: row_index,
                expected: element_names.len(),
                actual: row.len(),
            });
        }
        if row.is_empty() {
            let _ = writeln!(xml, "  <{ROW_ELEMENT}/>");
            continue;
        }

        let _ = writeln!(xml, "  <{ROW_ELEMENT}>");
        for ((column, value), element) in row.iter().zip(&element_names) {
            let type_name = value.type_name();
            match value_text(value) {
                None => {
                    let _ = writeln!(xml, "    <{element} type=\"{type_name}\"/>");
                }
                Some(text) => {
                    ensure_representable(&text, || {
                        format!("row {row_index} column '{column}'")
                    })?;
                    let _ = writeln!(
                        xml,
                        "    <{element} type=\"{type_name}\">{}</{element}>",
                        escape_text(&text)
                    );
                }
            }
        }
        let _ = writeln!(xml, "  </{ROW_ELEMENT}>");
    }
    let _ = writeln!(xml, "</{UNIT_ELEMENT}>");

    Ok(xml)
}

/// Textual form of a value; `None` for null
pub fn value_text(value: &Value) -> Option<Cow<'_, str>> {
    let text = match value {
        Value::Null => return None,
        Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        Value::Integer(i) => Cow::Owned(i.to_string()),
        // Display is the shortest representation that parses back exactly
        Value::Float(f) => Cow::Owned(f.to_string()),
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Bytes(bytes) => Cow::Owned(BASE64.encode(bytes)),
        Value::Timestamp(ts) => Cow::Owned(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    };
    Some(text)
}

/// XML 1.0 `Char` production
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

fn ensure_representable<F>(text: &str, location: F) -> Result<(), SerializationCause>
where
    F: FnOnce() -> String,
{
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(character) => Err(SerializationCause::UnrepresentableCharacter {
            location: location(),
            character,
        }),
        None => Ok(()),
    }
}

/// Escape element content. Carriage returns are written as character
/// references so parsers do not fold them into line feeds.
fn escape_text(text: &str) -> Cow<'_, str> {
    let escaped = quick_xml::escape::escape(text);
    if escaped.contains('\r') {
        Cow::Owned(escaped.replace('\r', "&#13;"))
    } else {
        escaped
    }
}

/// Escape an attribute value, protecting whitespace from attribute-value
/// normalization
fn escape_attribute(text: &str) -> Cow<'_, str> {
    let escaped = quick_xml::escape::escape(text);
    if escaped.contains(['\t', '\n', '\r']) {
        Cow::Owned(
            escaped
                .replace('\t', "&#9;")
                .replace('\n', "&#10;")
                .replace('\r', "&#13;"),
        )
    } else {
        escaped
    }
}
