//! Reads generated documents back into typed rows

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::names::decode_name;
use super::xml::{ROW_ELEMENT, UNIT_ELEMENT};
use crate::errors::DocumentParseError;
use crate::models::Value;

/// Column name/value pairs of one `<row>`
pub type ParsedRow = Vec<(String, Value)>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub unit_name: String,
    pub rows: Vec<ParsedRow>,
}

impl ParsedDocument {
    /// Column names of the first row, in document order
    pub fn column_names(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.iter().map(|(name, _)| name.as_str()).collect())
            .unwrap_or_default()
    }
}

struct OpenColumn {
    name: String,
    type_name: String,
    text: String,
}

fn element_name(e: &BytesStart<'_>) -> Result<String, DocumentParseError> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|err| DocumentParseError::structure(format!("element name is not UTF-8: {err}")))
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, DocumentParseError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Convert a column's text back into the value its `type` attribute names
pub fn parse_value(column: &str, type_name: &str, text: String) -> Result<Value, DocumentParseError> {
    let invalid = |text: &str| DocumentParseError::InvalidValue {
        column: column.to_string(),
        type_name: type_name.to_string(),
        text: text.to_string(),
    };

    let value = match type_name {
        "null" => Value::Null,
        "boolean" => match text.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => return Err(invalid(other)),
        },
        "integer" => Value::Integer(text.parse().map_err(|_| invalid(&text))?),
        "float" => Value::Float(text.parse().map_err(|_| invalid(&text))?),
        "string" => Value::String(text),
        "bytes" => Value::Bytes(BASE64.decode(text.as_bytes()).map_err(|_| invalid(&text))?),
        "timestamp" => Value::Timestamp(
            DateTime::parse_from_rfc3339(&text)
                .map_err(|_| invalid(&text))?
                .with_timezone(&Utc),
        ),
        other => {
            return Err(DocumentParseError::structure(format!(
                "column '{column}' has unknown type '{other}'"
            )))
        }
    };
    Ok(value)
}

fn open_column(e: &BytesStart<'_>) -> Result<OpenColumn, DocumentParseError> {
    let name = decode_name(&element_name(e)?);
    let type_name = attribute(e, "type")?.ok_or_else(|| {
        DocumentParseError::structure(format!("column '{name}' has no type attribute"))
    })?;
    Ok(OpenColumn {
        name,
        type_name,
        text: String::new(),
    })
}

fn close_column(column: OpenColumn) -> Result<(String, Value), DocumentParseError> {
    let value = parse_value(&column.name, &column.type_name, column.text)?;
    Ok((column.name, value))
}

/// Parse a document produced by [`super::XmlDocumentBuilder`]
pub fn parse_document(content: &str) -> Result<ParsedDocument, DocumentParseError> {
    let mut reader = Reader::from_str(content);

    let mut unit_name: Option<String> = None;
    let mut unit_closed = false;
    let mut rows: Vec<ParsedRow> = Vec::new();
    let mut row: Option<ParsedRow> = None;
    let mut column: Option<OpenColumn> = None;

    loop {
        let (element, empty) = match reader.read_event()? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(_) => {
                if let Some(open) = column.take() {
                    let pair = close_column(open)?;
                    row.as_mut()
                        .ok_or_else(|| DocumentParseError::structure("column outside of a row"))?
                        .push(pair);
                } else if let Some(finished) = row.take() {
                    rows.push(finished);
                } else {
                    unit_closed = true;
                }
                continue;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                match column.as_mut() {
                    Some(open) => open.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(DocumentParseError::structure(format!(
                            "unexpected text '{}' outside a column",
                            text.trim()
                        )))
                    }
                }
                continue;
            }
            Event::CData(data) => {
                let open = column
                    .as_mut()
                    .ok_or_else(|| DocumentParseError::structure("CDATA outside a column"))?;
                let text = std::str::from_utf8(&data)
                    .map_err(|err| DocumentParseError::structure(format!("CDATA is not UTF-8: {err}")))?;
                open.text.push_str(text);
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        if unit_closed {
            return Err(DocumentParseError::structure("content after the unit element"));
        }

        if unit_name.is_none() {
            let name = element_name(&element)?;
            if name != UNIT_ELEMENT {
                return Err(DocumentParseError::structure(format!(
                    "root element is <{name}>, expected <{UNIT_ELEMENT}>"
                )));
            }
            unit_name = Some(attribute(&element, "name")?.ok_or_else(|| {
                DocumentParseError::structure("unit element has no name attribute")
            })?);
            unit_closed = empty;
        } else if row.is_none() {
            let name = element_name(&element)?;
            if name != ROW_ELEMENT {
                return Err(DocumentParseError::structure(format!(
                    "unexpected <{name}> inside unit"
                )));
            }
            if empty {
                rows.push(Vec::new());
            } else {
                row = Some(Vec::new());
            }
        } else if column.is_none() {
            let open = open_column(&element)?;
            if empty {
                let pair = close_column(open)?;
                if let Some(current) = row.as_mut() {
                    current.push(pair);
                }
            } else {
                column = Some(open);
            }
        } else {
            return Err(DocumentParseError::structure("element nested inside a column"));
        }
    }

    match unit_name {
        Some(unit_name) if unit_closed => Ok(ParsedDocument { unit_name, rows }),
        Some(_) => Err(DocumentParseError::structure("unit element is not closed")),
        None => Err(DocumentParseError::structure("document has no unit element")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentBuilder, XmlDocumentBuilder};
    use crate::models::ResultSet;
    use chrono::TimeZone;

    fn round_trip(unit: &str, result: &ResultSet) -> ParsedDocument {
        let document = XmlDocumentBuilder::new().build(unit, result).unwrap();
        parse_document(&document.content).unwrap()
    }

    #[test]
    fn test_round_trip_recovers_names_and_values() {
        let ts = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let columns = ["id", "market value", "active", "note", "raw", "as_of", "ratio"];
        let rows = vec![
            vec![
                Value::Integer(1),
                Value::Float(10.5),
                Value::Bool(true),
                Value::String("  padded <tag> & \"quotes\"\r\n".to_string()),
                Value::Bytes(vec![0, 255, 16]),
                Value::Timestamp(ts),
                Value::Float(1e-7),
            ],
            vec![
                Value::Integer(i64::MIN),
                Value::Float(-0.0),
                Value::Bool(false),
                Value::Null,
                Value::Bytes(Vec::new()),
                Value::Null,
                Value::Float(f64::INFINITY),
            ],
        ];
        let result = ResultSet::from_rows(&columns, rows.clone());

        let parsed = round_trip("Growth & Income", &result);
        assert_eq!(parsed.unit_name, "Growth & Income");
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.column_names(), columns.to_vec());

        for (parsed_row, original) in parsed.rows.iter().zip(&rows) {
            let values: Vec<_> = parsed_row.iter().map(|(_, v)| v.clone()).collect();
            assert_eq!(&values, original);
        }
    }

    #[test]
    fn test_round_trip_nan() {
        let result = ResultSet::from_rows(&["x"], vec![vec![Value::Float(f64::NAN)]]);
        let parsed = round_trip("Growth", &result);
        assert!(matches!(parsed.rows[0][0].1, Value::Float(f) if f.is_nan()));
    }

    #[test]
    fn test_empty_document_parses_to_no_rows() {
        let parsed = round_trip("Income", &ResultSet::default());
        assert_eq!(parsed.unit_name, "Income");
        assert!(parsed.rows.is_empty());
    }

    #[test]
    fn test_rejects_foreign_documents() {
        assert!(parse_document("<tv><channel/></tv>").is_err());
        assert!(parse_document("").is_err());
        assert!(parse_document(r#"<unit name="x"><row><a>1</a></row></unit>"#).is_err());
        assert!(parse_document(r#"<unit name="x"><row><a type="integer">one</a></row></unit>"#).is_err());
    }
}
