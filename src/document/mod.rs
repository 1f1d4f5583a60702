//! Schema-agnostic document serialization
//!
//! One result set becomes one XML document: the root element carries the
//! unit name, each row is a child element, and each column is a grandchild
//! element named after the column with its value type as an attribute.

pub mod names;
pub mod reader;
pub mod xml;

use crate::errors::SerializationError;
use crate::models::{Document, ResultSet};

pub use reader::{parse_document, ParsedDocument};
pub use xml::XmlDocumentBuilder;

/// Serializes a unit's materialized rows into a document
pub trait DocumentBuilder: Send + Sync {
    /// Must succeed for an empty result set and be deterministic for equal
    /// inputs.
    fn build(&self, unit_name: &str, result: &ResultSet) -> Result<Document, SerializationError>;
}
