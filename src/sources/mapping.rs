//! Procedure mapping discovery against the relational backend

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use crate::database::Database;
use crate::errors::DiscoveryError;
use crate::models::{ProcedureMapping, ResultSet, Value};
use crate::sources::traits::MappingSource;

const UNIT_COLUMN: &str = "unit_name";
const PROCEDURE_COLUMN: &str = "procedure_name";

/// Reads mappings with a fixed, parameterless query
#[derive(Clone)]
pub struct SqlMappingSource {
    database: Database,
    query: String,
}

impl SqlMappingSource {
    pub fn new<Q: Into<String>>(database: Database, query: Q) -> Self {
        Self {
            database,
            query: query.into(),
        }
    }
}

#[async_trait]
impl MappingSource for SqlMappingSource {
    async fn fetch_mappings(&self) -> Result<Vec<ProcedureMapping>, DiscoveryError> {
        let result = self
            .database
            .fetch_result_set(&self.query)
            .await
            .map_err(DiscoveryError::Query)?;

        let mappings = parse_mappings(&result)?;
        debug!("Discovered {} procedure mappings", mappings.len());
        Ok(mappings)
    }
}

/// Column names compare case-insensitively with underscores ignored, so
/// `unit_name`, `unitName` and `UNITNAME` all match.
fn normalize_column(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn find_column(result: &ResultSet, wanted: &str) -> Option<usize> {
    let wanted = normalize_column(wanted);
    result
        .columns()
        .iter()
        .position(|c| normalize_column(&c.name) == wanted)
}

fn text_value(value: Option<&Value>, row: usize, column: &'static str) -> Result<String, DiscoveryError> {
    match value {
        None => Err(DiscoveryError::MissingColumn { row, column }),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(DiscoveryError::InvalidValue {
            row,
            column,
            message: "empty".to_string(),
        }),
        Some(other) => Err(DiscoveryError::InvalidValue {
            row,
            column,
            message: format!("expected text, got {}", other.type_name()),
        }),
    }
}

/// Turn the mapping query's rows into mappings, failing on the first
/// malformed or duplicate entry
pub fn parse_mappings(result: &ResultSet) -> Result<Vec<ProcedureMapping>, DiscoveryError> {
    if result.is_empty() {
        return Ok(Vec::new());
    }

    let unit_index = find_column(result, UNIT_COLUMN);
    let procedure_index = find_column(result, PROCEDURE_COLUMN);

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut mappings = Vec::with_capacity(result.len());

    for (row_number, row) in result.rows().iter().enumerate() {
        let unit_name = text_value(
            unit_index.and_then(|i| row.values().get(i)),
            row_number,
            UNIT_COLUMN,
        )?;
        let procedure_name = text_value(
            procedure_index.and_then(|i| row.values().get(i)),
            row_number,
            PROCEDURE_COLUMN,
        )?;

        if let Some(first) = seen.insert(unit_name.clone(), row_number) {
            return Err(DiscoveryError::DuplicateUnit {
                unit_name,
                first,
                second: row_number,
            });
        }

        mappings.push(ProcedureMapping::new(unit_name, procedure_name));
    }

    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mappings_accepts_camel_case_columns() {
        let result = ResultSet::from_rows(
            &["unitName", "procedureName"],
            vec![
                vec!["Growth".into(), "sp_growth".into()],
                vec!["Income".into(), "sp_income".into()],
            ],
        );

        let mappings = parse_mappings(&result).unwrap();
        assert_eq!(
            mappings,
            vec![
                ProcedureMapping::new("Growth", "sp_growth"),
                ProcedureMapping::new("Income", "sp_income"),
            ]
        );
    }

    #[test]
    fn test_parse_mappings_missing_column_fails() {
        let result = ResultSet::from_rows(&["unit_name"], vec![vec!["Growth".into()]]);

        assert!(matches!(
            parse_mappings(&result),
            Err(DiscoveryError::MissingColumn {
                row: 0,
                column: "procedure_name"
            })
        ));
    }

    #[test]
    fn test_parse_mappings_null_value_fails_whole_batch() {
        let result = ResultSet::from_rows(
            &["unit_name", "procedure_name"],
            vec![
                vec!["Growth".into(), "sp_growth".into()],
                vec!["Income".into(), Value::Null],
            ],
        );

        assert!(matches!(
            parse_mappings(&result),
            Err(DiscoveryError::InvalidValue { row: 1, .. })
        ));
    }

    #[test]
    fn test_parse_mappings_rejects_duplicate_units() {
        let result = ResultSet::from_rows(
            &["unit_name", "procedure_name"],
            vec![
                vec!["Growth".into(), "sp_growth".into()],
                vec!["Growth".into(), "sp_growth_v2".into()],
            ],
        );

        assert!(matches!(
            parse_mappings(&result),
            Err(DiscoveryError::DuplicateUnit { first: 0, second: 1, .. })
        ));
    }

    #[test]
    fn test_parse_mappings_empty_result() {
        assert!(parse_mappings(&ResultSet::default()).unwrap().is_empty());
    }
}
