//! Named procedure invocation against the relational backend

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::debug;

use crate::database::Database;
use crate::errors::{InvocationCause, InvocationError};
use crate::models::ResultSet;
use crate::sources::traits::ProcedureInvoker;

/// Placeholder replaced by the procedure name in a call template
pub const PROCEDURE_PLACEHOLDER: &str = "{procedure}";

/// Procedure names come from a database table and are spliced into SQL, so
/// only plain (optionally schema-qualified) identifiers are accepted.
pub fn is_valid_procedure_name(name: &str) -> bool {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER
        .get_or_init(|| {
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$")
                .expect("procedure identifier pattern is valid")
        })
        .is_match(name)
}

/// Calls procedures through a per-backend statement template
#[derive(Clone)]
pub struct SqlProcedureInvoker {
    database: Database,
    call_template: String,
}

impl SqlProcedureInvoker {
    /// `call_template` defaults to the backend's call shape when `None`
    pub fn new(database: Database, call_template: Option<String>) -> Self {
        let call_template = call_template
            .unwrap_or_else(|| database.backend().default_call_template().to_string());
        Self {
            database,
            call_template,
        }
    }

    pub fn call_template(&self) -> &str {
        &self.call_template
    }

    /// Render the statement for `procedure_name`
    pub fn render_call(&self, procedure_name: &str) -> Result<String, InvocationCause> {
        if !is_valid_procedure_name(procedure_name) {
            return Err(InvocationCause::InvalidProcedureName(
                procedure_name.to_string(),
            ));
        }
        Ok(self
            .call_template
            .replace(PROCEDURE_PLACEHOLDER, procedure_name))
    }
}

fn classify(err: sqlx::Error) -> InvocationCause {
    match err {
        sqlx::Error::ColumnDecode { index, source } => InvocationCause::Decode {
            column: index,
            message: source.to_string(),
        },
        other => InvocationCause::Database(other),
    }
}

#[async_trait]
impl ProcedureInvoker for SqlProcedureInvoker {
    async fn invoke(&self, procedure_name: &str) -> Result<ResultSet, InvocationError> {
        let sql = self
            .render_call(procedure_name)
            .map_err(|cause| InvocationError::new(procedure_name, cause))?;

        let started = Instant::now();
        let result = self
            .database
            .fetch_result_set(&sql)
            .await
            .map_err(|e| InvocationError::new(procedure_name, classify(e)))?;

        debug!(
            "Procedure '{}' returned {} rows x {} columns in {:?}",
            procedure_name,
            result.len(),
            result.columns().len(),
            started.elapsed()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Executor;

    async fn sqlite_database() -> Database {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        pool.execute("CREATE VIEW sp_growth AS SELECT 1 AS id, 10.5 AS val")
            .await
            .unwrap();
        Database::Sqlite(pool)
    }

    #[test]
    fn test_procedure_name_validation() {
        assert!(is_valid_procedure_name("sp_growth"));
        assert!(is_valid_procedure_name("reporting.sp_income"));
        assert!(is_valid_procedure_name("_internal$1"));

        assert!(!is_valid_procedure_name(""));
        assert!(!is_valid_procedure_name("1abc"));
        assert!(!is_valid_procedure_name("sp_growth; DROP TABLE procedure_mappings"));
        assert!(!is_valid_procedure_name("sp_growth()"));
        assert!(!is_valid_procedure_name("a.b.c"));
        assert!(!is_valid_procedure_name("sp growth"));
    }

    #[tokio::test]
    async fn test_render_call_uses_backend_default() {
        let invoker = SqlProcedureInvoker::new(sqlite_database().await, None);
        assert_eq!(invoker.render_call("sp_growth").unwrap(), "SELECT * FROM sp_growth");

        let custom = SqlProcedureInvoker::new(
            sqlite_database().await,
            Some("SELECT * FROM {procedure} LIMIT 10".to_string()),
        );
        assert_eq!(
            custom.render_call("sp_growth").unwrap(),
            "SELECT * FROM sp_growth LIMIT 10"
        );
    }

    #[tokio::test]
    async fn test_invoke_reads_schema_from_result() {
        let invoker = SqlProcedureInvoker::new(sqlite_database().await, None);

        let result = invoker.invoke("sp_growth").await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.columns()[0].name, "id");
        assert_eq!(result.columns()[1].name, "val");
        assert_eq!(result.rows()[0].get("id"), Some(&Value::Integer(1)));
        assert_eq!(result.rows()[0].get("val"), Some(&Value::Float(10.5)));
    }

    #[tokio::test]
    async fn test_invoke_rejects_injection_without_touching_backend() {
        let invoker = SqlProcedureInvoker::new(sqlite_database().await, None);

        let err = invoker
            .invoke("sp_growth; DROP VIEW sp_growth")
            .await
            .unwrap_err();
        assert_eq!(err.procedure_name, "sp_growth; DROP VIEW sp_growth");
        assert!(matches!(err.cause, InvocationCause::InvalidProcedureName(_)));

        assert!(invoker.invoke("sp_growth").await.is_ok());
    }

    #[tokio::test]
    async fn test_invoke_unknown_procedure_is_a_database_error() {
        let invoker = SqlProcedureInvoker::new(sqlite_database().await, None);

        let err = invoker.invoke("sp_missing").await.unwrap_err();
        assert!(matches!(err.cause, InvocationCause::Database(_)));
    }
}
