//! Connection pools and schema-agnostic result collection
//!
//! Every statement runs through the unprepared protocol, so PostgreSQL
//! returns each column in its text form. That lets [`decode`] fall back to a
//! textual [`Value`] for backend types it has no native mapping for.

use crate::config::DatabaseConfig;
use crate::models::{Column, ResultSet};
use anyhow::Result;
use futures::TryStreamExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Column as _, Executor, PgPool, Row as _, SqlitePool, TypeInfo as _};
use std::str::FromStr;

pub mod decode;

use decode::DecodeRow;

/// Which relational backend a [`Database`] talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    /// Parse the backend from a connection URL scheme
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split_once(':').map(|(scheme, _)| scheme)?;
        match scheme {
            "postgres" | "postgresql" => Some(Backend::Postgres),
            "sqlite" => Some(Backend::Sqlite),
            _ => None,
        }
    }

    /// Statement template used to call a procedure when none is configured
    pub fn default_call_template(&self) -> &'static str {
        match self {
            Backend::Postgres => "SELECT * FROM {procedure}()",
            Backend::Sqlite => "SELECT * FROM {procedure}",
        }
    }
}

/// Shared connection pool for the configured backend
#[derive(Clone, Debug)]
pub enum Database {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let max_connections = config.max_connections.unwrap_or(10);

        match Backend::from_url(&config.url) {
            Some(Backend::Postgres) => {
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(&config.url)
                    .await?;
                Ok(Database::Postgres(pool))
            }
            Some(Backend::Sqlite) => {
                // Create database if it doesn't exist (for SQLite)
                let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect_with(options)
                    .await?;
                Ok(Database::Sqlite(pool))
            }
            None => Err(anyhow::anyhow!(
                "Unsupported database URL '{}': expected postgres:// or sqlite:",
                config.url
            )),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Database::Postgres(_) => Backend::Postgres,
            Database::Sqlite(_) => Backend::Sqlite,
        }
    }

    /// Run `sql` and materialize every row it returns
    pub async fn fetch_result_set(&self, sql: &str) -> Result<ResultSet, sqlx::Error> {
        match self {
            Database::Postgres(pool) => collect_result_set(pool, sql).await,
            Database::Sqlite(pool) => collect_result_set(pool, sql).await,
        }
    }

    pub async fn close(&self) {
        match self {
            Database::Postgres(pool) => pool.close().await,
            Database::Sqlite(pool) => pool.close().await,
        }
    }
}

/// Drain a statement into a [`ResultSet`], reading column metadata from the
/// first row. A statement that returns no rows yields an empty result set
/// with no columns.
pub async fn collect_result_set<'e, E>(executor: E, sql: &'e str) -> Result<ResultSet, sqlx::Error>
where
    E: Executor<'e>,
    <E::Database as sqlx::Database>::Row: DecodeRow,
{
    let mut stream = executor.fetch(sql);
    let mut result: Option<ResultSet> = None;

    while let Some(row) = stream.try_next().await? {
        let result = result.get_or_insert_with(|| {
            ResultSet::new(
                row.columns()
                    .iter()
                    .map(|c| Column::new(c.name(), c.type_info().name()))
                    .collect(),
            )
        });

        let values = (0..row.len())
            .map(|index| row.decode_value(index))
            .collect::<Result<Vec<_>, _>>()?;
        result.push_row(values);
    }

    Ok(result.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite")
    }

    #[test]
    fn test_backend_from_url() {
        assert_eq!(Backend::from_url("postgres://u@h/db"), Some(Backend::Postgres));
        assert_eq!(Backend::from_url("postgresql://u@h/db"), Some(Backend::Postgres));
        assert_eq!(Backend::from_url("sqlite::memory:"), Some(Backend::Sqlite));
        assert_eq!(Backend::from_url("sqlite://./data.db"), Some(Backend::Sqlite));
        assert_eq!(Backend::from_url("mysql://h/db"), None);
        assert_eq!(Backend::from_url("nonsense"), None);
    }

    #[tokio::test]
    async fn test_collect_result_set_preserves_column_and_row_order() {
        let pool = memory_pool().await;
        pool.execute(
            "CREATE TABLE t (b TEXT, a INTEGER);
             INSERT INTO t VALUES ('first', 2), ('second', 1);",
        )
        .await
        .unwrap();

        let result = collect_result_set(&pool, "SELECT b, a FROM t ORDER BY rowid")
            .await
            .unwrap();

        let names: Vec<_> = result.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(result.len(), 2);
        assert_eq!(result.rows()[0].get("b"), Some(&Value::String("first".into())));
        assert_eq!(result.rows()[1].get("a"), Some(&Value::Integer(1)));
    }

    #[tokio::test]
    async fn test_collect_result_set_empty() {
        let pool = memory_pool().await;
        pool.execute("CREATE TABLE t (a INTEGER)").await.unwrap();

        let result = collect_result_set(&pool, "SELECT a FROM t").await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_collect_result_set_unknown_table_is_an_error() {
        let pool = memory_pool().await;
        assert!(collect_result_set(&pool, "SELECT * FROM nope").await.is_err());
    }
}
