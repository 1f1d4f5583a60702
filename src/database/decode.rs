//! Per-backend mapping of column values onto [`Value`]

use crate::models::Value;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column as _, Row, TypeInfo as _, ValueRef as _};

/// Rows whose columns can be decoded without a compile-time schema
pub trait DecodeRow: Row {
    fn decode_value(&self, index: usize) -> Result<Value, sqlx::Error>;
}

impl DecodeRow for PgRow {
    fn decode_value(&self, index: usize) -> Result<Value, sqlx::Error> {
        if self.try_get_raw(index)?.is_null() {
            return Ok(Value::Null);
        }

        let value = match self.try_column(index)?.type_info().name() {
            "BOOL" => Value::Bool(self.try_get(index)?),
            "INT2" => Value::Integer(self.try_get::<i16, _>(index)?.into()),
            "INT4" => Value::Integer(self.try_get::<i32, _>(index)?.into()),
            "INT8" => Value::Integer(self.try_get(index)?),
            "FLOAT4" => Value::Float(self.try_get::<f32, _>(index)?.into()),
            "FLOAT8" => Value::Float(self.try_get(index)?),
            "BYTEA" => Value::Bytes(self.try_get(index)?),
            "TIMESTAMPTZ" => Value::Timestamp(self.try_get(index)?),
            "TIMESTAMP" => Value::Timestamp(self.try_get::<NaiveDateTime, _>(index)?.and_utc()),
            // TEXT, VARCHAR, NUMERIC, UUID, DATE, JSON, ...: the unprepared
            // protocol hands these over as text
            _ => Value::String(self.try_get_unchecked(index)?),
        };

        Ok(value)
    }
}

impl DecodeRow for SqliteRow {
    fn decode_value(&self, index: usize) -> Result<Value, sqlx::Error> {
        let raw = self.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let storage = raw.type_info().name().to_string();
        let declared = self.try_column(index)?.type_info().name();

        let value = match (declared, storage.as_str()) {
            ("BOOLEAN", "INTEGER") => Value::Bool(self.try_get_unchecked::<i64, _>(index)? != 0),
            ("DATETIME", "TEXT") => {
                let text: String = self.try_get_unchecked(index)?;
                match parse_text_timestamp(&text) {
                    Some(ts) => Value::Timestamp(ts),
                    None => Value::String(text),
                }
            }
            (_, "INTEGER") => Value::Integer(self.try_get_unchecked(index)?),
            (_, "REAL") => Value::Float(self.try_get_unchecked(index)?),
            (_, "BLOB") => Value::Bytes(self.try_get_unchecked(index)?),
            _ => Value::String(self.try_get_unchecked(index)?),
        };

        Ok(value)
    }
}

/// Timestamps stored as text: RFC 3339 or SQLite's `YYYY-MM-DD HH:MM:SS[.fff]`
pub fn parse_text_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::collect_result_set;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Executor;

    #[test]
    fn test_parse_text_timestamp() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_text_timestamp("2024-03-01 12:30:00"), Some(expected));
        assert_eq!(parse_text_timestamp("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_text_timestamp("2024-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_text_timestamp("yesterday"), None);
    }

    #[tokio::test]
    async fn test_sqlite_values_follow_declared_and_storage_types() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        pool.execute(
            "CREATE TABLE holdings (
                 active BOOLEAN, as_of DATETIME, units INTEGER,
                 price REAL, name TEXT, payload BLOB, note TEXT
             );
             INSERT INTO holdings VALUES
                 (1, '2024-03-01 12:30:00', 42, 10.5, 'ACME', X'DEADBEEF', NULL);",
        )
        .await
        .unwrap();

        let result = collect_result_set(&pool, "SELECT * FROM holdings").await.unwrap();
        let row = &result.rows()[0];

        assert_eq!(row.get("active"), Some(&Value::Bool(true)));
        assert_eq!(
            row.get("as_of"),
            Some(&Value::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()))
        );
        assert_eq!(row.get("units"), Some(&Value::Integer(42)));
        assert_eq!(row.get("price"), Some(&Value::Float(10.5)));
        assert_eq!(row.get("name"), Some(&Value::String("ACME".to_string())));
        assert_eq!(row.get("payload"), Some(&Value::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF])));
        assert_eq!(row.get("note"), Some(&Value::Null));
    }
}
