//! Transactional execution of decoded completion envelopes.
//!
//! Each phase runs inside one transaction on the volatile store. A failing
//! statement rolls back everything the phase did; a prior phase's commit is
//! never touched.

use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, Sqlite, Transaction, TypeInfo, ValueRef};

mod data;
mod schema;

pub use data::{DataExecution, DataExecutionFailure, DataExecutor};
pub use schema::{SchemaExecution, SchemaExecutionFailure, SchemaExecutor};

use crate::envelope::{is_transaction_control, Phase};
use crate::error::InvariantViolation;

/// Generated SQL may not open, close or nest the phase's transaction.
fn reject_transaction_control(statements: &[String]) -> Result<(), InvariantViolation> {
    match statements.iter().find(|s| is_transaction_control(s)) {
        Some(statement) => Err(InvariantViolation::TransactionControl(statement.clone())),
        None => Ok(()),
    }
}

async fn rollback(tx: Transaction<'_, Sqlite>, phase: Phase) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(phase = phase.as_str(), error = %e, "rollback failed");
    }
}

/// Encode one result row as a JSON object, preserving column order.
pub(crate) fn row_to_json(row: &SqliteRow) -> Result<Value, sqlx::Error> {
    let mut object = Map::with_capacity(row.len());
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_ascii_uppercase();
            match type_name.as_str() {
                "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => {
                    Value::from(row.try_get_unchecked::<i64, _>(idx)?)
                }
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                    let f: f64 = row.try_get_unchecked(idx)?;
                    serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "BLOB" => Value::String(hex::encode(row.try_get_unchecked::<Vec<u8>, _>(idx)?)),
                _ => Value::String(row.try_get_unchecked::<String, _>(idx)?),
            }
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::{Connection, SqliteConnection};

    #[tokio::test]
    async fn rows_encode_by_storage_class() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        let rows = sqlx::raw_sql("SELECT 1 AS n, 2.5 AS r, 'x' AS t, NULL AS z, X'0AFF' AS b")
            .fetch_all(&mut conn)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            row_to_json(&rows[0]).unwrap(),
            json!({"n": 1, "r": 2.5, "t": "x", "z": null, "b": "0aff"})
        );
    }

    #[tokio::test]
    async fn column_order_is_preserved() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        let rows = sqlx::raw_sql("SELECT 'b' AS zeta, 'a' AS alpha")
            .fetch_all(&mut conn)
            .await
            .unwrap();
        let encoded = row_to_json(&rows[0]).unwrap();
        let keys: Vec<&String> = encoded.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }
}
