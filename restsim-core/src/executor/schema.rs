use serde_json::Value;
use sqlx::{Connection, SqliteConnection};
use thiserror::Error;

use super::{reject_transaction_control, rollback};
use crate::envelope::{decode, Phase};
use crate::error::ExecutionError;
use crate::introspect;
use crate::types::ExecutionRecord;

/// A committed schema phase.
#[derive(Debug, Clone)]
pub struct SchemaExecution {
    pub record: ExecutionRecord,
    pub create_sql: String,
    pub alter_sql: String,
}

/// A schema phase that was rolled back.
///
/// `attempted_sql` lists every statement up to and including the one that
/// failed; none of their effects remain in the store. It is empty when the
/// phase was rejected before running.
#[derive(Debug, Error)]
#[error("schema phase failed: {error}")]
pub struct SchemaExecutionFailure {
    #[source]
    pub error: ExecutionError,
    pub attempted_sql: Vec<String>,
    pub create_sql: String,
    pub alter_sql: String,
}

pub struct SchemaExecutor;

impl SchemaExecutor {
    /// Decode a schema-phase completion and apply it as one transaction.
    pub async fn run(
        conn: &mut SqliteConnection,
        completion: &Value,
    ) -> Result<SchemaExecution, SchemaExecutionFailure> {
        let envelope = decode(Phase::Schema, completion);
        let (create_sql, alter_sql) = envelope.reported_fields();
        let statements = envelope.statements();

        let failure = |error: ExecutionError, attempted_sql: Vec<String>| SchemaExecutionFailure {
            error,
            attempted_sql,
            create_sql: create_sql.clone(),
            alter_sql: alter_sql.clone(),
        };

        if let Err(violation) = reject_transaction_control(&statements) {
            tracing::warn!(error = %violation, "schema phase: rejected");
            return Err(failure(violation.into(), Vec::new()));
        }

        let mut attempted = Vec::with_capacity(statements.len());
        if !statements.is_empty() {
            let mut tx = conn
                .begin()
                .await
                .map_err(|e| failure(e.into(), Vec::new()))?;

            for statement in &statements {
                attempted.push(statement.clone());
                tracing::debug!(sql = %statement, "schema phase: executing");
                if let Err(e) = sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(statement)).await {
                    tracing::warn!(sql = %statement, error = %e, "schema phase: rolling back");
                    rollback(tx, Phase::Schema).await;
                    return Err(failure(
                        ExecutionError::Statement {
                            statement: statement.clone(),
                            message: e.to_string(),
                        },
                        attempted,
                    ));
                }
            }

            if let Err(e) = tx.commit().await {
                return Err(failure(e.into(), attempted));
            }
        }

        let table_stats = match introspect::stats(conn).await {
            Ok(stats) => stats,
            Err(e) => return Err(failure(e.into(), attempted)),
        };

        tracing::info!(
            statements = attempted.len(),
            tables = table_stats.0.len(),
            "schema phase committed"
        );

        Ok(SchemaExecution {
            record: ExecutionRecord {
                executed_sql: attempted,
                table_stats,
            },
            create_sql,
            alter_sql,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvariantViolation;
    use serde_json::json;

    async fn memory_store() -> SqliteConnection {
        SqliteConnection::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn creates_customers_table() {
        let mut conn = memory_store().await;
        let completion = json!({
            "create": "CREATE TABLE customers(id INTEGER PRIMARY KEY, name TEXT)",
            "alter": ""
        });

        let done = SchemaExecutor::run(&mut conn, &completion).await.unwrap();
        assert_eq!(
            done.record.executed_sql,
            vec!["CREATE TABLE customers(id INTEGER PRIMARY KEY, name TEXT)"]
        );
        assert_eq!(done.record.table_stats.as_pairs(), vec![("customers", 0)]);
        assert_eq!(done.alter_sql, "");
    }

    #[tokio::test]
    async fn empty_envelope_is_a_no_op() {
        let mut conn = memory_store().await;
        sqlx::raw_sql("CREATE TABLE t(id INTEGER); INSERT INTO t VALUES (1);")
            .execute(&mut conn)
            .await
            .unwrap();
        let before = introspect::stats(&mut conn).await.unwrap();

        let done = SchemaExecutor::run(&mut conn, &json!({"create": "", "alter": ""}))
            .await
            .unwrap();
        assert!(done.record.executed_sql.is_empty());
        assert_eq!(done.record.table_stats, before);
    }

    #[tokio::test]
    async fn failing_alter_rolls_back_create() {
        let mut conn = memory_store().await;
        let completion = json!({
            "create": "CREATE TABLE orders(id INTEGER PRIMARY KEY)",
            "alter": "ALTER TABLE missing ADD COLUMN total REAL"
        });

        let failure = SchemaExecutor::run(&mut conn, &completion)
            .await
            .unwrap_err();
        assert_eq!(
            failure.attempted_sql,
            vec![
                "CREATE TABLE orders(id INTEGER PRIMARY KEY)",
                "ALTER TABLE missing ADD COLUMN total REAL"
            ]
        );
        assert!(matches!(failure.error, ExecutionError::Statement { .. }));
        assert_eq!(failure.create_sql, "CREATE TABLE orders(id INTEGER PRIMARY KEY)");

        let snapshot = introspect::snapshot(&mut conn).await.unwrap();
        assert!(snapshot.is_empty(), "create must not survive: {snapshot}");
    }

    #[tokio::test]
    async fn commit_before_failing_alter_leaves_store_empty() {
        let mut conn = memory_store().await;
        let completion = json!({
            "create": "CREATE TABLE a(id INTEGER); COMMIT",
            "alter": "ALTER TABLE missing ADD COLUMN x TEXT"
        });

        let failure = SchemaExecutor::run(&mut conn, &completion)
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            ExecutionError::Invariant(InvariantViolation::TransactionControl(_))
        ));
        assert!(failure.attempted_sql.is_empty());
        assert_eq!(failure.create_sql, "CREATE TABLE a(id INTEGER); COMMIT");

        let snapshot = introspect::snapshot(&mut conn).await.unwrap();
        assert!(snapshot.is_empty(), "nothing may be committed: {snapshot}");
    }

    #[tokio::test]
    async fn savepoint_is_rejected() {
        let mut conn = memory_store().await;
        let completion = json!(["SAVEPOINT s1", "CREATE TABLE a(id INTEGER)", "RELEASE s1"]);
        let failure = SchemaExecutor::run(&mut conn, &completion)
            .await
            .unwrap_err();
        assert_eq!(
            failure.error.to_string(),
            "transaction control statements are not allowed: SAVEPOINT s1"
        );
        assert!(introspect::snapshot(&mut conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn trigger_body_runs_as_one_statement() {
        let mut conn = memory_store().await;
        let completion = json!({
            "create": "CREATE TABLE a(id INTEGER); CREATE TABLE log(id INTEGER); \
                       CREATE TRIGGER a_log AFTER INSERT ON a BEGIN INSERT INTO log VALUES (NEW.id); END;",
            "alter": ""
        });

        let done = SchemaExecutor::run(&mut conn, &completion).await.unwrap();
        assert_eq!(done.record.executed_sql.len(), 3);

        sqlx::raw_sql("INSERT INTO a VALUES (5)")
            .execute(&mut conn)
            .await
            .unwrap();
        let stats = introspect::stats(&mut conn).await.unwrap();
        assert_eq!(stats.row_count("log"), Some(1));
    }

    #[tokio::test]
    async fn fallback_array_runs_in_order() {
        let mut conn = memory_store().await;
        let completion = json!([
            "CREATE TABLE a(id INTEGER)",
            "CREATE TABLE b(id INTEGER)"
        ]);
        let done = SchemaExecutor::run(&mut conn, &completion).await.unwrap();
        assert_eq!(done.record.executed_sql.len(), 2);
        assert_eq!(done.record.table_stats.as_pairs(), vec![("a", 0), ("b", 0)]);
    }

    #[tokio::test]
    async fn unrecognized_completion_runs_nothing() {
        let mut conn = memory_store().await;
        let done = SchemaExecutor::run(&mut conn, &Value::Null).await.unwrap();
        assert!(done.record.executed_sql.is_empty());
        assert!(done.record.table_stats.is_empty());
    }
}
