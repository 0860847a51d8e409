use serde_json::Value;
use sqlx::{Connection, SqliteConnection};
use thiserror::Error;

use super::{reject_transaction_control, rollback, row_to_json};
use crate::envelope::{decode, is_read_query, split_statements, Phase};
use crate::error::{ExecutionError, InvariantViolation};
use crate::introspect;
use crate::types::ExecutionRecord;

/// A committed data phase and the rows of its final query.
#[derive(Debug, Clone)]
pub struct DataExecution {
    pub record: ExecutionRecord,
    pub rows: Vec<Value>,
    pub dml_sql: String,
    pub select_sql: String,
}

/// A data phase that was rejected or rolled back.
///
/// `executed_sql` lists the statements that completed before the failure;
/// it is empty for invariant violations, which are caught before anything
/// runs.
#[derive(Debug, Error)]
#[error("data phase failed: {error}")]
pub struct DataExecutionFailure {
    #[source]
    pub error: ExecutionError,
    pub executed_sql: Vec<String>,
    pub dml_sql: String,
    pub select_sql: String,
}

impl DataExecutionFailure {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self.error, ExecutionError::Invariant(_))
    }
}

pub struct DataExecutor;

impl DataExecutor {
    /// Check that `statements` leave the transaction alone and end in a
    /// read query.
    fn validate(statements: &[String], keyed_select: Option<&str>) -> Result<(), InvariantViolation> {
        let Some(last) = statements.last() else {
            return Err(InvariantViolation::NoSqlGenerated);
        };
        reject_transaction_control(statements)?;
        // A keyed envelope must carry its own select; dml alone never counts.
        if keyed_select.is_some_and(|s| split_statements(s).is_empty()) {
            return Err(InvariantViolation::FinalStatementNotRead);
        }
        if !is_read_query(last) {
            return Err(InvariantViolation::FinalStatementNotRead);
        }
        Ok(())
    }

    /// Decode a data-phase completion, run it as one transaction and return
    /// the final query's rows.
    pub async fn run(
        conn: &mut SqliteConnection,
        completion: &Value,
    ) -> Result<DataExecution, DataExecutionFailure> {
        let envelope = decode(Phase::Data, completion);
        let (dml_sql, select_sql) = envelope.reported_fields();
        let statements = envelope.statements();

        let failure = |error: ExecutionError, executed_sql: Vec<String>| DataExecutionFailure {
            error,
            executed_sql,
            dml_sql: dml_sql.clone(),
            select_sql: select_sql.clone(),
        };

        let keyed_select = envelope.is_keyed().then_some(select_sql.as_str());
        if let Err(violation) = Self::validate(&statements, keyed_select) {
            tracing::warn!(%violation, "data phase rejected before execution");
            return Err(failure(violation.into(), Vec::new()));
        }

        let Some((query, effects)) = statements.split_last() else {
            return Err(failure(InvariantViolation::NoSqlGenerated.into(), Vec::new()));
        };

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| failure(e.into(), Vec::new()))?;

        let mut executed = Vec::with_capacity(statements.len());
        for statement in effects {
            tracing::debug!(sql = %statement, "data phase: executing");
            if let Err(e) = sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(statement)).await {
                tracing::warn!(sql = %statement, error = %e, "data phase: rolling back");
                rollback(tx, Phase::Data).await;
                return Err(failure(
                    ExecutionError::Statement {
                        statement: statement.clone(),
                        message: e.to_string(),
                    },
                    executed,
                ));
            }
            executed.push(statement.clone());
        }

        tracing::debug!(sql = %query, "data phase: fetching");
        let fetched = match sqlx::Executor::fetch_all(&mut *tx, sqlx::raw_sql(query)).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(sql = %query, error = %e, "data phase: rolling back");
                rollback(tx, Phase::Data).await;
                return Err(failure(
                    ExecutionError::Statement {
                        statement: query.clone(),
                        message: e.to_string(),
                    },
                    executed,
                ));
            }
        };

        let rows = match fetched.iter().map(row_to_json).collect::<Result<Vec<_>, _>>() {
            Ok(rows) => rows,
            Err(e) => {
                rollback(tx, Phase::Data).await;
                return Err(failure(e.into(), executed));
            }
        };

        if let Err(e) = tx.commit().await {
            return Err(failure(e.into(), executed));
        }
        executed.push(query.clone());

        let table_stats = match introspect::stats(conn).await {
            Ok(stats) => stats,
            Err(e) => return Err(failure(e.into(), executed)),
        };

        tracing::info!(
            statements = executed.len(),
            rows = rows.len(),
            "data phase committed"
        );

        Ok(DataExecution {
            record: ExecutionRecord {
                executed_sql: executed,
                table_stats,
            },
            rows,
            dml_sql,
            select_sql,
        })
    }
}
