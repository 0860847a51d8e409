//! The two-phase simulation pipeline.
//!
//! ```text
//! ReadyForSchema ─▶ SchemaGenerated ─▶ SchemaExecuted ─▶ DataGenerated ─▶ Complete
//!        └──────────────┴──────────────────┴─────────────────┴──▶ Failed(kind)
//! ```
//!
//! The store lock is held from reading the context to the final stats, so
//! simulations never interleave and a reset waits for the run in flight.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{ExecutionError, FailureKind, GatewayError, ValidationError};
use crate::executor::{DataExecutor, SchemaExecutor};
use crate::gateway::CompletionGateway;
use crate::introspect;
use crate::prompt::{build_data_prompt, build_schema_prompt, PromptInputs};
use crate::state::StateStore;
use crate::types::{normalize_endpoint, ContextState, HttpMethod, SchemaSnapshot, TableStats};

/// Furthest point a simulation reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ReadyForSchema,
    SchemaGenerated,
    SchemaExecuted,
    DataGenerated,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadyForSchema => "ready_for_schema",
            Self::SchemaGenerated => "schema_generated",
            Self::SchemaExecuted => "schema_executed",
            Self::DataGenerated => "data_generated",
            Self::Complete => "complete",
        }
    }
}

/// One simulated call. Missing method/endpoint fall back to the stored
/// context.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationRequest {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub prompt_schema: String,
    pub prompt_data: String,
    pub result: Vec<Value>,
    pub executed_sql: Vec<String>,
    pub create_sql: String,
    pub alter_sql: String,
    pub dml_sql: String,
    pub select_sql: String,
    /// Textual rendering of `snapshot`.
    pub schema: String,
    #[serde(skip)]
    pub snapshot: SchemaSnapshot,
    pub table_stats: TableStats,
    #[serde(rename = "usingOpenAI")]
    pub using_live_gateway: bool,
}

/// Whatever a failed run had produced before it stopped.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alter_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dml_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select_sql: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub executed_sql: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_stats: Option<TableStats>,
}

#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}: {error}")]
#[serde(rename_all = "camelCase")]
pub struct SimulationFailure {
    pub kind: FailureKind,
    pub stage: Stage,
    pub message: String,
    pub error: String,
    #[serde(flatten)]
    pub partial: PartialOutcome,
}

impl SimulationFailure {
    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }
}

/// Tracks the current stage and the partial outcome of one run.
struct Run {
    stage: Stage,
    partial: PartialOutcome,
}

impl Run {
    fn new() -> Self {
        Self {
            stage: Stage::ReadyForSchema,
            partial: PartialOutcome::default(),
        }
    }

    fn advance(&mut self, next: Stage) {
        tracing::debug!(from = self.stage.as_str(), to = next.as_str(), "stage");
        self.stage = next;
    }

    fn record_observation(&mut self, snapshot: &SchemaSnapshot, stats: &TableStats) {
        self.partial.schema = Some(snapshot.to_string());
        self.partial.table_stats = Some(stats.clone());
    }

    fn fail(self, kind: FailureKind, message: &str, error: impl ToString) -> SimulationFailure {
        let failure = SimulationFailure {
            kind,
            stage: self.stage,
            message: message.to_string(),
            error: error.to_string(),
            partial: self.partial,
        };
        tracing::warn!(
            kind = failure.kind.as_str(),
            stage = failure.stage.as_str(),
            error = %failure.error,
            "simulation failed"
        );
        failure
    }

    fn gateway_failed(self, error: GatewayError) -> SimulationFailure {
        if error.is_unavailable() {
            self.fail(
                FailureKind::GatewayUnavailable,
                "Completion gateway unavailable",
                error,
            )
        } else {
            self.fail(
                FailureKind::GatewayOrGeneration,
                "Failed to generate SQL",
                error,
            )
        }
    }
}

fn execution_kind(error: &ExecutionError, otherwise: FailureKind) -> FailureKind {
    match error {
        ExecutionError::Invariant(_) => FailureKind::InvariantViolation,
        ExecutionError::Store(_) => FailureKind::Store,
        ExecutionError::Statement { .. } => otherwise,
    }
}

pub struct SimulationOrchestrator {
    state: Arc<StateStore>,
    gateway: Arc<dyn CompletionGateway>,
}

impl SimulationOrchestrator {
    pub fn new(state: Arc<StateStore>, gateway: Arc<dyn CompletionGateway>) -> Self {
        Self { state, gateway }
    }

    /// Run both phases for one simulated request.
    pub async fn simulate(
        &self,
        request: SimulationRequest,
    ) -> Result<SimulationReport, SimulationFailure> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("simulation", %run_id);
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: SimulationRequest) -> Result<SimulationReport, SimulationFailure> {
        let mut run = Run::new();

        // Context is read under the store lock so it always matches the store
        // this run works on, even if a reset or scenario was queued first.
        let mut store = self.state.lock_store().await;
        let context = self.state.get_prompt().await;

        let (method, endpoint) = match resolve_target(&context, &request) {
            Ok(target) => target,
            Err(e) => return Err(run.fail(FailureKind::Validation, "Invalid request", e)),
        };
        tracing::info!(%method, %endpoint, provider = self.gateway.provider_name(), "simulation started");

        if !self.gateway.is_available() {
            return Err(run.fail(
                FailureKind::GatewayUnavailable,
                "Completion gateway unavailable",
                "no completion credential is configured; set OPENAI_API_KEY",
            ));
        }

        let payload = request.payload.as_ref();

        // ── Schema phase ──
        let (snapshot, stats) = match introspect::observe(&mut store).await {
            Ok(observed) => observed,
            Err(e) => return Err(run.fail(FailureKind::Store, "Failed to read schema", e)),
        };
        let prompt_schema = build_schema_prompt(PromptInputs {
            payload,
            method,
            endpoint: &endpoint,
            context: &context,
            snapshot: &snapshot,
            stats: &stats,
        });
        tracing::debug!(prompt = %prompt_schema, "schema prompt");
        run.partial.prompt_schema = Some(prompt_schema.clone());

        let completion = match self.gateway.complete(&prompt_schema).await {
            Ok(value) => value,
            Err(e) => return Err(run.gateway_failed(e)),
        };
        run.advance(Stage::SchemaGenerated);

        let schema = match SchemaExecutor::run(&mut store, &completion).await {
            Ok(done) => done,
            Err(failure) => {
                run.partial.create_sql = Some(failure.create_sql);
                run.partial.alter_sql = Some(failure.alter_sql);
                run.partial.executed_sql = failure.attempted_sql;
                run.record_observation(&snapshot, &stats);
                let kind = execution_kind(&failure.error, FailureKind::SchemaExecution);
                return Err(run.fail(kind, "Schema execution failed", failure.error));
            }
        };
        run.partial.create_sql = Some(schema.create_sql.clone());
        run.partial.alter_sql = Some(schema.alter_sql.clone());
        run.partial.executed_sql = schema.record.executed_sql.clone();
        run.advance(Stage::SchemaExecuted);

        // ── Data phase ──
        let (snapshot, stats) = match introspect::observe(&mut store).await {
            Ok(observed) => observed,
            Err(e) => return Err(run.fail(FailureKind::Store, "Failed to read schema", e)),
        };
        run.record_observation(&snapshot, &stats);
        let prompt_data = build_data_prompt(PromptInputs {
            payload,
            method,
            endpoint: &endpoint,
            context: &context,
            snapshot: &snapshot,
            stats: &stats,
        });
        tracing::debug!(prompt = %prompt_data, "data prompt");
        run.partial.prompt_data = Some(prompt_data.clone());

        let completion = match self.gateway.complete(&prompt_data).await {
            Ok(value) => value,
            Err(e) => return Err(run.gateway_failed(e)),
        };
        run.advance(Stage::DataGenerated);

        let data = match DataExecutor::run(&mut store, &completion).await {
            Ok(done) => done,
            Err(failure) => {
                run.partial.dml_sql = Some(failure.dml_sql);
                run.partial.select_sql = Some(failure.select_sql);
                run.partial.executed_sql.extend(failure.executed_sql);
                let kind = execution_kind(&failure.error, FailureKind::DataExecution);
                let message = if kind == FailureKind::InvariantViolation {
                    "Generated SQL rejected"
                } else {
                    "Data execution failed"
                };
                return Err(run.fail(kind, message, failure.error));
            }
        };

        let final_snapshot = match introspect::snapshot(&mut store).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(run.fail(FailureKind::Store, "Failed to read schema", e)),
        };
        drop(store);
        run.advance(Stage::Complete);

        let mut executed_sql = schema.record.executed_sql;
        executed_sql.extend(data.record.executed_sql);
        tracing::info!(
            statements = executed_sql.len(),
            rows = data.rows.len(),
            "simulation complete"
        );

        Ok(SimulationReport {
            prompt_schema,
            prompt_data,
            result: data.rows,
            executed_sql,
            create_sql: schema.create_sql,
            alter_sql: schema.alter_sql,
            dml_sql: data.dml_sql,
            select_sql: data.select_sql,
            schema: final_snapshot.to_string(),
            snapshot: final_snapshot,
            table_stats: data.record.table_stats,
            using_live_gateway: self.gateway.is_live(),
        })
    }
}

fn resolve_target(
    context: &ContextState,
    request: &SimulationRequest,
) -> Result<(HttpMethod, String), ValidationError> {
    let method = match request.method.as_deref() {
        Some(m) if !m.trim().is_empty() => m.parse()?,
        _ => context.method,
    };
    let endpoint = match request.endpoint.as_deref() {
        Some(e) if !e.trim().is_empty() => normalize_endpoint(e)?,
        _ => context.endpoint.clone(),
    };
    Ok((method, endpoint))
}
