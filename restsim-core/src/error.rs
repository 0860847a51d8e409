//! Error taxonomy for the simulation pipeline.
//!
//! Every failure the pipeline can produce is a value: nothing here is
//! process-fatal. `FailureKind` is the coarse classification reported to
//! HTTP callers; the enums below carry the detail.

use serde::Serialize;
use thiserror::Error;

/// Rejected prompt/method/endpoint input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("method must be one of GET, POST, PUT, PATCH, DELETE (got '{0}')")]
    UnsupportedMethod(String),

    #[error("endpoint must not be empty")]
    EmptyEndpoint,
}

/// Failures raised by a [`CompletionGateway`](crate::gateway::CompletionGateway).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("completion gateway unavailable: {0}")]
    Unavailable(String),

    #[error("completion request failed: {0}")]
    Transport(String),

    #[error("completion API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("completion response malformed: {0}")]
    Malformed(String),

    #[error("scripted gateway has no completions left")]
    Exhausted,
}

impl GatewayError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Shape checks on a decoded envelope, detected before any statement runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("no SQL generated")]
    NoSqlGenerated,

    #[error("final statement must be a read query")]
    FinalStatementNotRead,

    #[error("transaction control statements are not allowed: {0}")]
    TransactionControl(String),
}

/// A phase that could not be applied to the store.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("statement failed: {message}")]
    Statement { statement: String, message: String },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Errors from the non-pipeline operations (prompt edits, reset, scenarios).
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl SimulationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::Gateway(e) if e.is_unavailable() => FailureKind::GatewayUnavailable,
            Self::Gateway(_) | Self::Generation(_) => FailureKind::GatewayOrGeneration,
            Self::Store(_) => FailureKind::Store,
        }
    }
}

/// Coarse failure classification shared by every pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    GatewayUnavailable,
    GatewayOrGeneration,
    SchemaExecution,
    DataExecution,
    InvariantViolation,
    Store,
}

impl FailureKind {
    /// SQL-shaped failures are the caller's to fix by refining the context,
    /// so they map to 400; generation and infrastructure problems map to 500.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation
            | Self::SchemaExecution
            | Self::DataExecution
            | Self::InvariantViolation => 400,
            Self::GatewayUnavailable | Self::GatewayOrGeneration | Self::Store => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::GatewayUnavailable => "gateway_unavailable",
            Self::GatewayOrGeneration => "gateway_or_generation",
            Self::SchemaExecution => "schema_execution",
            Self::DataExecution => "data_execution",
            Self::InvariantViolation => "invariant_violation",
            Self::Store => "store",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
