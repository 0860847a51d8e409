//! restsim-core: a fake REST backend driven by generated SQL.
//!
//! A simulation asks a completion gateway for SQL in two phases: schema
//! preparation, then data changes plus one final query. Each phase runs as a
//! single transaction on a volatile in-memory SQLite store, and the final
//! query's rows become the simulated response. Between the phases the store
//! is introspected again so the data prompt sees what the schema phase did.

pub mod config;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod introspect;
pub mod orchestrator;
pub mod prompt;
pub mod scenario;
pub mod state;
pub mod types;

pub use config::{build_gateway, GatewayMode, SimulatorConfig};
pub use error::{FailureKind, GatewayError, SimulationError, ValidationError};
pub use gateway::{CompletionGateway, ScriptedGateway, UnavailableGateway};
pub use orchestrator::{
    PartialOutcome, SimulationFailure, SimulationOrchestrator, SimulationReport,
    SimulationRequest, Stage,
};
pub use scenario::{generate_scenario, GeneratedScenario};
pub use state::StateStore;
pub use types::{ContextState, HttpMethod, SchemaSnapshot, TableStats};
