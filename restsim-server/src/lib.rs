//! restsim-server: HTTP surface of the SQL-backed REST simulator.

use std::sync::Arc;

use restsim_core::{CompletionGateway, SimulationOrchestrator, StateStore};

pub mod error;
pub mod handlers;
pub mod router;

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub state: Arc<StateStore>,
    pub orchestrator: Arc<SimulationOrchestrator>,
    pub gateway: Arc<dyn CompletionGateway>,
    /// Reported to clients as `hasOpenAIKey`.
    pub has_api_key: bool,
}

impl AppState {
    pub fn new(state: Arc<StateStore>, gateway: Arc<dyn CompletionGateway>, has_api_key: bool) -> Self {
        let orchestrator = Arc::new(SimulationOrchestrator::new(
            Arc::clone(&state),
            Arc::clone(&gateway),
        ));
        Self {
            state,
            orchestrator,
            gateway,
            has_api_key,
        }
    }
}
