//! POST /api/simulate — run both SQL phases for one fake request.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use restsim_core::{SimulationReport, SimulationRequest};

use crate::error::AppError;
use crate::AppState;

pub async fn simulate(
    State(app): State<AppState>,
    body: Result<Json<SimulationRequest>, JsonRejection>,
) -> Result<Json<SimulationReport>, AppError> {
    let Json(req) = body?;
    let report = app.orchestrator.simulate(req).await?;
    Ok(Json(report))
}
