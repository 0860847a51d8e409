//! POST /api/scenario — generate and adopt a new fictitious backend.

use axum::extract::State;
use axum::Json;
use restsim_core::generate_scenario;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::AppState;

pub async fn scenario(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let generated = generate_scenario(&app.state, app.gateway.as_ref()).await?;
    Ok(Json(json!({
        "prompt": generated.context.stored_prompt,
        "method": generated.context.method,
        "endpoint": generated.context.endpoint,
        "payload": generated.payload,
        "schema": generated.schema,
    })))
}
