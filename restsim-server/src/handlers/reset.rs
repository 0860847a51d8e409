//! POST /api/reset — discard every table and row.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::AppState;

pub async fn reset(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let schema = app.state.reset().await.map_err(AppError::store)?;
    Ok(Json(json!({
        "status": "reset",
        "schema": schema,
    })))
}
