//! GET/POST /api/prompt — read or replace the backend description.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::AppState;

/// Missing and `null` fields both read as empty and fail validation.
#[derive(Debug, Default, Deserialize)]
pub struct SavePromptRequest {
    pub prompt: Option<String>,
    pub method: Option<String>,
    pub endpoint: Option<String>,
}

pub async fn get_prompt(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let context = app.state.get_prompt().await;
    let schema = app.state.schema_text().await.map_err(AppError::store)?;
    Ok(Json(json!({
        "prompt": context.stored_prompt,
        "method": context.method,
        "endpoint": context.endpoint,
        "hasOpenAIKey": app.has_api_key,
        "schema": schema,
    })))
}

pub async fn save_prompt(
    State(app): State<AppState>,
    body: Result<Json<SavePromptRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = body?;
    let saved = app
        .state
        .set_prompt(
            req.prompt.as_deref().unwrap_or_default(),
            req.method.as_deref().unwrap_or_default(),
            req.endpoint.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(json!({
        "prompt": saved.stored_prompt,
        "method": saved.method,
        "endpoint": saved.endpoint,
    })))
}
