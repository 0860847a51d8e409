//! Mapping of pipeline errors onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use restsim_core::{FailureKind, SimulationError, SimulationFailure, ValidationError};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    /// A request body that is not the expected JSON shape.
    BadRequest(String),
    /// Rejected prompt/method/endpoint input.
    Validation(ValidationError),
    /// A simulation that stopped before completing.
    Simulation(Box<SimulationFailure>),
    /// Scenario generation failed.
    Scenario(SimulationError),
    /// The volatile store could not be read or replaced.
    Store(String),
}

impl AppError {
    pub fn store(e: impl std::fmt::Display) -> Self {
        Self::Store(e.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Simulation(failure) => status_code(failure.http_status()),
            // A missing credential is the operator's to fix, not a server fault.
            Self::Scenario(e) if e.kind() == FailureKind::GatewayUnavailable => {
                StatusCode::BAD_REQUEST
            }
            Self::Scenario(e) => status_code(e.kind().http_status()),
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn status_code(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<SimulationFailure> for AppError {
    fn from(failure: SimulationFailure) -> Self {
        Self::Simulation(Box::new(failure))
    }
}

impl From<SimulationError> for AppError {
    fn from(e: SimulationError) -> Self {
        Self::Scenario(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(message) => json!({ "message": message }),
            Self::Validation(e) => json!({ "message": e.to_string() }),
            Self::Simulation(failure) => {
                serde_json::to_value(&*failure).unwrap_or_else(|e| {
                    json!({ "message": failure.message.clone(), "error": e.to_string() })
                })
            }
            Self::Scenario(e) => {
                let message = match e.kind() {
                    FailureKind::GatewayUnavailable => "Completion gateway unavailable",
                    _ => "Failed to generate scenario",
                };
                json!({ "message": message, "error": e.to_string(), "kind": e.kind() })
            }
            Self::Store(e) => json!({ "message": "Store error", "error": e }),
        };
        if status.is_server_error() {
            tracing::error!(%status, %body, "request failed");
        }
        (status, Json(body)).into_response()
    }
}
