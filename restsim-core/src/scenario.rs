//! Generating and adopting a fresh fictitious backend.

use serde::Serialize;
use serde_json::Value;

use crate::error::{GatewayError, SimulationError};
use crate::gateway::CompletionGateway;
use crate::prompt::build_scenario_prompt;
use crate::state::StateStore;
use crate::types::ContextState;

/// An adopted scenario plus a sample request body to try against it.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedScenario {
    pub context: ContextState,
    pub payload: Value,
    /// Schema rendering after adoption; always starts empty.
    pub schema: String,
}

fn required_text<'a>(completion: &'a Value, key: &str) -> Result<&'a str, SimulationError> {
    completion
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| SimulationError::Generation(format!("scenario response missing '{key}'")))
}

/// Ask the gateway for a new scenario, then reset the store and adopt it.
///
/// Nothing changes unless the completion carries a valid prompt, method and
/// endpoint.
pub async fn generate_scenario(
    state: &StateStore,
    gateway: &dyn CompletionGateway,
) -> Result<GeneratedScenario, SimulationError> {
    if !gateway.is_available() {
        return Err(GatewayError::Unavailable(
            "no completion credential is configured; set OPENAI_API_KEY".into(),
        )
        .into());
    }

    let generic = state.get_prompt().await.generic_prompt;
    let prompt = build_scenario_prompt(&generic);
    tracing::debug!(%prompt, "scenario prompt");

    let completion = gateway.complete(&prompt).await?;

    let context_prompt = required_text(&completion, "prompt")?;
    let method = required_text(&completion, "method")?;
    let endpoint = required_text(&completion, "endpoint")?;
    ContextState::validated(generic.as_str(), context_prompt, method, endpoint)
        .map_err(|e| SimulationError::Generation(format!("scenario rejected: {e}")))?;

    let (context, schema) = state.adopt_scenario(context_prompt, method, endpoint).await?;
    let payload = completion.get("payload").cloned().unwrap_or(Value::Null);

    tracing::info!(
        method = %context.method,
        endpoint = %context.endpoint,
        provider = gateway.provider_name(),
        "scenario generated"
    );
    Ok(GeneratedScenario {
        context,
        payload,
        schema,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::gateway::{ScriptedGateway, UnavailableGateway};
    use serde_json::json;

    async fn state_with_table() -> StateStore {
        let context = ContextState::validated("generic", "a bookshop", "GET", "/books").unwrap();
        let state = StateStore::new(context).await.unwrap();
        let mut store = state.lock_store().await;
        sqlx::raw_sql("CREATE TABLE books(id INTEGER)")
            .execute(&mut *store)
            .await
            .unwrap();
        drop(store);
        state
    }

    #[tokio::test]
    async fn adopts_generated_scenario_on_empty_store() {
        let state = state_with_table().await;
        let gateway = ScriptedGateway::new([json!({
            "prompt": "A veterinary clinic with pets and appointments.",
            "method": "post",
            "endpoint": "appointments",
            "payload": {"petId": 3, "date": "2026-01-02"}
        })]);

        let scenario = generate_scenario(&state, &gateway).await.unwrap();
        assert_eq!(scenario.context.endpoint, "/appointments");
        assert_eq!(scenario.context.generic_prompt, "generic");
        assert_eq!(scenario.payload["petId"], 3);
        assert_eq!(scenario.schema, "(no tables yet)");
        assert_eq!(state.get_prompt().await, scenario.context);
        assert!(gateway.prompts()[0].starts_with("generic"));
    }

    #[tokio::test]
    async fn missing_payload_becomes_null() {
        let state = state_with_table().await;
        let gateway = ScriptedGateway::new([json!({
            "prompt": "A library.",
            "method": "GET",
            "endpoint": "/loans"
        })]);
        let scenario = generate_scenario(&state, &gateway).await.unwrap();
        assert_eq!(scenario.payload, Value::Null);
    }

    #[tokio::test]
    async fn unavailable_gateway_changes_nothing() {
        let state = state_with_table().await;
        let before = state.get_prompt().await;

        let err = generate_scenario(&state, &UnavailableGateway::new("no key"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::GatewayUnavailable);
        assert_eq!(state.get_prompt().await, before);
        assert!(!state.observe().await.unwrap().0.is_empty());
    }

    #[tokio::test]
    async fn invalid_scenario_is_a_generation_failure() {
        let state = state_with_table().await;
        let gateway = ScriptedGateway::new([json!({
            "prompt": "A library.",
            "method": "TRACE",
            "endpoint": "/loans"
        })]);

        let err = generate_scenario(&state, &gateway).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::GatewayOrGeneration);
        assert!(!state.observe().await.unwrap().0.is_empty());
    }

    #[tokio::test]
    async fn missing_field_is_a_generation_failure() {
        let state = state_with_table().await;
        let gateway = ScriptedGateway::new([json!({"prompt": "A library."})]);
        let err = generate_scenario(&state, &gateway).await.unwrap_err();
        assert!(err.to_string().contains("'method'"));
    }
}
