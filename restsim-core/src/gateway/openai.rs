//! OpenAI Client
//!
//! Chat-completions backend for the completion gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{
    parse_completion_text, truncate, CompletionGateway, DEFAULT_OPENAI_BASE_URL,
    DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_TEMPERATURE, DEFAULT_OPENAI_TIMEOUT_SECS,
};
use crate::error::GatewayError;

const SYSTEM_PROMPT: &str =
    "You write SQLite SQL for a simulated REST backend. Reply with a single JSON object only.";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub temperature: f32,
}

impl OpenAiConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_OPENAI_TIMEOUT_SECS),
            temperature: DEFAULT_OPENAI_TEMPERATURE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// OpenAI API client
#[derive(Clone)]
pub struct OpenAiGateway {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGateway")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiGateway {
    pub fn new(config: OpenAiConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn call_api(&self, prompt: &str) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "model": &self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.config.temperature,
            "response_format": {"type": "json_object"}
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, body });
        }

        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(format!("failed to parse OpenAI response: {e}")))?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GatewayError::Malformed("OpenAI returned no choices".to_string()))
    }
}

#[async_trait]
impl CompletionGateway for OpenAiGateway {
    async fn complete(&self, prompt: &str) -> Result<Value, GatewayError> {
        tracing::debug!(model = %self.config.model, chars = prompt.len(), "requesting completion");
        let text = self.call_api(prompt).await?;
        tracing::debug!("OpenAI raw completion: {}", truncate(&text, 1000));
        Ok(parse_completion_text(&text))
    }

    fn is_available(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    fn is_live(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_gateway() {
        let gateway = OpenAiGateway::new(OpenAiConfig::new("test-key".to_string())).unwrap();
        assert_eq!(gateway.model_name(), DEFAULT_OPENAI_MODEL);
        assert_eq!(gateway.provider_name(), "OpenAI");
        assert!(gateway.is_available());
        assert!(gateway.is_live());
    }

    #[test]
    fn test_with_model_and_endpoint() {
        let mut config = OpenAiConfig::new("test-key".to_string()).with_model("gpt-4o");
        config.base_url = "http://localhost:8080/v1/".to_string();
        let gateway = OpenAiGateway::new(config).unwrap();
        assert_eq!(gateway.model_name(), "gpt-4o");
        assert_eq!(gateway.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn client_defaults_match_environment_defaults() {
        let from_env = crate::config::SimulatorConfig::default();
        let config = OpenAiConfig::new("test-key".to_string());
        assert_eq!(config.model, from_env.openai_model);
        assert_eq!(config.base_url, from_env.openai_base_url);
        assert_eq!(config.timeout, from_env.openai_timeout);
        assert_eq!(config.temperature, from_env.openai_temperature);
    }

    #[test]
    fn blank_key_is_unavailable() {
        let gateway = OpenAiGateway::new(OpenAiConfig::new("  ".to_string())).unwrap();
        assert!(!gateway.is_available());
    }
}
