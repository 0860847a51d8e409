//! Environment-driven configuration.
//!
//! Callers load `.env` (via `dotenvy`) before [`SimulatorConfig::from_env`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::gateway::{
    CompletionGateway, ScriptedGateway, UnavailableGateway, DEFAULT_OPENAI_BASE_URL,
    DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_TEMPERATURE, DEFAULT_OPENAI_TIMEOUT_SECS,
};
use crate::types::ContextState;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

pub const DEFAULT_GENERIC_PROMPT: &str = "\
You are the backend of a fictitious REST API. You never answer in prose: you \
write SQLite SQL that prepares and queries an in-memory database so that the \
rows of the final query are a realistic response to the incoming request. \
Invent plausible, internally consistent data when the database has none.";

pub const DEFAULT_CONTEXT_PROMPT: &str = "\
An online bookshop. Customers browse books by author and genre, place orders \
containing one or more books, and leave reviews with a 1-5 star rating.";

pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_ENDPOINT: &str = "/books";

/// Where completions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayMode {
    /// OpenAI when `OPENAI_API_KEY` is set, otherwise unavailable.
    OpenAi,
    /// Canned completions from a JSON array file.
    Replay(PathBuf),
}

#[derive(Clone)]
pub struct SimulatorConfig {
    pub bind_addr: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub openai_timeout: Duration,
    pub openai_temperature: f32,
    pub context_prompt: Option<String>,
    pub method: Option<String>,
    pub endpoint: Option<String>,
    pub gateway_mode: GatewayMode,
}

impl std::fmt::Debug for SimulatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatorConfig")
            .field("bind_addr", &self.bind_addr)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "****"))
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_timeout", &self.openai_timeout)
            .field("openai_temperature", &self.openai_temperature)
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("gateway_mode", &self.gateway_mode)
            .finish_non_exhaustive()
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl SimulatorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let openai_timeout = parse_or(get("OPENAI_TIMEOUT_SECS"), "OPENAI_TIMEOUT_SECS", DEFAULT_OPENAI_TIMEOUT_SECS);
        let openai_temperature =
            parse_or(get("OPENAI_TEMPERATURE"), "OPENAI_TEMPERATURE", DEFAULT_OPENAI_TEMPERATURE);

        let gateway_mode = match get("RESTSIM_GATEWAY").as_deref() {
            Some(mode) if mode.eq_ignore_ascii_case("replay") => match get("RESTSIM_REPLAY_FILE") {
                Some(path) => GatewayMode::Replay(PathBuf::from(path)),
                None => {
                    tracing::warn!("RESTSIM_GATEWAY=replay without RESTSIM_REPLAY_FILE, using OpenAI");
                    GatewayMode::OpenAi
                }
            },
            Some(mode) if !mode.eq_ignore_ascii_case("openai") => {
                tracing::warn!(mode, "unknown RESTSIM_GATEWAY, using OpenAI");
                GatewayMode::OpenAi
            }
            _ => GatewayMode::OpenAi,
        };

        Self {
            bind_addr: get("RESTSIM_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            openai_timeout: Duration::from_secs(openai_timeout),
            openai_temperature,
            context_prompt: get("RESTSIM_CONTEXT_PROMPT"),
            method: get("RESTSIM_METHOD"),
            endpoint: get("RESTSIM_ENDPOINT"),
            gateway_mode,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.openai_api_key.is_some()
    }

    /// Starting context. Invalid configured values fall back to the
    /// defaults with a warning.
    pub fn initial_context(&self) -> ContextState {
        let prompt = self.context_prompt.as_deref().unwrap_or(DEFAULT_CONTEXT_PROMPT);
        let method = self.method.as_deref().unwrap_or(DEFAULT_METHOD);
        let endpoint = self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);

        ContextState::validated(DEFAULT_GENERIC_PROMPT, prompt, method, endpoint).unwrap_or_else(
            |e| {
                tracing::warn!(error = %e, "configured context is invalid, using defaults");
                default_context()
            },
        )
    }
}

fn default_context() -> ContextState {
    ContextState {
        generic_prompt: DEFAULT_GENERIC_PROMPT.to_string(),
        stored_prompt: DEFAULT_CONTEXT_PROMPT.to_string(),
        method: crate::types::HttpMethod::Get,
        endpoint: DEFAULT_ENDPOINT.to_string(),
    }
}

fn parse_or<T: std::str::FromStr + Copy>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable setting, using default");
            default
        }),
    }
}

/// Choose the completion backend for `config`.
///
/// Never fails: any problem yields an [`UnavailableGateway`] that reports
/// the reason on first use.
pub fn build_gateway(config: &SimulatorConfig) -> Arc<dyn CompletionGateway> {
    match &config.gateway_mode {
        GatewayMode::Replay(path) => match ScriptedGateway::from_file(path) {
            Ok(gateway) => {
                tracing::info!(path = %path.display(), completions = gateway.remaining(), "replay gateway loaded");
                Arc::new(gateway)
            }
            Err(e) => {
                tracing::warn!(error = %e, "replay gateway unavailable");
                Arc::new(UnavailableGateway::new(e.to_string()))
            }
        },
        GatewayMode::OpenAi => openai_gateway(config),
    }
}

#[cfg(feature = "openai")]
fn openai_gateway(config: &SimulatorConfig) -> Arc<dyn CompletionGateway> {
    use crate::gateway::{OpenAiConfig, OpenAiGateway};

    let Some(api_key) = config.openai_api_key.clone() else {
        tracing::warn!("OPENAI_API_KEY not set, simulations will be rejected");
        return Arc::new(UnavailableGateway::new("OPENAI_API_KEY is not set"));
    };
    let openai = OpenAiConfig {
        base_url: config.openai_base_url.clone(),
        timeout: config.openai_timeout,
        temperature: config.openai_temperature,
        ..OpenAiConfig::new(api_key).with_model(config.openai_model.clone())
    };
    match OpenAiGateway::new(openai) {
        Ok(gateway) => {
            tracing::info!(model = gateway.model_name(), "OpenAI gateway ready");
            Arc::new(gateway)
        }
        Err(e) => {
            tracing::warn!(error = %e, "OpenAI gateway unavailable");
            Arc::new(UnavailableGateway::new(e.to_string()))
        }
    }
}

#[cfg(not(feature = "openai"))]
fn openai_gateway(_config: &SimulatorConfig) -> Arc<dyn CompletionGateway> {
    Arc::new(UnavailableGateway::new("built without the `openai` feature"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpMethod;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> SimulatorConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SimulatorConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = SimulatorConfig::default();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.openai_model, DEFAULT_OPENAI_MODEL);
        assert_eq!(config.openai_base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.openai_timeout, Duration::from_secs(60));
        assert_eq!(config.gateway_mode, GatewayMode::OpenAi);
        assert!(!config.has_api_key());
    }

    #[test]
    fn blank_key_is_no_key() {
        assert!(!config(&[("OPENAI_API_KEY", "   ")]).has_api_key());
        assert!(config(&[("OPENAI_API_KEY", "sk-test")]).has_api_key());
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = config(&[("OPENAI_TIMEOUT_SECS", "soon"), ("OPENAI_TEMPERATURE", "0.7")]);
        assert_eq!(config.openai_timeout, Duration::from_secs(60));
        assert!((config.openai_temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn initial_context_is_normalized() {
        let context = config(&[
            ("RESTSIM_CONTEXT_PROMPT", "A zoo."),
            ("RESTSIM_METHOD", "patch"),
            ("RESTSIM_ENDPOINT", "animals/1"),
        ])
        .initial_context();
        assert_eq!(context.stored_prompt, "A zoo.");
        assert_eq!(context.method, HttpMethod::Patch);
        assert_eq!(context.endpoint, "/animals/1");
        assert_eq!(context.generic_prompt, DEFAULT_GENERIC_PROMPT);
    }

    #[test]
    fn invalid_initial_context_uses_defaults() {
        let context = config(&[("RESTSIM_METHOD", "HEAD")]).initial_context();
        assert_eq!(context, default_context());
    }

    #[test]
    fn replay_mode_requires_a_file() {
        assert_eq!(
            config(&[("RESTSIM_GATEWAY", "replay")]).gateway_mode,
            GatewayMode::OpenAi
        );
        assert_eq!(
            config(&[("RESTSIM_GATEWAY", "replay"), ("RESTSIM_REPLAY_FILE", "demo.json")]).gateway_mode,
            GatewayMode::Replay(PathBuf::from("demo.json"))
        );
    }

    #[test]
    fn missing_key_builds_unavailable_gateway() {
        let gateway = build_gateway(&SimulatorConfig::default());
        assert!(!gateway.is_available());
    }

    #[test]
    fn unreadable_replay_file_builds_unavailable_gateway() {
        let gateway = build_gateway(&config(&[
            ("RESTSIM_GATEWAY", "replay"),
            ("RESTSIM_REPLAY_FILE", "/definitely/not/here.json"),
        ]));
        assert!(!gateway.is_available());
    }
}
