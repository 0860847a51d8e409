//! Completion gateway abstraction.
//!
//! The pipeline only needs "prompt in, JSON out". Concrete backends:
//! - [`OpenAiGateway`] (feature `openai`): OpenAI chat completions
//! - [`UnavailableGateway`]: no credential configured, fails fast
//! - [`ScriptedGateway`]: canned completions for tests and offline replay

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayError;

#[cfg(feature = "openai")]
mod openai;
mod scripted;

#[cfg(feature = "openai")]
pub use openai::{OpenAiConfig, OpenAiGateway};
pub use scripted::ScriptedGateway;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_OPENAI_TEMPERATURE: f32 = 0.2;

#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Send one prompt and return the parsed JSON completion.
    ///
    /// Text that is not JSON comes back as `Value::Null` rather than an
    /// error; it decodes to an empty statement list downstream.
    async fn complete(&self, prompt: &str) -> Result<Value, GatewayError>;

    /// False when no credential is configured. Checked before any prompt is
    /// assembled so callers fail cleanly instead of partially.
    fn is_available(&self) -> bool {
        true
    }

    /// Whether completions come from a real language model.
    fn is_live(&self) -> bool;

    fn provider_name(&self) -> &str;
}

/// Stand-in used when no API key is configured.
#[derive(Debug, Clone, Default)]
pub struct UnavailableGateway {
    reason: String,
}

impl UnavailableGateway {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CompletionGateway for UnavailableGateway {
    async fn complete(&self, _prompt: &str) -> Result<Value, GatewayError> {
        Err(GatewayError::Unavailable(self.reason.clone()))
    }

    fn is_available(&self) -> bool {
        false
    }

    fn is_live(&self) -> bool {
        false
    }

    fn provider_name(&self) -> &str {
        "unavailable"
    }
}

/// Parse completion text leniently: strip markdown fences, and degrade
/// non-JSON text to `Value::Null` with a warning.
pub fn parse_completion_text(text: &str) -> Value {
    let body = strip_code_fences(text);
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "completion was not valid JSON; treating it as empty: {}",
                truncate(body, 200)
            );
            Value::Null
        }
    }
}

/// Strip markdown code fences (```json ... ```) from the response.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the language tag line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
