use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::CompletionGateway;
use crate::error::GatewayError;

/// Replays canned completions in order and records every prompt it was sent.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    completions: Mutex<VecDeque<Value>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new(completions: impl IntoIterator<Item = Value>) -> Self {
        Self {
            completions: Mutex::new(completions.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Load a JSON array of completions, one per gateway call.
    pub fn from_file(path: &Path) -> Result<Self, GatewayError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Unavailable(format!("cannot read replay file {}: {e}", path.display()))
        })?;
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => Ok(Self::new(items)),
            Ok(_) => Err(GatewayError::Malformed(format!(
                "replay file {} must contain a JSON array",
                path.display()
            ))),
            Err(e) => Err(GatewayError::Malformed(format!(
                "replay file {} is not JSON: {e}",
                path.display()
            ))),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(&self, prompt: &str) -> Result<Value, GatewayError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or(GatewayError::Exhausted)
    }

    fn is_live(&self) -> bool {
        false
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}
