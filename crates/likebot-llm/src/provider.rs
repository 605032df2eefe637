//! LLM providers.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use likebot_config::LlmConfig;

/// One turn of prior conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Trait for single text-completion calls.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &str;
    /// Complete `prompt` under `system_prompt`, after `history`.
    async fn complete(
        &self,
        system_prompt: &str,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<String>;
}

/// Provider for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatible {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatible {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, system_prompt: &str, prompt: &str, history: &[ChatMessage]) -> serde_json::Value {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(serde_json::json!({ "role": "system", "content": system_prompt }));
        for turn in history {
            messages.push(serde_json::json!({ "role": turn.role, "content": turn.content }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        serde_json::json!({
            "model": self.model,
            "messages": messages,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatible {
    fn id(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        let body = self.request_body(system_prompt, prompt, history);
        tracing::debug!("LLM prompt:\n{prompt}");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = resp.status();
        let json: serde_json::Value = resp
            .json()
            .await
            .context("chat completion response parse failed")?;

        if !status.is_success() {
            let msg = json
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error");
            return Err(anyhow::anyhow!("LLM error ({status}): {msg}"));
        }

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .context("Missing completion text")?;
        tracing::debug!("LLM response:\n{text}");
        Ok(text.to_string())
    }
}

/// Build a provider from config, or `None` when no API key is available.
pub fn provider_from_config(config: &LlmConfig) -> Option<Arc<dyn LlmProvider>> {
    let api_key = config.resolve_api_key()?;
    Some(Arc::new(OpenAiCompatible::new(
        config.base_url.clone(),
        api_key,
        config.model.clone(),
    )))
}
