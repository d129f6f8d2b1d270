//! Minimal chat-completion client for the planner
//!
//! The language model is only a free-text interpreter here: it is asked for
//! strict-JSON intents and never holds any control-flow state. Supports
//! Anthropic and OpenAI-compatible endpoints.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// External chat-completion providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LlmProvider {
    Anthropic,
    OpenAi,
    /// Any OpenAI-compatible endpoint (e.g. a local server).
    Custom { endpoint: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

pub struct LlmClient {
    provider: LlmProvider,
    api_key: String,
    model: String,
    client: Client,
}

impl LlmClient {
    pub fn new(provider: LlmProvider, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(Self { provider, api_key, model, client })
    }

    fn endpoint(&self) -> String {
        match &self.provider {
            LlmProvider::Anthropic => "https://api.anthropic.com/v1/messages".to_string(),
            LlmProvider::OpenAi => "https://api.openai.com/v1/chat/completions".to_string(),
            LlmProvider::Custom { endpoint } => endpoint.clone(),
        }
    }

    /// One non-streaming completion over a system prompt and message history.
    pub async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        match &self.provider {
            LlmProvider::Anthropic => self.anthropic_complete(system, messages).await,
            LlmProvider::OpenAi | LlmProvider::Custom { .. } => {
                self.openai_complete(system, messages).await
            }
        }
    }

    async fn anthropic_complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": 2048,
            "system": system,
            "messages": messages.iter().map(|m| json!({
                "role": match m.role {
                    ChatRole::Assistant => "assistant",
                    _ => "user",
                },
                "content": m.content,
            })).collect::<Vec<_>>(),
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let value = parse_json_response(response, "anthropic").await?;
        value["content"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("anthropic response missing content text"))
    }

    async fn openai_complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        let mut wire = vec![json!({ "role": "system", "content": system })];
        wire.extend(messages.iter().map(|m| {
            json!({
                "role": match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                "content": m.content,
            })
        }));

        let body = json!({
            "model": self.model,
            "messages": wire,
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let value = parse_json_response(response, "openai").await?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("chat completion response missing message content"))
    }
}

/// Parse a response body as JSON, returning a clear error if the server
/// returned HTML instead (service down, proxy error page).
async fn parse_json_response(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<serde_json::Value> {
    let status = response.status();
    let body = response.text().await?;
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(anyhow!(
            "{} returned HTML instead of JSON (HTTP {}): {}",
            endpoint,
            status,
            preview
        ));
    }
    if !status.is_success() {
        let preview: String = body.chars().take(300).collect();
        return Err(anyhow!("{} returned HTTP {}: {}", endpoint, status, preview));
    }
    serde_json::from_str(&body)
        .map_err(|e| anyhow!("failed to parse JSON from {}: {}", endpoint, e))
}
