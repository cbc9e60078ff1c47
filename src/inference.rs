//! Concrete inference providers.
//!
//! - **[`DisabledProvider`]**: always errors; figure enrichment degrades to
//!   stub blocks and chat reports an upstream error.
//! - **[`OpenAiProvider`]**: `POST {base_url}/chat/completions`.
//! - **[`OllamaProvider`]**: `POST {base_url}/api/chat` with `stream: false`.
//!
//! Calls are never retried. A timeout applies only when
//! `inference.timeout_secs` is set.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use pagewise_core::inference::{InferenceProvider, Prompt};

use crate::config::InferenceConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

fn http_client(config: &InferenceConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

fn chat_messages(prompt: &Prompt) -> Vec<Value> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &prompt.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": prompt.user }));
    messages
}

async fn post_json(request: reqwest::RequestBuilder, what: &str, body: &Value) -> Result<Value> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .with_context(|| format!("{} request failed", what))?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", what, status, body_text);
    }
    Ok(response.json().await?)
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl InferenceProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &Prompt) -> Result<String> {
        bail!("Inference provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Chat completions against the OpenAI API (or a compatible server).
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("inference.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http_client(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model,
            temperature: config.temperature,
            api_key,
        })
    }
}

/// Extract `choices[0].message.content`.
fn parse_openai_response(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

#[async_trait]
impl InferenceProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": chat_messages(prompt),
            "temperature": self.temperature,
        });
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key));
        let json = post_json(request, "OpenAI", &body).await?;
        parse_openai_response(&json)
    }
}

// ============ Ollama Provider ============

/// Chat against a local Ollama server.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaProvider {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("inference.model required for Ollama provider"))?;
        Ok(Self {
            client: http_client(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            model,
            temperature: config.temperature,
        })
    }
}

/// Extract `message.content`.
fn parse_ollama_response(json: &Value) -> Result<String> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
}

#[async_trait]
impl InferenceProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": chat_messages(prompt),
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let request = self.client.post(url);
        let json = post_json(request, "Ollama", &body).await?;
        parse_ollama_response(&json)
    }
}

/// Create the configured [`InferenceProvider`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAiProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
pub fn create_provider(config: &InferenceConfig) -> Result<Box<dyn InferenceProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown inference provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_messages_include_system_first() {
        let prompt = Prompt::new("question").with_system("rules");
        let messages = chat_messages(&prompt);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "question");
        assert_eq!(chat_messages(&Prompt::new("q")).len(), 1);
    }

    #[test]
    fn test_parse_openai_response() {
        let json = json!({ "choices": [{ "message": { "role": "assistant", "content": "Hi" } }] });
        assert_eq!(parse_openai_response(&json).unwrap(), "Hi");
        assert!(parse_openai_response(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = json!({ "message": { "role": "assistant", "content": "Hello" }, "done": true });
        assert_eq!(parse_ollama_response(&json).unwrap(), "Hello");
        assert!(parse_ollama_response(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let err = DisabledProvider.complete(&Prompt::new("x")).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_create_provider_disabled() {
        let provider = create_provider(&InferenceConfig::default()).unwrap();
        assert_eq!(provider.name(), "disabled");
    }
}
