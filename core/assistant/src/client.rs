use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// Generation options forwarded verbatim to the inference server
/// (temperature, num_predict, ...).
pub type GenerateOptions = Map<String, Value>;

/// Anything that turns a prompt into completion text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, options: Option<&GenerateOptions>) -> Result<String>;
}

/// Configuration for the local inference server
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "deepseek".to_string(),
            timeout_secs: 120,
        }
    }
}

impl AssistantConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let timeout_secs = std::env::var("OLLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.timeout_secs);

        Self {
            base_url: std::env::var("OLLAMA_URL").unwrap_or(defaults.base_url),
            model: std::env::var("OLLAMA_MODEL").unwrap_or(defaults.model),
            timeout_secs,
        }
    }
}

/// Ollama client for local drafting and chat.
///
/// One blocking request per call: no streaming and no retry. Any non-2xx
/// status is returned as an error carrying the server's body.
pub struct OllamaClient {
    config: AssistantConfig,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: AssistantConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str, options: Option<&GenerateOptions>) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));

        let mut request_body = json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(options) = options {
            request_body["options"] = Value::Object(options.clone());
        }

        debug!("Calling Ollama at {} (model: {})", url, self.config.model);

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .context("Failed to call Ollama API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error {}: {}", status, error_text);
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(ollama_response.response.trim().to_string())
    }
}
