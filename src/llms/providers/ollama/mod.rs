//! Ollama generation provider.
//!
//! Talks to a locally-running Ollama server through its non-streaming
//! generate endpoint: `POST {base_url}/api/generate` with
//! `{"model", "prompt", "stream": false}`, answered by `{"response": ..}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llms::base_llm::{next_call_sequence, TextGenerator, DEFAULT_REQUEST_TIMEOUT};
use crate::utilities::errors::BackendError;

/// Default Ollama server address.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Configuration for the Ollama provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Server base URL, without the `/api/generate` suffix.
    #[serde(default = "default_url")]
    pub base_url: String,
    /// Model name to generate with.
    pub model: String,
    /// Per-request deadline.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

fn default_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_url(),
            model: "zoral".to_string(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Ollama text-generation client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    http: reqwest::Client,
}

impl OllamaClient {
    /// Create a client with the given configuration.
    pub fn new(config: OllamaConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Transport {
                message: format!("failed to build http client: {}", e),
            })?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }
}

/// Decode a non-streaming generate body.
fn parse_generate_body(body: &str) -> Result<String, BackendError> {
    serde_json::from_str::<GenerateResponse>(body)
        .map(|r| r.response)
        .map_err(|e| BackendError::MalformedResponse {
            message: format!(
                "{} - Body: {}",
                e,
                body.chars().take(500).collect::<String>()
            ),
        })
}

#[async_trait]
impl TextGenerator for OllamaClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let seq = next_call_sequence();
        tracing::debug!(
            seq,
            model = %self.config.model,
            prompt_chars = prompt.len(),
            "ollama generate"
        );

        let response = self
            .http
            .post(self.endpoint())
            .json(&GenerateRequest {
                model: &self.config.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(self.config.timeout)
                } else {
                    BackendError::from(e)
                }
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = parse_generate_body(&body)?;
        tracing::debug!(seq, chars = text.len(), "ollama response received");
        Ok(text)
    }
}
