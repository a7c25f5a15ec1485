//! Text generation client.
//!
//! Every agent talks to the model through [`TextGenerator`] so stages can
//! be driven by the real API client or by [`scripted::ScriptedGenerator`]
//! in tests.

mod payload;
pub mod scripted;

pub use payload::{parse_structured_payload, strip_code_fences};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{self, LlmSettings};
use crate::error::{Error, Result};

/// Sampling parameters for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationParams {
    pub const fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }

    /// Low temperature for replies that must parse as JSON.
    pub const fn structured(max_tokens: u32) -> Self {
        Self::new(max_tokens, 0.2)
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::new(4096, 0.7)
    }
}

/// Prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String>;
}

// ── Messages API client ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

const SYSTEM: &str = "You are one stage of an application generation pipeline. \
Follow the output format requested in each prompt exactly. When JSON is requested, \
reply with a single JSON value and nothing else.";

/// Claude Messages API client.
pub struct LlmClient {
    api_key: String,
    api_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        let defaults = LlmSettings::default();
        Self {
            api_key,
            api_url: defaults.api_url,
            model: defaults.model,
            http: reqwest::Client::new(),
        }
    }

    /// Build from settings, reading the API key from the configured env var.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let api_key = config::credential(&settings.api_key_env)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            api_key,
            api_url: settings.api_url.clone(),
            model: settings.model.clone(),
            http,
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.to_string();
        self
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String> {
        let messages = [Message {
            role: "user",
            content: prompt,
        }];
        let body = serde_json::json!({
            "model": &self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "system": SYSTEM,
            "messages": messages,
        });

        let resp = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::http_status(status.as_u16(), &body));
        }

        let parsed: ApiResponse = resp
            .json()
            .await
            .map_err(|e| Error::Parse(format!("unreadable model response: {e}")))?;

        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Text generation complete"
            );
        }

        let text = parsed
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }
}
