//! Gemini API client
//!
//! One long-lived reqwest::Client per process, shared by every run.
//! Retries for throttling and server errors live here and nowhere above.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::Result;

/// Text generation capability shared across concurrent runs.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        system_instruction: Option<&str>,
        prompt: &str,
    ) -> Result<String>;
}

/// Hands out the process-wide model client.
#[async_trait]
pub trait ModelClientProvider: Send + Sync {
    async fn client(&self) -> Result<Arc<dyn ModelClient>>;
}

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            OrchestrationError::ModelInvocation("GOOGLE_API_KEY is not set".to_string())
        })?;

        Self::new(
            api_key,
            settings.gemini_base_url.clone(),
            settings.model_max_retries,
        )
    }

    /// The key travels in `x-goog-api-key`, never in the URL.
    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        system_instruction: Option<&str>,
        prompt: &str,
    ) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::ModelInvocation(
                "Gemini client is not configured (empty API key)".to_string(),
            ));
        }

        let request = GeminiRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 8192,
            },
            system_instruction: system_instruction.map(|text| SystemInstruction {
                parts: vec![Part { text }],
            }),
        };

        let url = self.endpoint(model);
        let mut attempt: u32 = 0;

        loop {
            debug!(model, attempt, "Calling Gemini API");

            let response = self
                .client
                .post(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    let e = e.without_url();
                    error!("Gemini API request failed: {}", e);
                    OrchestrationError::ModelInvocation(format!("Gemini API error: {}", e))
                })?;

            let status = response.status();

            if is_retryable(status) && attempt < self.max_retries {
                let backoff = Duration::from_millis(500 * 2u64.pow(attempt));
                warn!(%status, attempt, ?backoff, "Gemini API throttled or unavailable, retrying");
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                error!("Gemini API error response: {}", error_text);
                return Err(OrchestrationError::ModelInvocation(format!(
                    "Gemini API returned {}: {}",
                    status, error_text
                )));
            }

            let body: Value = response.json().await.map_err(|e| {
                OrchestrationError::ModelInvocation(format!("Gemini parse error: {}", e.without_url()))
            })?;

            let text = extract_text(&body);
            info!(model, chars = text.len(), "Gemini response received");
            return Ok(text);
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Pull text out of a generateContent response.
///
/// Tries, in order: joined `candidates[0].content.parts[*].text`, then
/// `candidates[0].text`, then dict-shaped `candidates[*].content` strings,
/// and finally the raw response serialized. Never returns empty text for
/// a non-error response.
pub fn extract_text(response: &Value) -> String {
    let candidates = response.get("candidates").and_then(Value::as_array);

    if let Some(first) = candidates.and_then(|c| c.first()) {
        let parts_text: Vec<&str> = first
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if !parts_text.is_empty() {
            return parts_text.join("\n");
        }

        if let Some(text) = first.get("text").and_then(Value::as_str) {
            if !text.is_empty() {
                return text.to_string();
            }
        }
    }

    if let Some(all) = candidates {
        let joined: Vec<&str> = all
            .iter()
            .filter_map(|c| c.get("content").and_then(Value::as_str))
            .filter(|t| !t.is_empty())
            .collect();
        if !joined.is_empty() {
            return joined.join("\n");
        }
    }

    response.to_string()
}

/// Builds the Gemini client once, on first use.
pub struct GeminiProvider {
    settings: Arc<Settings>,
    client: OnceCell<Arc<dyn ModelClient>>,
}

impl GeminiProvider {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
        }
    }
}

#[async_trait]
impl ModelClientProvider for GeminiProvider {
    async fn client(&self) -> Result<Arc<dyn ModelClient>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let client = GeminiClient::from_settings(&self.settings)?;
                info!(model = %self.settings.model_name, "Created Gemini client");
                Ok::<Arc<dyn ModelClient>, OrchestrationError>(Arc::new(client))
            })
            .await?;
        Ok(Arc::clone(client))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}
