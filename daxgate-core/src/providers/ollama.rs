//! Ollama adapter for local LLM inference.
//!
//! Ollama runs entirely on localhost, making it the recommended backend
//! for air-gapped deployments: no data leaves the machine. The adapter
//! maps Ollama's generate API onto the uniform request/response contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::debug;

use crate::error::{DaxGateError, Result};
use crate::provider::{
    LlmConfig, LlmProvider, LlmRequest, LlmResponse, ProviderKind, ProviderStatus, with_retry,
};

/// Reasoning models (Qwen3, DeepSeek-R1) wrap internal reasoning in
/// think tags; the answer is whatever follows.
static THINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>(.*?)</think>")
        .unwrap_or_else(|_| unreachable!("think-tag pattern is valid"))
});

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    model: Option<String>,
    done: Option<bool>,
    total_duration: Option<u64>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    #[serde(default)]
    name: String,
}

/// Local inference via Ollama's REST API.
pub struct OllamaProvider {
    config: LlmConfig,
    client: Option<reqwest::Client>,
    status: ProviderStatus,
    model_loaded: bool,
    last_health_check: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl OllamaProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: None,
            status: ProviderStatus::Initializing,
            model_loaded: false,
            last_health_check: None,
            error_message: None,
        }
    }

    /// Whether the configured model was found during initialization.
    pub fn model_loaded(&self) -> bool {
        self.model_loaded
    }

    /// Timestamp of the most recent reachability probe.
    pub fn last_health_check(&self) -> Option<DateTime<Utc>> {
        self.last_health_check
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.endpoint.trim_end_matches('/'))
    }

    async fn probe_tags(&self) -> Option<TagsResponse> {
        let client = self.client.as_ref()?;
        let response = client.get(self.api_url("/api/tags")).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok()
    }

    async fn model_available(&mut self) -> bool {
        let Some(tags) = self.probe_tags().await else {
            return false;
        };

        // Configured name may carry a tag, e.g. "mistral:7b-instruct".
        let base = self.config.model.split(':').next().unwrap_or_default();
        let found = tags.models.iter().any(|m| m.name.starts_with(base));
        self.model_loaded = found;
        found
    }

    async fn attempt_generate(&self, request: &LlmRequest) -> Result<GenerateResponse> {
        let client = self.client.as_ref().ok_or_else(|| {
            DaxGateError::connection(
                ProviderKind::Ollama,
                "provider not initialized",
                Some(request.request_id.clone()),
            )
        })?;

        let payload = GenerateRequest {
            model: &self.config.model,
            prompt: &request.user_prompt,
            system: &request.system_prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature.unwrap_or(self.config.temperature),
                num_predict: request.max_tokens.unwrap_or(self.config.max_tokens),
                top_p: self.config.top_p,
            },
        };

        let response = client
            .post(self.api_url("/api/generate"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &request.request_id))?;

        if !response.status().is_success() {
            return Err(DaxGateError::provider(
                ProviderKind::Ollama,
                format!("returned status {}", response.status()),
                Some(request.request_id.clone()),
            ));
        }

        response.json().await.map_err(|e| {
            DaxGateError::provider(
                ProviderKind::Ollama,
                format!("malformed response: {e}"),
                Some(request.request_id.clone()),
            )
        })
    }
}

fn classify_transport_error(error: &reqwest::Error, request_id: &str) -> DaxGateError {
    if error.is_timeout() {
        // Per-attempt timeout; the retry helper owns the final count.
        DaxGateError::ProviderTimeout {
            provider: ProviderKind::Ollama,
            attempts: 1,
            request_id: Some(request_id.to_string()),
        }
    } else if error.is_connect() {
        DaxGateError::connection(
            ProviderKind::Ollama,
            format!("cannot connect to Ollama: {error}"),
            Some(request_id.to_string()),
        )
    } else {
        DaxGateError::provider(
            ProviderKind::Ollama,
            format!("request failed: {error}"),
            Some(request_id.to_string()),
        )
    }
}

/// Extracts the answer from a reasoning-model response, dropping the
/// think block. Falls back to the reasoning text when nothing follows it.
fn strip_reasoning(content: &str) -> String {
    let Some(captures) = THINK_RE.captures(content) else {
        return content.to_string();
    };

    let after = THINK_RE.replace_all(content, "");
    let after = after.trim();
    if !after.is_empty() {
        return after.to_string();
    }

    captures
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn status(&self) -> ProviderStatus {
        self.status
    }

    fn last_error(&self) -> Option<String> {
        self.error_message.clone()
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn initialize(&mut self) -> Result<()> {
        // Ollama must never be reached over a network interface; the
        // allow-list is checked before the client even exists.
        if !self.config.endpoint_allowed() {
            self.status = ProviderStatus::Error;
            let message = format!(
                "endpoint '{}' is not in the allow-list; Ollama must be local",
                self.config.endpoint
            );
            self.error_message = Some(message.clone());
            return Err(DaxGateError::configuration(message));
        }

        let client = reqwest::Client::builder()
            .timeout(self.config.timeout)
            // Redirects could route a request off-host.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DaxGateError::configuration(format!("cannot build HTTP client: {e}")))?;
        self.client = Some(client);

        if !self.health_check().await {
            self.status = ProviderStatus::Error;
            self.error_message = Some("cannot connect to Ollama".to_string());
            return Err(DaxGateError::connection(
                ProviderKind::Ollama,
                "cannot connect to Ollama",
                None,
            ));
        }

        if !self.model_available().await {
            self.status = ProviderStatus::Error;
            let message = format!("model '{}' not available in Ollama", self.config.model);
            self.error_message = Some(message.clone());
            return Err(DaxGateError::configuration(message));
        }

        self.status = ProviderStatus::Ready;
        self.error_message = None;
        Ok(())
    }

    async fn health_check(&mut self) -> bool {
        let healthy = self.probe_tags().await.is_some();
        self.last_health_check = Some(Utc::now());

        match (healthy, self.status) {
            (true, ProviderStatus::Error) => self.status = ProviderStatus::Ready,
            (false, ProviderStatus::Ready) => self.status = ProviderStatus::Error,
            _ => {}
        }
        healthy
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        if self.status != ProviderStatus::Ready {
            return Err(DaxGateError::connection(
                ProviderKind::Ollama,
                "provider not ready",
                Some(request.request_id.clone()),
            ));
        }

        let start = Instant::now();
        let data = with_retry(&self.config, &request.request_id, || {
            self.attempt_generate(request)
        })
        .await?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        debug!(
            latency_ms,
            response_len = data.response.len(),
            "ollama generation complete"
        );

        let total_tokens = match (data.prompt_eval_count, data.eval_count) {
            (None, None) => None,
            (prompt, eval) => Some(prompt.unwrap_or(0) + eval.unwrap_or(0)),
        };

        Ok(LlmResponse {
            content: strip_reasoning(&data.response),
            model: self.config.model.clone(),
            provider: ProviderKind::Ollama,
            latency_ms,
            prompt_tokens: data.prompt_eval_count,
            completion_tokens: data.eval_count,
            total_tokens,
            request_id: request.request_id.clone(),
            raw_response: Some(json!({
                "model": data.model,
                "done": data.done,
                "total_duration": data.total_duration,
            })),
        })
    }

    async fn shutdown(&mut self) {
        self.client = None;
        self.status = ProviderStatus::Offline;
    }
}

/// Config preset for a local Ollama endpoint: localhost-only allow-list
/// including IPv6 loopback, generous timeout for reasoning models.
pub fn ollama_config(endpoint: impl Into<String>, model: impl Into<String>) -> LlmConfig {
    let mut config = LlmConfig::new(ProviderKind::Ollama, endpoint, model);
    config.allowed_endpoints = vec![
        "127.0.0.1".to_string(),
        "localhost".to_string(),
        "::1".to_string(),
    ];
    config.timeout = std::time::Duration::from_secs(300);
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_reasoning_returns_answer_after_think() {
        let content = "<think>let me reason about this</think>\nEVALUATE Sales";
        assert_eq!(strip_reasoning(content), "EVALUATE Sales");
    }

    #[test]
    fn test_strip_reasoning_falls_back_to_thinking() {
        let content = "<think>only reasoning, no answer</think>";
        assert_eq!(strip_reasoning(content), "only reasoning, no answer");
    }

    #[test]
    fn test_strip_reasoning_passthrough_without_tags() {
        assert_eq!(strip_reasoning("EVALUATE Sales"), "EVALUATE Sales");
    }

    #[tokio::test]
    async fn test_initialize_rejects_nonlocal_endpoint_before_network() {
        let mut provider =
            OllamaProvider::new(ollama_config("http://ollama.example.com:11434", "mistral"));

        let result = provider.initialize().await;
        assert!(matches!(result, Err(DaxGateError::Configuration { .. })));
        assert_eq!(provider.status(), ProviderStatus::Error);
        // No client was ever built, so no network call was possible.
        assert!(provider.client.is_none());
    }

    #[test]
    fn test_ollama_config_preset() {
        let config = ollama_config("http://127.0.0.1:11434", "deepseek-r1:latest");
        assert!(config.endpoint_allowed());
        assert!(config.allowed_endpoints.contains(&"::1".to_string()));
        assert_eq!(config.provider, ProviderKind::Ollama);
    }

    #[tokio::test]
    async fn test_generate_requires_ready_status() {
        let provider = OllamaProvider::new(ollama_config("http://127.0.0.1:11434", "mistral"));
        let request = LlmRequest::new("system", "intent", "req-1").unwrap();

        let result = provider.generate(&request).await;
        assert!(matches!(
            result,
            Err(DaxGateError::ProviderConnection { .. })
        ));
    }
}
