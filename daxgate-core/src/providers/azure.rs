//! Azure OpenAI adapter for hosted chat-completions inference.
//!
//! Not permitted in air-gap mode; the router rejects this kind before the
//! adapter is ever constructed. Deployments that allow it must extend the
//! endpoint allow-list accordingly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{DaxGateError, Result};
use crate::provider::{
    LlmConfig, LlmProvider, LlmRequest, LlmResponse, ProviderKind, ProviderStatus, with_retry,
};

/// Azure-specific settings on top of the shared provider config.
#[derive(Debug, Clone)]
pub struct AzureConfig {
    /// Resource endpoint, e.g. `https://resource.openai.azure.com/`.
    /// Pasted URLs with trailing paths are normalized to the base.
    pub endpoint: String,
    pub api_key: String,
    /// Deployment name, e.g. `gpt-4o`.
    pub deployment: String,
    pub api_version: String,
}

impl AzureConfig {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            deployment: deployment.into(),
            api_version: "2024-12-01-preview".to_string(),
        }
    }
}

/// Reduces a pasted Azure URL to scheme + host. Users often paste full
/// deployment URLs including paths and query strings.
fn clean_endpoint(endpoint: &str) -> String {
    match url::Url::parse(endpoint) {
        Ok(parsed) => {
            let mut base = format!(
                "{}://{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or_default()
            );
            if let Some(port) = parsed.port() {
                base.push_str(&format!(":{port}"));
            }
            base
        }
        Err(_) => endpoint.trim_end_matches('/').to_string(),
    }
}

/// Hosted inference via Azure OpenAI chat completions.
pub struct AzureOpenAiProvider {
    config: LlmConfig,
    azure: AzureConfig,
    client: Option<reqwest::Client>,
    status: ProviderStatus,
    last_health_check: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl AzureOpenAiProvider {
    pub fn new(config: LlmConfig, azure: AzureConfig) -> Self {
        Self {
            config,
            azure,
            client: None,
            status: ProviderStatus::Initializing,
            last_health_check: None,
            error_message: None,
        }
    }

    /// Timestamp of the most recent reachability probe.
    pub fn last_health_check(&self) -> Option<DateTime<Utc>> {
        self.last_health_check
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            clean_endpoint(&self.azure.endpoint),
            self.azure.deployment,
            self.azure.api_version
        )
    }

    fn build_payload(&self, request: &LlmRequest, include_sampling: bool) -> Value {
        let mut messages = Vec::new();
        if !request.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": request.system_prompt}));
        }
        messages.push(json!({"role": "user", "content": request.user_prompt}));

        let mut payload = json!({
            "messages": messages,
            "max_completion_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
        });

        // Some deployments reject non-default sampling parameters.
        if include_sampling {
            let temperature = request.temperature.unwrap_or(self.config.temperature);
            if (temperature - 1.0).abs() > f32::EPSILON {
                payload["temperature"] = json!(temperature);
            }
            if (self.config.top_p - 1.0).abs() > f32::EPSILON {
                payload["top_p"] = json!(self.config.top_p);
            }
        }

        payload
    }

    async fn post_chat(&self, payload: &Value, request_id: &str) -> Result<Value> {
        let client = self.client.as_ref().ok_or_else(|| {
            DaxGateError::connection(
                ProviderKind::AzureOpenAi,
                "provider not initialized",
                Some(request_id.to_string()),
            )
        })?;

        let response = client
            .post(self.completions_url())
            .json(payload)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, request_id))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DaxGateError::provider(
                ProviderKind::AzureOpenAi,
                format!("returned status {status}: {detail}"),
                Some(request_id.to_string()),
            ));
        }

        response.json().await.map_err(|e| {
            DaxGateError::provider(
                ProviderKind::AzureOpenAi,
                format!("malformed response: {e}"),
                Some(request_id.to_string()),
            )
        })
    }
}

fn classify_transport_error(error: &reqwest::Error, request_id: &str) -> DaxGateError {
    if error.is_timeout() {
        DaxGateError::ProviderTimeout {
            provider: ProviderKind::AzureOpenAi,
            attempts: 1,
            request_id: Some(request_id.to_string()),
        }
    } else if error.is_connect() {
        DaxGateError::connection(
            ProviderKind::AzureOpenAi,
            format!("cannot connect to Azure OpenAI: {error}"),
            Some(request_id.to_string()),
        )
    } else {
        DaxGateError::provider(
            ProviderKind::AzureOpenAi,
            format!("request failed: {error}"),
            Some(request_id.to_string()),
        )
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AzureOpenAi
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
        if !self.config.endpoint_allowed() {
            self.status = ProviderStatus::Error;
            let message = format!(
                "endpoint '{}' is not in the allow-list",
                self.config.endpoint
            );
            self.error_message = Some(message.clone());
            return Err(DaxGateError::configuration(message));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        let mut key_value = reqwest::header::HeaderValue::from_str(&self.azure.api_key)
            .map_err(|_| DaxGateError::configuration("API key contains invalid characters"))?;
        key_value.set_sensitive(true);
        headers.insert("api-key", key_value);

        let client = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| DaxGateError::configuration(format!("cannot build HTTP client: {e}")))?;
        self.client = Some(client);

        if !self.health_check().await {
            self.status = ProviderStatus::Error;
            self.error_message = Some("Azure OpenAI health check failed".to_string());
            return Err(DaxGateError::connection(
                ProviderKind::AzureOpenAi,
                "health check failed",
                None,
            ));
        }

        self.status = ProviderStatus::Ready;
        self.error_message = None;
        Ok(())
    }

    async fn health_check(&mut self) -> bool {
        let Some(client) = self.client.as_ref() else {
            return false;
        };

        let probe = json!({
            "messages": [{"role": "user", "content": "test"}],
            "max_completion_tokens": 1,
        });
        let result = client.post(self.completions_url()).json(&probe).send().await;
        self.last_health_check = Some(Utc::now());

        // 400 still proves the API is reachable and authenticated routing
        // works; only transport failures and 5xx count as unhealthy.
        let healthy = matches!(
            result.map(|r| r.status().as_u16()),
            Ok(200) | Ok(400)
        );

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
                ProviderKind::AzureOpenAi,
                "provider not ready",
                Some(request.request_id.clone()),
            ));
        }

        let start = Instant::now();
        let payload = self.build_payload(request, true);

        let result = with_retry(&self.config, &request.request_id, || {
            self.post_chat(&payload, &request.request_id)
        })
        .await;

        // Deployments that reject custom sampling report unsupported_value
        // on a 400; retry once with the parameters stripped.
        let data = match result {
            Err(DaxGateError::Provider { ref context, .. })
                if context.contains("unsupported_value")
                    && (context.contains("temperature") || context.contains("top_p")) =>
            {
                warn!("deployment rejected sampling parameters, retrying without them");
                let stripped = self.build_payload(request, false);
                with_retry(&self.config, &request.request_id, || {
                    self.post_chat(&stripped, &request.request_id)
                })
                .await?
            }
            other => other?,
        };

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(latency_ms, "azure generation complete");

        let content = data
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let usage = data.get("usage").cloned().unwrap_or(Value::Null);

        Ok(LlmResponse {
            content,
            model: self.azure.deployment.clone(),
            provider: ProviderKind::AzureOpenAi,
            latency_ms,
            prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64),
            completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64),
            total_tokens: usage.get("total_tokens").and_then(Value::as_u64),
            request_id: request.request_id.clone(),
            raw_response: Some(data),
        })
    }

    async fn shutdown(&mut self) {
        self.client = None;
        self.status = ProviderStatus::Offline;
    }
}
