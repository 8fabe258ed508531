//! Uniform LLM provider contract.
//!
//! Every backend adapter implements [`LlmProvider`] so the router can add
//! policy, retry, and audit behavior once, centrally. The trait is
//! object-safe, allowing dynamic dispatch through `Box<dyn LlmProvider>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{DaxGateError, Result};

/// Supported LLM backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local inference endpoint; the only kind permitted in air-gap mode.
    Ollama,
    /// Hosted chat-completions API.
    AzureOpenAi,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::AzureOpenAi => write!(f, "azure_openai"),
        }
    }
}

impl ProviderKind {
    /// Whether the backend runs on this machine. Air-gap policy only
    /// admits local kinds.
    pub fn is_local(&self) -> bool {
        matches!(self, ProviderKind::Ollama)
    }
}

/// Provider lifecycle status. Transitions are one-directional except
/// Ready⇄Error via repeated health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Initializing,
    Ready,
    Error,
    Offline,
}

/// Configuration for one provider instance. Immutable once the provider
/// is constructed.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// When set, `endpoint` must match `allowed_endpoints` before any
    /// network call is attempted.
    pub validate_endpoint: bool,
    pub allowed_endpoints: Vec<String>,
}

impl LlmConfig {
    /// Creates a config with the shared defaults: low temperature for
    /// deterministic DAX, localhost-only allow-list.
    pub fn new(
        provider: ProviderKind,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            endpoint: endpoint.into(),
            model: model.into(),
            temperature: 0.1,
            max_tokens: 4096,
            top_p: 0.9,
            timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            validate_endpoint: true,
            allowed_endpoints: vec!["127.0.0.1".to_string(), "localhost".to_string()],
        }
    }

    /// Whether the configured endpoint host matches the allow-list.
    ///
    /// This check runs before any network call, which is what makes
    /// air-gap a property the router can prove rather than assert.
    pub fn endpoint_allowed(&self) -> bool {
        if !self.validate_endpoint {
            return true;
        }

        let Ok(parsed) = url::Url::parse(&self.endpoint) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        self.allowed_endpoints
            .iter()
            .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
    }
}

/// Request to an LLM provider. Construction fails closed if the combined
/// prompt text matches a data-return fragment, the last line of defense
/// even if a caller bypasses the sanitizer.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub request_id: String,
    /// Per-call overrides.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

const DANGEROUS_PATTERNS: [&str; 6] = [
    "INSERT INTO",
    "UPDATE ",
    "DELETE FROM",
    "SELECT *",
    "TRUNCATE",
    "DROP TABLE",
];

impl LlmRequest {
    /// Builds a validated request.
    ///
    /// # Errors
    /// Returns [`DaxGateError::RequestValidation`] naming the first
    /// dangerous pattern found in the combined prompt text.
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Result<Self> {
        let system_prompt = system_prompt.into();
        let user_prompt = user_prompt.into();

        let combined = format!("{system_prompt} {user_prompt}").to_uppercase();
        for pattern in DANGEROUS_PATTERNS {
            if combined.contains(pattern) {
                return Err(DaxGateError::RequestValidation {
                    pattern: pattern.to_string(),
                });
            }
        }

        Ok(Self {
            system_prompt,
            user_prompt,
            request_id: request_id.into(),
            temperature: None,
            max_tokens: None,
        })
    }

    /// Builds the DAX-generation request from sanitized schema text and
    /// user intent.
    ///
    /// # Errors
    /// Propagates request validation failures.
    pub fn for_dax(
        schema_text: &str,
        user_intent: &str,
        request_id: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            dax_system_prompt(),
            dax_user_prompt(schema_text, user_intent),
            request_id,
        )
    }
}

/// System prompt for DAX generation.
pub fn dax_system_prompt() -> &'static str {
    "You are an expert DAX (Data Analysis Expressions) query generator for tabular models.\n\
     \n\
     Your task is to generate valid DAX queries based on the provided schema and user requirements.\n\
     \n\
     RULES:\n\
     1. Generate ONLY valid DAX syntax\n\
     2. Use only the tables and columns provided in the schema\n\
     3. Follow DAX best practices\n\
     4. Use appropriate functions (CALCULATE, SUMX, FILTER, etc.)\n\
     5. Quote table names with spaces using single quotes: 'Table Name'[Column]\n\
     6. Return ONLY the DAX query, no explanations\n\
     \n\
     OUTPUT FORMAT:\n\
     Return the DAX query wrapped in ```dax and ``` markers.\n"
}

/// User prompt combining sanitized schema text and intent.
pub fn dax_user_prompt(schema_text: &str, user_intent: &str) -> String {
    format!(
        "SCHEMA:\n{schema_text}\n\nUSER REQUEST:\n{user_intent}\n\nGenerate the DAX query to fulfill this request."
    )
}

/// Response from an LLM provider.
///
/// `raw_response` never contains source data: the provider only ever
/// received the sanitized schema.
#[derive(Debug, Clone, Serialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub provider: ProviderKind,
    pub latency_ms: f64,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub request_id: String,
    pub raw_response: Option<Value>,
}

impl LlmResponse {
    /// Whether the response carries non-empty content.
    pub fn success(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Contract every LLM backend adapter implements.
///
/// Lifecycle: `initialize` → Ready → `generate`* → `shutdown`. Health
/// checks are idempotent, side-effect-free reachability probes that may
/// flip a provider between Ready and Error.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// The backend kind this adapter handles.
    fn kind(&self) -> ProviderKind;

    /// Current lifecycle status.
    fn status(&self) -> ProviderStatus;

    /// Last initialization or health-check failure, if any.
    fn last_error(&self) -> Option<String>;

    /// The immutable per-instance configuration.
    fn config(&self) -> &LlmConfig;

    /// Opens resources and runs one cheap connectivity probe.
    ///
    /// The endpoint allow-list is checked before any network call.
    ///
    /// # Errors
    /// Returns a configuration error for a disallowed endpoint, or a
    /// connection error when the probe fails; status becomes Error.
    async fn initialize(&mut self) -> Result<()>;

    /// Reachability probe. Never mutates backend state.
    async fn health_check(&mut self) -> bool;

    /// The single inference call.
    ///
    /// # Errors
    /// Timeout-class failures are retried internally per the shared
    /// config; connection refusal and provider-level errors are not.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Releases resources; status becomes Offline.
    async fn shutdown(&mut self);
}

/// Runs one provider attempt up to `max_retries` times with a fixed delay
/// between attempts.
///
/// Only timeout-class errors are retried: a refused connection means the
/// service is down and retrying would waste the timeout budget. After
/// exhaustion the error names the attempt count.
///
/// # Errors
/// The last non-retryable error, or [`DaxGateError::ProviderTimeout`]
/// after exhaustion.
pub async fn with_retry<T, F, Fut>(
    config: &LlmConfig,
    request_id: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_retries.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(error) if error.recoverable() => {
                if attempts >= max_attempts {
                    return Err(DaxGateError::ProviderTimeout {
                        provider: config.provider,
                        attempts,
                        request_id: Some(request_id.to_string()),
                    });
                }
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}
