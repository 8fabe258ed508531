//! Provider routing with deployment policy, boundary enforcement, and
//! audit integration.
//!
//! The router is the only component the rest of the application calls
//! directly. It is an explicitly constructed context object owned by the
//! top-level request handler. There is no process-wide registry, which
//! keeps concurrent tests isolated and prevents cross-request state bleed.

use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditEventKind, AuditLog, NewEvent};
use crate::boundary::{BoundaryConfig, SchemaSanitizer};
use crate::error::{DaxGateError, Result};
use crate::models::Schema;
use crate::provider::{LlmConfig, LlmProvider, LlmRequest, LlmResponse, ProviderKind, ProviderStatus};
use crate::providers::{AzureConfig, AzureOpenAiProvider, OllamaProvider, ollama_config};

/// Deployment environment, constraining which provider kinds may be
/// initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// Only local providers are permitted; nothing leaves the machine.
    Airgap,
    /// Hosted providers within a private network boundary.
    AzurePrivate,
    /// Mixed local and hosted providers.
    Hybrid,
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentMode::Airgap => write!(f, "airgap"),
            DeploymentMode::AzurePrivate => write!(f, "azure_private"),
            DeploymentMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for DeploymentMode {
    type Err = DaxGateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "airgap" => Ok(DeploymentMode::Airgap),
            "azure_private" => Ok(DeploymentMode::AzurePrivate),
            "hybrid" => Ok(DeploymentMode::Hybrid),
            other => Err(DaxGateError::configuration(format!(
                "unknown deployment mode '{other}'"
            ))),
        }
    }
}

/// Constructor input for [`LlmRouter::initialize_provider`]: the shared
/// config plus any backend-specific settings.
pub enum ProviderSetup {
    Ollama(LlmConfig),
    AzureOpenAi(LlmConfig, AzureConfig),
}

impl ProviderSetup {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderSetup::Ollama(_) => ProviderKind::Ollama,
            ProviderSetup::AzureOpenAi(..) => ProviderKind::AzureOpenAi,
        }
    }
}

/// Per-provider entry in a router status report.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub kind: ProviderKind,
    pub status: ProviderStatus,
    pub model: String,
    pub endpoint: String,
    pub last_error: Option<String>,
}

/// Router status report.
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub deployment_mode: DeploymentMode,
    pub primary_provider: Option<ProviderKind>,
    pub providers: Vec<ProviderInfo>,
    pub strict_mode: bool,
}

/// Routes LLM requests to the appropriate provider.
///
/// Every call through [`LlmRouter::generate_dax`] enforces the data
/// boundary before the provider is reached and writes audit records on
/// both sides of the call. Failing closed on a boundary violation is the
/// defining security property of this subsystem.
pub struct LlmRouter {
    deployment_mode: DeploymentMode,
    sanitizer: SchemaSanitizer,
    audit: Arc<AuditLog>,
    providers: HashMap<ProviderKind, Box<dyn LlmProvider>>,
    primary: Option<ProviderKind>,
    fail_closed_on_audit_error: bool,
}

impl LlmRouter {
    pub fn new(
        deployment_mode: DeploymentMode,
        sanitizer: SchemaSanitizer,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            deployment_mode,
            sanitizer,
            audit,
            providers: HashMap::new(),
            primary: None,
            fail_closed_on_audit_error: true,
        }
    }

    /// Controls whether an audit-append failure fails the request.
    ///
    /// Defaults to true: in compliance-sensitive deployments an
    /// un-audited LLM response is worse than a failed request.
    pub fn set_fail_closed_on_audit_error(&mut self, fail_closed: bool) {
        self.fail_closed_on_audit_error = fail_closed;
    }

    /// Constructs and registers a provider from its configuration.
    ///
    /// # Errors
    /// Returns [`DaxGateError::PolicyViolation`], before the adapter is
    /// even constructed, when the deployment mode forbids the kind, or
    /// propagates the adapter's initialization failure.
    pub async fn initialize_provider(&mut self, setup: ProviderSetup) -> Result<()> {
        self.check_policy(setup.kind())?;

        let provider: Box<dyn LlmProvider> = match setup {
            ProviderSetup::Ollama(config) => Box::new(OllamaProvider::new(config)),
            ProviderSetup::AzureOpenAi(config, azure) => {
                Box::new(AzureOpenAiProvider::new(config, azure))
            }
        };
        self.register_provider(provider).await
    }

    /// Registers an already-constructed provider, initializing it first.
    ///
    /// The policy gate runs before `initialize` is invoked, so a
    /// forbidden provider never performs any network activity.
    ///
    /// # Errors
    /// Policy violations and initialization failures.
    pub async fn register_provider(&mut self, mut provider: Box<dyn LlmProvider>) -> Result<()> {
        let kind = provider.kind();
        self.check_policy(kind)?;

        provider.initialize().await?;
        info!(provider = %kind, "provider initialized");

        self.providers.insert(kind, provider);
        if self.primary.is_none() {
            self.primary = Some(kind);
        }
        Ok(())
    }

    /// The single orchestrated entry point: sanitize, audit, generate,
    /// audit again.
    ///
    /// # Errors
    /// - [`DaxGateError::BoundaryViolation`] propagated unchanged from
    ///   the sanitizer; the provider is never called.
    /// - [`DaxGateError::NoProviderAvailable`] when no Ready primary
    ///   exists.
    /// - Provider errors after the per-provider retry budget.
    /// - [`DaxGateError::Audit`] when an append fails and the router is
    ///   configured to fail closed.
    pub async fn generate_dax(
        &self,
        schema: &Schema,
        user_intent: &str,
        request_id: Option<String>,
    ) -> Result<LlmResponse> {
        let request_id = request_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        // Enforce the data boundary before anything leaves the process.
        let sanitized = match self.sanitizer.sanitize(schema) {
            Ok(sanitized) => sanitized,
            Err(DaxGateError::BoundaryViolation { violations }) => {
                let mut details = serde_json::Map::new();
                details.insert(
                    "violations".to_string(),
                    json!(violations.iter().map(|v| v.message.clone()).collect::<Vec<_>>()),
                );
                if let Err(audit_error) = self.audit.log_security_event(
                    AuditEventKind::DataBoundaryViolation,
                    "schema rejected by data boundary",
                    Some(&request_id),
                    details,
                ) {
                    error!(%audit_error, "failed to audit boundary violation");
                }
                return Err(DaxGateError::BoundaryViolation { violations });
            }
            Err(other) => return Err(other),
        };

        let mut details = self
            .sanitizer
            .audit_details(&sanitized.schema, &sanitized.violations);
        details.insert("intent_length".to_string(), json!(user_intent.len()));
        if let Some(primary) = self.primary {
            details.insert("provider".to_string(), json!(primary.to_string()));
        }
        self.audit_append(
            NewEvent::new(AuditEventKind::LlmRequest, "LLM inference request")
                .request_id(&request_id)
                .details(details),
        )?;

        let provider = self.ready_primary()?;

        let schema_text = sanitized.schema.to_prompt_string();
        let request = LlmRequest::for_dax(&schema_text, user_intent, &request_id)?;

        match provider.generate(&request).await {
            Ok(response) => {
                let mut details = serde_json::Map::new();
                details.insert("provider".to_string(), json!(response.provider.to_string()));
                details.insert("latency_ms".to_string(), json!(response.latency_ms));
                details.insert("tokens".to_string(), json!(response.total_tokens));
                details.insert("success".to_string(), json!(response.success()));
                self.audit_append(
                    NewEvent::new(AuditEventKind::LlmResponse, "LLM inference completed")
                        .request_id(&request_id)
                        .details(details),
                )?;
                Ok(response)
            }
            Err(provider_error) => {
                // The failed attempt is itself an auditable fact; the
                // provider error is what the caller needs to see.
                let mut details = serde_json::Map::new();
                details.insert("error".to_string(), json!(provider_error.to_string()));
                if let Err(audit_error) = self.audit.append(
                    NewEvent::new(AuditEventKind::LlmError, "LLM inference failed")
                        .request_id(&request_id)
                        .details(details),
                ) {
                    error!(%audit_error, "failed to audit provider error");
                }
                Err(provider_error)
            }
        }
    }

    /// Lower-level passthrough for custom prompts. Use
    /// [`LlmRouter::generate_dax`] for DAX generation.
    ///
    /// # Errors
    /// [`DaxGateError::NoProviderAvailable`] or provider errors.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.ready_primary()?.generate(request).await
    }

    /// Probes every registered provider, updating Ready⇄Error status.
    pub async fn health_check_all(&mut self) -> HashMap<ProviderKind, bool> {
        let mut results = HashMap::new();
        for (kind, provider) in &mut self.providers {
            results.insert(*kind, provider.health_check().await);
        }
        results
    }

    /// Current router and provider status.
    pub fn status(&self) -> RouterStatus {
        RouterStatus {
            deployment_mode: self.deployment_mode,
            primary_provider: self.primary,
            providers: self
                .providers
                .values()
                .map(|p| ProviderInfo {
                    kind: p.kind(),
                    status: p.status(),
                    model: p.config().model.clone(),
                    endpoint: p.config().endpoint.clone(),
                    last_error: p.last_error(),
                })
                .collect(),
            strict_mode: self.sanitizer.config().strict_mode,
        }
    }

    /// Shuts down every provider and clears the registry.
    pub async fn shutdown(&mut self) {
        for provider in self.providers.values_mut() {
            provider.shutdown().await;
        }
        self.providers.clear();
        self.primary = None;
    }

    fn check_policy(&self, kind: ProviderKind) -> Result<()> {
        if self.deployment_mode == DeploymentMode::Airgap && !kind.is_local() {
            warn!(provider = %kind, "rejected by air-gap policy");
            return Err(DaxGateError::PolicyViolation {
                provider: kind,
                mode: self.deployment_mode.to_string(),
            });
        }
        Ok(())
    }

    fn ready_primary(&self) -> Result<&dyn LlmProvider> {
        self.primary
            .and_then(|kind| self.providers.get(&kind))
            .map(|provider| &**provider)
            .filter(|p| p.status() == ProviderStatus::Ready)
            .ok_or(DaxGateError::NoProviderAvailable)
    }

    fn audit_append(&self, event: NewEvent) -> Result<()> {
        match self.audit.append(event) {
            Ok(_) => Ok(()),
            Err(audit_error) if self.fail_closed_on_audit_error => Err(audit_error),
            Err(audit_error) => {
                error!(%audit_error, "audit append failed, proceeding per configuration");
                Ok(())
            }
        }
    }
}

/// Creates a router configured for air-gapped deployment: strict data
/// boundary, localhost-only Ollama, endpoint validation on.
///
/// # Errors
/// Propagates provider initialization failures; an air-gap router with
/// no working local provider is not returned.
pub async fn create_airgap_router(
    ollama_endpoint: &str,
    model: &str,
    audit: Arc<AuditLog>,
) -> Result<LlmRouter> {
    let sanitizer = SchemaSanitizer::new(BoundaryConfig::default());
    let mut router = LlmRouter::new(DeploymentMode::Airgap, sanitizer, audit);

    router
        .initialize_provider(ProviderSetup::Ollama(ollama_config(ollama_endpoint, model)))
        .await?;
    Ok(router)
}
