//! Error types for the trust-boundary subsystem.
//!
//! Every failure mode that crosses a component boundary is a named variant
//! here, so that policy code (fail closed on a boundary violation, never
//! retry a policy violation) is enforced by matching on the type rather
//! than by remembering to catch the right exception class.

use thiserror::Error;

use crate::boundary::Violation;
use crate::provider::ProviderKind;

/// Main error type for daxgate operations.
///
/// # Security
/// Error messages never contain schema descriptions, measure expressions,
/// or any other text that the sanitizer has not already cleared. Variants
/// carry enough structured context (provider kind, request id, recoverable
/// flag) for the calling layer to render an actionable message.
#[derive(Debug, Error)]
pub enum DaxGateError {
    /// The sanitizer detected a potential data leak in strict mode.
    ///
    /// Always surfaced to the caller; the router must not attempt the
    /// provider call when this is returned.
    #[error("data boundary violation: {} issue(s) detected", violations.len())]
    BoundaryViolation {
        /// Every violation found during the sanitization pass.
        violations: Vec<Violation>,
    },

    /// Deployment-mode policy forbids this provider kind. Fatal, not retried.
    #[error("deployment mode '{mode}' does not permit provider '{provider}'")]
    PolicyViolation {
        provider: ProviderKind,
        mode: String,
    },

    /// A prompt matched a data-return SQL/DAX fragment at request
    /// construction time.
    #[error("request rejected: prompt contains dangerous pattern '{pattern}'")]
    RequestValidation { pattern: String },

    /// Network-level failure reaching a provider. Connection refusal is
    /// reported immediately and never retried.
    #[error("cannot reach {provider}: {context}")]
    ProviderConnection {
        provider: ProviderKind,
        context: String,
        request_id: Option<String>,
    },

    /// Raised after the per-provider retry budget is exhausted.
    #[error("{provider} request timed out after {attempts} attempt(s)")]
    ProviderTimeout {
        provider: ProviderKind,
        attempts: u32,
        request_id: Option<String>,
    },

    /// Non-2xx or malformed response from a reachable provider.
    #[error("{provider} error: {context}")]
    Provider {
        provider: ProviderKind,
        context: String,
        request_id: Option<String>,
    },

    /// The router has no initialized provider in the Ready state.
    #[error("no LLM provider available")]
    NoProviderAvailable,

    /// The audit subsystem failed to durably record an event.
    ///
    /// Callers in compliance-sensitive deployments should prefer failing
    /// the request over serving an un-audited LLM response.
    #[error("audit log failure: {context}")]
    Audit {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration or validation error.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

/// Convenience type alias for Results with `DaxGateError`.
pub type Result<T> = std::result::Result<T, DaxGateError>;

impl DaxGateError {
    /// Whether the failure is transient and eligible for retry.
    ///
    /// Encodes the propagation policy: only timeout-class provider
    /// failures are retryable. Boundary and policy violations are never
    /// retried, and a refused connection means the service is down.
    pub fn recoverable(&self) -> bool {
        matches!(self, Self::ProviderTimeout { .. })
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a provider connection error.
    pub fn connection(
        provider: ProviderKind,
        context: impl Into<String>,
        request_id: Option<String>,
    ) -> Self {
        Self::ProviderConnection {
            provider,
            context: context.into(),
            request_id,
        }
    }

    /// Creates a provider-level error (reachable backend, bad response).
    pub fn provider(
        provider: ProviderKind,
        context: impl Into<String>,
        request_id: Option<String>,
    ) -> Self {
        Self::Provider {
            provider,
            context: context.into(),
            request_id,
        }
    }

    /// Creates an audit failure from an I/O error.
    pub fn audit(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Audit {
            context: context.into(),
            source,
        }
    }

    /// Creates a serialization error with context.
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let timeout = DaxGateError::ProviderTimeout {
            provider: ProviderKind::Ollama,
            attempts: 3,
            request_id: None,
        };
        assert!(timeout.recoverable());

        let refused = DaxGateError::connection(ProviderKind::Ollama, "connection refused", None);
        assert!(!refused.recoverable());

        let policy = DaxGateError::PolicyViolation {
            provider: ProviderKind::AzureOpenAi,
            mode: "airgap".to_string(),
        };
        assert!(!policy.recoverable());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let error = DaxGateError::configuration("missing endpoint");
        assert!(error.to_string().contains("missing endpoint"));

        let error = DaxGateError::ProviderTimeout {
            provider: ProviderKind::Ollama,
            attempts: 3,
            request_id: Some("req-1".to_string()),
        };
        assert!(error.to_string().contains("3 attempt"));
    }
}
