//! Trust-boundary core for daxgate.
//!
//! This crate mediates between a business-intelligence model (tables,
//! columns, measures) and LLM backends that must never see the underlying
//! data. It enforces a one-way, metadata-only information flow, records
//! every boundary crossing in a cryptographically chained audit trail,
//! and routes generation requests across interchangeable backends with
//! uniform retry, timeout, and failover behavior.
//!
//! # Security Guarantees
//! - Only schema metadata (names, types, formula text) ever reaches an
//!   LLM; cell values never cross the boundary
//! - Every LLM call passes through the schema sanitizer, and every
//!   sanitizer decision and LLM call is durably audited
//! - Audit segments are hash-chained and optionally HMAC-signed, so
//!   tampering is detectable after the fact
//! - Endpoint allow-listing is enforced before any network call, making
//!   air-gap deployment a provable property
//!
//! # Architecture
//! Dependency order, leaf to root: schema model → sanitizer → audit log →
//! provider contract → router. The router is the only component the rest
//! of the application calls directly, and it is explicitly constructed
//! and passed; there are no process-wide singletons.

pub mod audit;
pub mod boundary;
pub mod error;
pub mod logging;
pub mod models;
pub mod provider;
pub mod providers;
pub mod router;

// Re-export commonly used types
pub use audit::{
    AuditConfig, AuditEvent, AuditEventKind, AuditLog, AuditSeverity, IntegrityReport, NewEvent,
    verify_segment,
};
pub use boundary::{BoundaryConfig, Sanitized, SchemaSanitizer, Violation, ViolationKind};
pub use error::{DaxGateError, Result};
pub use logging::init_logging;
pub use models::{ColumnMeta, MeasureMeta, RelationshipMeta, Schema, TableMeta};
pub use provider::{
    LlmConfig, LlmProvider, LlmRequest, LlmResponse, ProviderKind, ProviderStatus,
};
pub use router::{DeploymentMode, LlmRouter, ProviderSetup, RouterStatus, create_airgap_router};
