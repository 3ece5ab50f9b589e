//! Security module for Wayfarer: domain scoping, sensitive data, and audit logging.
//!
//! Provides:
//! - **Domain policy**: Which hosts navigation and scoped actions may reach
//! - **Sensitive data**: `<secret>name</secret>` substitution and redaction
//! - **Audit logging**: Structured security event logging

pub mod audit;
pub mod domain;
pub mod sensitive;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use domain::{DomainCheck, DomainPolicy, host_of};
pub use sensitive::SensitiveData;
