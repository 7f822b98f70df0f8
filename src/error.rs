//! Error handling module for the provisioning resolver
//!
//! Provides the error taxonomy used across the crate. Only configuration
//! errors and operator interrupts ever abort a run; everything below the run
//! driver is recovered locally and folded into ledger entries.

use thiserror::Error;

/// Main error type for the provisioning resolver
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Malformed request, policy or configuration (fatal, aborts before any attempt)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The run was cancelled by the operator before every request was resolved
    #[error("Run interrupted with {} request(s) pending", pending.len())]
    Interrupted {
        /// Identifiers that never received an outcome
        pending: Vec<String>,
    },

    /// IO errors (configuration, outcome and report files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an interrupt error carrying the identifiers left unresolved
    pub fn interrupted(pending: Vec<String>) -> Self {
        Self::Interrupted { pending }
    }

    /// Whether this error came from an operator interrupt
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

/// A declared backend could not be reached at all.
///
/// Returned by invokers. The resolver records it as a failed attempt and
/// never invokes that backend again for the rest of the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("backend '{backend}' is unavailable: {reason}")]
pub struct BackendUnavailable {
    pub backend: String,
    pub reason: String,
}

impl BackendUnavailable {
    pub fn new(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            reason: reason.into(),
        }
    }
}

/// A fallback or auxiliary chain re-entered an identifier already being resolved.
///
/// Never propagated: logged distinctly and classified like a failed attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cycle detected resolving '{identifier}' (chain: {})", chain.join(" -> "))]
pub struct CycleDetected {
    pub identifier: String,
    pub chain: Vec<String>,
}
