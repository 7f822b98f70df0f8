//! Installation backends and the invoker contract.
//!
//! A `Backend` describes one concrete installation mechanism (a distribution
//! manager, a generic installer, the same installer in unconstrained mode).
//! The resolver never runs anything itself; it hands a backend and a list of
//! identifiers to a `BackendInvoker` and records what comes back.

use crate::error::BackendUnavailable;
use crate::package::normalize_identifier;
use std::collections::HashSet;
use std::time::Duration;

/// Default wall-clock budget for a single invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Which identifiers a backend knows how to handle.
///
/// Built once when the resolver is constructed; `accepts` is pure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Universally capable
    Any,
    /// Accepts identifiers whose normalized form is in the set
    Only(HashSet<String>),
}

impl Capability {
    /// Capability restricted to `identifiers`, normalized
    pub fn only<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Only(
            identifiers
                .into_iter()
                .map(|s| normalize_identifier(s.as_ref()))
                .collect(),
        )
    }

    pub fn accepts(&self, identifier: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => set.contains(&normalize_identifier(identifier)),
        }
    }

    pub fn is_universal(&self) -> bool {
        matches!(self, Self::Any)
    }
}

/// One installation backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Identifier used in attempt records, e.g. `conda`, `pip`
    pub id: String,
    /// Lower ranks are tried first
    pub rank: u32,
    pub capability: Capability,
    /// Unconstrained/elevated invocation mode; always tried after every
    /// non-escalated backend regardless of rank
    pub escalated: bool,
    /// May be handed a whole group in one call
    pub bulk: bool,
    /// Wall-clock budget enforced by the invoker
    pub timeout: Duration,
}

impl Backend {
    pub fn new(id: impl Into<String>, rank: u32, capability: Capability) -> Self {
        Self {
            id: id.into(),
            rank,
            capability,
            escalated: false,
            bulk: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Mark as the unconstrained variant of an installer
    pub fn escalated(mut self) -> Self {
        self.escalated = true;
        self
    }

    /// Exclude from group bulk installs
    pub fn without_bulk(mut self) -> Self {
        self.bulk = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn accepts(&self, identifier: &str) -> bool {
        self.capability.accepts(identifier)
    }

    /// Sort key: non-escalated first, then rank
    pub(crate) fn priority(&self) -> (bool, u32) {
        (self.escalated, self.rank)
    }
}

/// What a backend reported for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub success: bool,
    /// Opaque text kept for audit and reporting only
    pub diagnostic: String,
}

impl Invocation {
    pub fn success(diagnostic: impl Into<String>) -> Self {
        Self {
            success: true,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn failure(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Executes install requests against a backend.
///
/// # Contract
///
/// - `packages` is never empty and is passed in the resolver's order.
/// - A call that exceeds `backend.timeout` is reported as a failed
///   `Invocation`, not as an error.
/// - `Err(BackendUnavailable)` means the backend cannot be reached at all;
///   the resolver will not call it again during the run.
pub trait BackendInvoker {
    fn invoke(
        &mut self,
        backend: &Backend,
        packages: &[String],
    ) -> Result<Invocation, BackendUnavailable>;
}

impl<T: BackendInvoker + ?Sized> BackendInvoker for Box<T> {
    fn invoke(
        &mut self,
        backend: &Backend,
        packages: &[String],
    ) -> Result<Invocation, BackendUnavailable> {
        (**self).invoke(backend, packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_only_matches_normalized() {
        let cap = Capability::only(["scikit-learn", "numpy", "Pillow"]);
        assert!(cap.accepts("scikit_learn"));
        assert!(cap.accepts("SciKit-Learn"));
        assert!(cap.accepts("pillow"));
        assert!(!cap.accepts("torch"));
        assert!(!cap.is_universal());
    }

    #[test]
    fn test_capability_any() {
        assert!(Capability::Any.accepts("anything-at-all"));
        assert!(Capability::Any.is_universal());
    }

    #[test]
    fn test_escalated_sorts_after_higher_rank() {
        let unconstrained = Backend::new("pip-unconstrained", 0, Capability::Any).escalated();
        let pip = Backend::new("pip", 5, Capability::Any);
        assert!(pip.priority() < unconstrained.priority());
    }

    #[test]
    fn test_backend_defaults() {
        let backend = Backend::new("conda", 0, Capability::Any);
        assert!(backend.bulk);
        assert!(!backend.escalated);
        assert_eq!(backend.timeout, DEFAULT_TIMEOUT);
        assert!(!backend.without_bulk().bulk);
    }
}
