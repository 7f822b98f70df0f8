//! Per-package policy overrides.
//!
//! A `PolicyRule` never influences which backends are tried or in what order;
//! it only governs auxiliary installs, fallback substitution and whether a
//! final failure is tolerated.

use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Override rule for a single package identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyRule {
    /// Differently-named package to resolve once every candidate backend has failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    /// Packages installed best-effort, in order, before the primary attempt
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub auxiliary_dependencies: Vec<String>,
    /// Record a final failure as non-fatal; `None` defers to the run default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerate_failure: Option<bool>,
}

impl PolicyRule {
    pub fn with_fallback(fallback: impl Into<String>) -> Self {
        Self {
            fallback: Some(fallback.into()),
            ..Self::default()
        }
    }

    pub fn tolerated() -> Self {
        Self {
            tolerate_failure: Some(true),
            ..Self::default()
        }
    }

    pub fn with_dependencies<I, S>(deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            auxiliary_dependencies: deps.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Read-only lookup from package identifier to override rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyTable {
    rules: HashMap<String, PolicyRule>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the rule for `identifier`
    pub fn insert(&mut self, identifier: impl Into<String>, rule: PolicyRule) {
        self.rules.insert(identifier.into(), rule);
    }

    /// Builder-style `insert`
    pub fn with(mut self, identifier: impl Into<String>, rule: PolicyRule) -> Self {
        self.insert(identifier, rule);
        self
    }

    pub fn lookup(&self, identifier: &str) -> Option<&PolicyRule> {
        self.rules.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Effective tolerance for `identifier` given the caller's default
    pub fn tolerates(&self, identifier: &str, default: bool) -> bool {
        self.lookup(identifier)
            .and_then(|rule| rule.tolerate_failure)
            .unwrap_or(default)
    }

    /// Reject rules that would make the resolver attempt an empty install.
    ///
    /// Fallback cycles longer than a self-reference are legal here; the
    /// resolver detects them per call.
    pub fn validate(&self) -> Result<()> {
        for (identifier, rule) in &self.rules {
            if identifier.trim().is_empty() {
                return Err(ProvisionError::configuration(
                    "policy rule keyed by an empty identifier",
                ));
            }
            if let Some(fallback) = &rule.fallback {
                if fallback.trim().is_empty() {
                    return Err(ProvisionError::configuration(format!(
                        "policy rule for '{}' has an empty fallback",
                        identifier
                    )));
                }
                if fallback == identifier {
                    return Err(ProvisionError::configuration(format!(
                        "policy rule for '{}' falls back to itself",
                        identifier
                    )));
                }
            }
            if rule.auxiliary_dependencies.iter().any(|d| d.trim().is_empty()) {
                return Err(ProvisionError::configuration(format!(
                    "policy rule for '{}' lists an empty auxiliary dependency",
                    identifier
                )));
            }
        }
        Ok(())
    }
}
