//! Type-safe enums shared by the resolver, ledger and configuration.
//!
//! Statuses and modes are proper Rust enums rather than strings so that
//! classification is checked exhaustively and reports round-trip cleanly.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// How the run's exit disposition treats critical failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Non-zero exit when an intrinsically critical package ends `FailedCritical`
    #[default]
    #[strum(serialize = "strict")]
    Strict,
    /// Always exit zero (graceful degradation)
    #[strum(serialize = "best-effort")]
    BestEffort,
}

/// Final classification of one package request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InstallStatus {
    /// A candidate backend installed the requested identifier
    InstalledDirect,
    /// The requested identifier failed everywhere but its fallback installed
    InstalledViaFallback,
    /// Installation failed, but the failure is non-fatal
    FailedTolerated,
    /// Installation failed and the failure is not tolerated
    FailedCritical,
}

impl InstallStatus {
    /// Returns true for both installed variants
    #[inline]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::InstalledDirect | Self::InstalledViaFallback)
    }

    /// Classify a failure given the effective tolerance
    #[inline]
    pub const fn failure(tolerated: bool) -> Self {
        if tolerated {
            Self::FailedTolerated
        } else {
            Self::FailedCritical
        }
    }
}

/// Result of a single backend invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

impl AttemptOutcome {
    #[inline]
    pub const fn from_success(success: bool) -> Self {
        if success { Self::Success } else { Self::Failure }
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// How a configured backend decides which identifiers it accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CapabilityKind {
    /// Every identifier
    #[default]
    Any,
    /// Identifiers in the configuration's `preferred_packages`
    Preferred,
    /// Identifiers in the backend's own `packages` list
    Only,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_run_mode_strings() {
        assert_eq!(RunMode::Strict.to_string(), "strict");
        assert_eq!(RunMode::BestEffort.to_string(), "best-effort");
        assert_eq!(RunMode::from_str("best-effort").unwrap(), RunMode::BestEffort);
        assert!(RunMode::from_str("lenient").is_err());
    }

    #[test]
    fn test_run_mode_serde_matches_display() {
        for mode in RunMode::iter() {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode));
        }
    }

    #[test]
    fn test_install_status_success_split() {
        let successes: Vec<_> = InstallStatus::iter().filter(|s| s.is_success()).collect();
        assert_eq!(
            successes,
            vec![InstallStatus::InstalledDirect, InstallStatus::InstalledViaFallback]
        );
        assert_eq!(InstallStatus::failure(true), InstallStatus::FailedTolerated);
        assert_eq!(InstallStatus::failure(false), InstallStatus::FailedCritical);
    }

    #[test]
    fn test_install_status_display() {
        assert_eq!(InstallStatus::InstalledViaFallback.to_string(), "installed_via_fallback");
        assert_eq!(
            serde_json::to_string(&InstallStatus::FailedCritical).unwrap(),
            "\"failed_critical\""
        );
    }

    #[test]
    fn test_attempt_outcome() {
        assert_eq!(AttemptOutcome::from_success(true), AttemptOutcome::Success);
        assert!(!AttemptOutcome::from_success(false).is_success());
        assert_eq!(AttemptOutcome::Failure.to_string(), "failure");
    }

    #[test]
    fn test_capability_kind_parse() {
        assert_eq!(CapabilityKind::default(), CapabilityKind::Any);
        assert_eq!(CapabilityKind::from_str("preferred").unwrap(), CapabilityKind::Preferred);
        let kind: CapabilityKind = serde_json::from_str("\"only\"").unwrap();
        assert_eq!(kind, CapabilityKind::Only);
    }
}
