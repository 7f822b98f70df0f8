//! Run ledger and reporter.
//!
//! The ledger is owned by the run driver and only ever appended to, one
//! completed `PackageOutcome` at a time. `RunSummary` condenses it into the
//! counts, failing identifiers and exit disposition shown to the operator.

use crate::error::{ProvisionError, Result};
use crate::types::{AttemptOutcome, InstallStatus, RunMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Exit code for an operator-interrupted run (128 + SIGINT)
pub const EXIT_INTERRUPTED: i32 = 130;

/// What a single attempt tried to install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptTarget {
    Package { identifier: String },
    /// One bulk call covering a whole group
    Group { name: String, packages: Vec<String> },
}

impl fmt::Display for AttemptTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package { identifier } => write!(f, "{}", identifier),
            Self::Group { name, packages } => write!(f, "{} [{}]", name, packages.join(", ")),
        }
    }
}

/// One backend invocation in an audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub target: AttemptTarget,
    pub backend: String,
    pub outcome: AttemptOutcome,
    pub diagnostic: String,
}

impl AttemptRecord {
    pub fn package(
        identifier: impl Into<String>,
        backend: impl Into<String>,
        outcome: AttemptOutcome,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self {
            target: AttemptTarget::Package {
                identifier: identifier.into(),
            },
            backend: backend.into(),
            outcome,
            diagnostic: diagnostic.into(),
        }
    }

    /// Identifier for single-package attempts, `None` for bulk attempts
    pub fn identifier(&self) -> Option<&str> {
        match &self.target {
            AttemptTarget::Package { identifier } => Some(identifier),
            AttemptTarget::Group { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Final classification of one request plus its audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOutcome {
    pub identifier: String,
    pub group: String,
    pub critical: bool,
    pub status: InstallStatus,
    pub attempts: Vec<AttemptRecord>,
    /// Resolution was cut short by an interrupt after at least one attempt
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
}

/// Ordered identifier → outcome mapping for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunLedger {
    outcomes: Vec<PackageOutcome>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    /// Requests never resolved because the run was interrupted
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pending: Vec<String>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed outcome.
    ///
    /// Each identifier may appear once; a second append is a configuration
    /// error (request construction deduplicates identifiers).
    pub fn record(&mut self, outcome: PackageOutcome) -> Result<()> {
        if self.index.contains_key(&outcome.identifier) {
            return Err(ProvisionError::configuration(format!(
                "package '{}' was resolved twice in one run",
                outcome.identifier
            )));
        }
        self.index
            .insert(outcome.identifier.clone(), self.outcomes.len());
        self.outcomes.push(outcome);
        Ok(())
    }

    pub fn extend(&mut self, outcomes: impl IntoIterator<Item = PackageOutcome>) -> Result<()> {
        for outcome in outcomes {
            self.record(outcome)?;
        }
        Ok(())
    }

    /// Fold a fragment produced by `Resolver::resolve_group` into this ledger
    pub fn merge(&mut self, fragment: RunLedger) -> Result<()> {
        self.extend(fragment.outcomes)?;
        self.pending.extend(fragment.pending);
        Ok(())
    }

    pub fn mark_pending(&mut self, identifiers: impl IntoIterator<Item = String>) {
        self.pending.extend(identifiers);
    }

    pub fn get(&self, identifier: &str) -> Option<&PackageOutcome> {
        self.index.get(identifier).map(|&i| &self.outcomes[i])
    }

    /// Outcomes in processing order
    pub fn outcomes(&self) -> &[PackageOutcome] {
        &self.outcomes
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Whether an interrupt left requests pending or cut one short
    pub fn is_interrupted(&self) -> bool {
        !self.pending.is_empty() || self.outcomes.iter().any(|o| o.interrupted)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    fn identifiers_with(&self, status: InstallStatus) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.status == status)
            .map(|o| o.identifier.clone())
            .collect()
    }

    /// Build the operator-facing summary
    pub fn summary(&self, mode: RunMode) -> RunSummary {
        let count = |status: InstallStatus| self.outcomes.iter().filter(|o| o.status == status).count();
        let installed_direct = count(InstallStatus::InstalledDirect);
        let installed_via_fallback = count(InstallStatus::InstalledViaFallback);
        let critical_failures = self
            .outcomes
            .iter()
            .filter(|o| o.critical && o.status == InstallStatus::FailedCritical)
            .count();

        let exit_code = if self.is_interrupted() {
            EXIT_INTERRUPTED
        } else {
            match mode {
                RunMode::Strict if critical_failures > 0 => 1,
                _ => 0,
            }
        };

        RunSummary {
            mode,
            total: self.outcomes.len() + self.pending.len(),
            successful: installed_direct + installed_via_fallback,
            installed_direct,
            installed_via_fallback,
            failed_critical: self.identifiers_with(InstallStatus::FailedCritical),
            failed_tolerated: self.identifiers_with(InstallStatus::FailedTolerated),
            interrupted: self
                .outcomes
                .iter()
                .filter(|o| o.interrupted)
                .map(|o| o.identifier.clone())
                .collect(),
            pending: self.pending.clone(),
            exit_code,
        }
    }
}

/// Counts, failing identifiers and exit disposition of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: RunMode,
    /// Requests submitted, including any left pending by an interrupt
    pub total: usize,
    /// `installed_direct + installed_via_fallback`
    pub successful: usize,
    pub installed_direct: usize,
    pub installed_via_fallback: usize,
    pub failed_critical: Vec<String>,
    pub failed_tolerated: Vec<String>,
    /// Attempted, then stopped by the interrupt before a final answer
    #[serde(default)]
    pub interrupted: Vec<String>,
    pub pending: Vec<String>,
    pub exit_code: i32,
}

impl RunSummary {
    /// Percentage of submitted requests that ended installed
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 * 100.0 / self.total as f64
        }
    }

    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.success_rate() >= threshold
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Installation complete: {}/{} packages successful ({:.1}%)",
            self.successful,
            self.total,
            self.success_rate()
        )?;
        writeln!(
            f,
            "  installed directly: {}, via fallback: {}",
            self.installed_direct, self.installed_via_fallback
        )?;
        if !self.failed_critical.is_empty() {
            writeln!(f, "  failed (critical): {}", self.failed_critical.join(", "))?;
        }
        if !self.failed_tolerated.is_empty() {
            writeln!(f, "  failed (tolerated): {}", self.failed_tolerated.join(", "))?;
        }
        if !self.interrupted.is_empty() {
            writeln!(f, "  stopped mid-resolution: {}", self.interrupted.join(", "))?;
        }
        if !self.pending.is_empty() {
            writeln!(f, "  not attempted (interrupted): {}", self.pending.join(", "))?;
        }
        write!(f, "  mode: {}, exit code: {}", self.mode, self.exit_code)
    }
}

/// Machine-readable record of a finished run
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub summary: &'a RunSummary,
    pub ledger: &'a RunLedger,
}

impl<'a> RunReport<'a> {
    pub fn new(summary: &'a RunSummary, ledger: &'a RunLedger) -> Self {
        Self { summary, ledger }
    }

    /// Write the report as pretty-printed JSON
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(identifier: &str, critical: bool, status: InstallStatus) -> PackageOutcome {
        PackageOutcome {
            identifier: identifier.to_string(),
            group: "core".to_string(),
            critical,
            status,
            attempts: Vec::new(),
            interrupted: false,
        }
    }

    #[test]
    fn test_record_preserves_order_and_lookup() {
        let mut ledger = RunLedger::new();
        ledger
            .record(outcome("numpy", true, InstallStatus::InstalledDirect))
            .unwrap();
        ledger
            .record(outcome("gymnasium", false, InstallStatus::InstalledViaFallback))
            .unwrap();

        let ids: Vec<_> = ledger.outcomes().iter().map(|o| o.identifier.as_str()).collect();
        assert_eq!(ids, vec!["numpy", "gymnasium"]);
        assert_eq!(
            ledger.get("gymnasium").unwrap().status,
            InstallStatus::InstalledViaFallback
        );
        assert!(ledger.get("torch").is_none());
    }

    #[test]
    fn test_record_rejects_duplicate() {
        let mut ledger = RunLedger::new();
        ledger
            .record(outcome("numpy", true, InstallStatus::InstalledDirect))
            .unwrap();
        let err = ledger
            .record(outcome("numpy", true, InstallStatus::FailedCritical))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Configuration(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_merge_keeps_order_and_pending() {
        let mut ledger = RunLedger::new();
        ledger
            .record(outcome("numpy", true, InstallStatus::InstalledDirect))
            .unwrap();

        let mut fragment = RunLedger::new();
        fragment
            .record(outcome("torch", false, InstallStatus::FailedTolerated))
            .unwrap();
        fragment.mark_pending(vec!["keras".to_string()]);
        ledger.merge(fragment).unwrap();

        let ids: Vec<_> = ledger.outcomes().iter().map(|o| o.identifier.as_str()).collect();
        assert_eq!(ids, vec!["numpy", "torch"]);
        assert_eq!(ledger.pending(), ["keras"]);
        assert!(ledger.get("torch").is_some());

        let mut duplicate = RunLedger::new();
        duplicate
            .record(outcome("numpy", true, InstallStatus::InstalledDirect))
            .unwrap();
        assert!(ledger.merge(duplicate).is_err());
    }

    #[test]
    fn test_strict_exit_only_for_intrinsically_critical() {
        let mut ledger = RunLedger::new();
        ledger
            .record(outcome("dgl", false, InstallStatus::FailedTolerated))
            .unwrap();
        // FailedCritical on a request that is not intrinsically critical
        ledger
            .record(outcome("wandb", false, InstallStatus::FailedCritical))
            .unwrap();
        assert_eq!(ledger.summary(RunMode::Strict).exit_code, 0);

        ledger
            .record(outcome("numpy", true, InstallStatus::FailedCritical))
            .unwrap();
        let summary = ledger.summary(RunMode::Strict);
        assert_eq!(summary.exit_code, 1);
        assert_eq!(summary.failed_critical, vec!["wandb", "numpy"]);
        assert_eq!(summary.failed_tolerated, vec!["dgl"]);
    }

    #[test]
    fn test_best_effort_always_zero() {
        let mut ledger = RunLedger::new();
        ledger
            .record(outcome("numpy", true, InstallStatus::FailedCritical))
            .unwrap();
        assert_eq!(ledger.summary(RunMode::BestEffort).exit_code, 0);
    }

    #[test]
    fn test_interrupted_summary() {
        let mut ledger = RunLedger::new();
        ledger
            .record(outcome("numpy", true, InstallStatus::InstalledDirect))
            .unwrap();
        ledger.mark_pending(vec!["pandas".to_string(), "scipy".to_string()]);

        let summary = ledger.summary(RunMode::BestEffort);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.exit_code, EXIT_INTERRUPTED);
        assert!(summary.to_string().contains("not attempted (interrupted): pandas, scipy"));
    }

    #[test]
    fn test_outcome_cut_short_counts_as_interrupted() {
        let mut ledger = RunLedger::new();
        let mut librosa = outcome("librosa", true, InstallStatus::FailedCritical);
        librosa.attempts.push(AttemptRecord::package(
            "soundfile",
            "pip",
            AttemptOutcome::Success,
            "installed",
        ));
        librosa.interrupted = true;
        ledger.record(librosa).unwrap();

        assert!(ledger.pending().is_empty());
        assert!(ledger.is_interrupted());
        let summary = ledger.summary(RunMode::Strict);
        assert_eq!(summary.exit_code, EXIT_INTERRUPTED);
        assert_eq!(summary.interrupted, vec!["librosa"]);
        let text = summary.to_string();
        assert!(text.contains("stopped mid-resolution: librosa"));
        assert!(!text.contains("not attempted"));
    }

    #[test]
    fn test_success_rate_and_threshold() {
        let mut ledger = RunLedger::new();
        for (i, status) in [
            InstallStatus::InstalledDirect,
            InstallStatus::InstalledViaFallback,
            InstallStatus::InstalledDirect,
            InstallStatus::FailedTolerated,
        ]
        .into_iter()
        .enumerate()
        {
            ledger.record(outcome(&format!("pkg{}", i), false, status)).unwrap();
        }
        let summary = ledger.summary(RunMode::Strict);
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.installed_via_fallback, 1);
        assert!((summary.success_rate() - 75.0).abs() < f64::EPSILON);
        assert!(summary.meets_threshold(70.0));
        assert!(!summary.meets_threshold(80.0));
    }

    #[test]
    fn test_empty_ledger_rate_is_zero() {
        let summary = RunLedger::new().summary(RunMode::Strict);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate(), 0.0);
        assert_eq!(summary.exit_code, 0);
    }

    #[test]
    fn test_attempt_target_display() {
        let record = AttemptRecord::package("numpy", "conda", AttemptOutcome::Success, "");
        assert_eq!(record.identifier(), Some("numpy"));
        let group = AttemptTarget::Group {
            name: "core_ml".into(),
            packages: vec!["numpy".into(), "pandas".into()],
        };
        assert_eq!(group.to_string(), "core_ml [numpy, pandas]");
    }

    #[test]
    fn test_report_written_as_json() {
        let mut ledger = RunLedger::new();
        ledger
            .record(outcome("numpy", true, InstallStatus::InstalledDirect))
            .unwrap();
        let summary = ledger.summary(RunMode::Strict);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        RunReport::new(&summary, &ledger).write_to_file(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["successful"], 1);
        assert_eq!(value["ledger"]["outcomes"][0]["status"], "installed_direct");
        assert!(value["ledger"].get("pending").is_none());
    }
}
