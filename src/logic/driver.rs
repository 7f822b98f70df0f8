//! Run driver
//!
//! Walks the configured groups in order, hands each one to the resolver and
//! owns the run's `RunLedger`. Cancellation is checked between groups; the
//! resolver checks it between requests and attempts. Whatever was not reached
//! is recorded as pending so the summary can account for every request.

use crate::error::{ProvisionError, Result};
use crate::ledger::{RunLedger, RunSummary};
use crate::logic::resolver::Resolver;
use crate::backend::BackendInvoker;
use crate::package::{PackageGroup, PackageRequest};
use crate::signals::CancelToken;
use crate::types::RunMode;
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Default success rate (percent) at which an environment counts as ready
pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 70.0;

/// Sequential, group-by-group provisioning run
pub struct RunDriver<I> {
    resolver: Resolver<I>,
    groups: Vec<PackageGroup>,
    mode: RunMode,
    success_threshold: f64,
    cancel: CancelToken,
}

impl<I: BackendInvoker> RunDriver<I> {
    pub fn new(resolver: Resolver<I>, groups: Vec<PackageGroup>) -> Self {
        Self {
            resolver,
            groups,
            mode: RunMode::default(),
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Percentage reported as "ready"; never affects the exit code
    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Share `token` with the resolver so both observe the same interrupt
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.resolver = self.resolver.with_cancel_token(token.clone());
        self.cancel = token;
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn groups(&self) -> &[PackageGroup] {
        &self.groups
    }

    /// Every request in processing order
    pub fn requests(&self) -> impl Iterator<Item = &PackageRequest> {
        self.groups.iter().flat_map(|g| g.requests.iter())
    }

    pub fn resolver(&self) -> &Resolver<I> {
        &self.resolver
    }

    pub fn into_resolver(self) -> Resolver<I> {
        self.resolver
    }

    /// Reject blank or repeated identifiers across every group.
    ///
    /// Runs before the first attempt so a bad request in a late group cannot
    /// abort a run that has already installed packages.
    pub fn validate_requests(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for group in &self.groups {
            for request in &group.requests {
                if request.identifier.trim().is_empty() {
                    return Err(ProvisionError::configuration(format!(
                        "empty package identifier in group '{}'",
                        group.name
                    )));
                }
                if !seen.insert(request.identifier.as_str()) {
                    return Err(ProvisionError::configuration(format!(
                        "package '{}' is requested twice (again in group '{}')",
                        request.identifier, group.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve every group and return the completed ledger.
    ///
    /// Only configuration errors abort the run, and they are all found before
    /// any backend is invoked. An interrupt ends the run early with the
    /// unreached requests listed as pending.
    pub fn run(&mut self) -> Result<RunLedger> {
        self.validate_requests()?;

        let mut ledger = RunLedger::new();
        info!(
            "Provisioning {} packages in {} groups ({} mode)",
            self.requests().count(),
            self.groups.len(),
            self.mode
        );

        for (position, group) in self.groups.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Run cancelled before group {}", group.name);
                ledger.mark_pending(self.groups[position..].iter().flat_map(|g| g.identifiers()));
                break;
            }

            let fragment = self.resolver.resolve_group(group)?;
            let interrupted = fragment.is_interrupted();
            ledger.merge(fragment)?;

            if interrupted {
                ledger.mark_pending(
                    self.groups[position + 1..]
                        .iter()
                        .flat_map(|g| g.identifiers()),
                );
                break;
            }
        }

        Ok(ledger)
    }

    /// Summarize `ledger` and log whether the environment is ready
    pub fn summarize(&self, ledger: &RunLedger) -> RunSummary {
        let summary = ledger.summary(self.mode);
        let rate = summary.success_rate();

        for identifier in &summary.failed_critical {
            error!("Critical package failed: {}", identifier);
        }
        if !summary.failed_tolerated.is_empty() {
            warn!(
                "Tolerated failures: {}",
                summary.failed_tolerated.join(", ")
            );
        }

        if ledger.is_interrupted() {
            warn!(
                "Run interrupted: {} package(s) stopped mid-resolution, {} not attempted",
                summary.interrupted.len(),
                summary.pending.len()
            );
        } else if summary.meets_threshold(self.success_threshold) {
            info!("Environment ready ({:.1}% of packages installed)", rate);
        } else {
            warn!(
                "Environment partially ready ({:.1}% installed, below {:.0}%)",
                rate, self.success_threshold
            );
        }

        summary
    }
}
