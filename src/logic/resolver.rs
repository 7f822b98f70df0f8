//! Installation Resolver
//!
//! Decides, for each package request, which backends to try and in what
//! order, drives the attempts through a `BackendInvoker`, and classifies the
//! result.
//!
//! # Resolution Rules
//!
//! | Step | Rule |
//! |------|------|
//! | 1 | Auxiliary dependencies from the policy rule, best-effort, always tolerated |
//! | 2 | Candidate backends = every backend whose capability accepts the identifier |
//! | 3 | First successful candidate ⇒ `InstalledDirect` |
//! | 4 | All candidates failed + rule fallback resolves ⇒ `InstalledViaFallback` |
//! | 5 | Otherwise `FailedTolerated` / `FailedCritical` by effective tolerance |
//!
//! Backend order is fixed at construction: non-escalated backends by rank,
//! then escalated ones by rank. Policy rules never reorder or skip backends.
//!
//! # What This Explicitly Refuses To Do
//!
//! - Retry a backend that reported itself unavailable
//! - Interleave fallback attempts with primary candidates
//! - Attempt an install with an empty identifier

use crate::backend::{Backend, BackendInvoker, Invocation};
use crate::error::{CycleDetected, ProvisionError, Result};
use crate::ledger::{AttemptRecord, AttemptTarget, PackageOutcome, RunLedger};
use crate::package::{PackageGroup, PackageRequest};
use crate::policy::PolicyTable;
use crate::signals::CancelToken;
use crate::types::{AttemptOutcome, InstallStatus};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

/// Per top-level `resolve` call state
#[derive(Debug, Default)]
struct Walk {
    /// Identifiers currently being resolved, outermost first
    path: Vec<String>,
    /// Every attempt made for this request, auxiliaries and fallbacks included,
    /// in invocation order
    attempts: Vec<AttemptRecord>,
}

/// Policy-driven installation resolver
pub struct Resolver<I> {
    backends: Vec<Backend>,
    policy: PolicyTable,
    default_tolerance: bool,
    invoker: I,
    /// Backend id → reason, for backends that reported themselves unreachable
    unavailable: HashMap<String, String>,
    cancel: CancelToken,
}

impl<I: BackendInvoker> Resolver<I> {
    /// Build a resolver over `backends` and `policy`.
    ///
    /// Fails with a configuration error when no backend is universally
    /// capable, backend ids collide, or the policy table is malformed.
    pub fn new(mut backends: Vec<Backend>, policy: PolicyTable, invoker: I) -> Result<Self> {
        if !backends.iter().any(|b| b.capability.is_universal()) {
            return Err(ProvisionError::configuration(
                "at least one backend must accept every package",
            ));
        }
        let mut seen = HashSet::new();
        for backend in &backends {
            if backend.id.trim().is_empty() {
                return Err(ProvisionError::configuration("backend with an empty id"));
            }
            if !seen.insert(backend.id.as_str()) {
                return Err(ProvisionError::configuration(format!(
                    "duplicate backend id '{}'",
                    backend.id
                )));
            }
        }
        policy.validate()?;

        // Stable: equal (escalated, rank) keeps declaration order
        backends.sort_by_key(Backend::priority);
        debug!(
            "Backend order: {}",
            backends
                .iter()
                .map(|b| b.id.as_str())
                .collect::<Vec<_>>()
                .join(" > ")
        );

        Ok(Self {
            backends,
            policy,
            default_tolerance: false,
            invoker,
            unavailable: HashMap::new(),
            cancel: CancelToken::new(),
        })
    }

    /// Tolerance applied to requests whose rule does not say otherwise
    pub fn with_default_tolerance(mut self, tolerate: bool) -> Self {
        self.default_tolerance = tolerate;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Backends in the order they are tried
    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    pub fn into_invoker(self) -> I {
        self.invoker
    }

    /// Candidate sequence for `identifier`, without invoking anything
    pub fn candidates(&self, identifier: &str) -> Vec<&Backend> {
        self.backends
            .iter()
            .filter(|b| b.accepts(identifier))
            .collect()
    }

    /// Resolve a single request to a classified outcome.
    ///
    /// Returns `Configuration` for an empty identifier and `Interrupted` when
    /// the run was cancelled before this request started. A cancellation
    /// observed after the request's first attempt ends it early instead: the
    /// outcome keeps the attempts made so far, is classified as a failure by
    /// tolerance and is flagged `interrupted`.
    pub fn resolve(&mut self, request: &PackageRequest) -> Result<PackageOutcome> {
        let identifier = request.identifier.as_str();
        if identifier.trim().is_empty() {
            return Err(ProvisionError::configuration(format!(
                "empty package identifier in group '{}'",
                request.group
            )));
        }
        if self.cancel.is_cancelled() {
            return Err(ProvisionError::interrupted(vec![identifier.to_string()]));
        }

        info!("Resolving {} (group {})", identifier, request.group);
        let tolerated = self.policy.tolerates(identifier, self.default_tolerance);
        let mut walk = Walk::default();
        let (status, interrupted) = match self.resolve_identifier(identifier, tolerated, &mut walk) {
            Ok(status) => (status, false),
            Err(err) if err.is_interrupted() && !walk.attempts.is_empty() => {
                warn!(
                    "{} interrupted after {} attempt(s)",
                    identifier,
                    walk.attempts.len()
                );
                (InstallStatus::failure(tolerated), true)
            }
            Err(err) if err.is_interrupted() => {
                return Err(ProvisionError::interrupted(vec![identifier.to_string()]));
            }
            Err(err) => return Err(err),
        };

        if !interrupted {
            match status {
                InstallStatus::InstalledDirect => info!("{} installed", identifier),
                InstallStatus::InstalledViaFallback => {
                    info!("{} installed via fallback", identifier)
                }
                InstallStatus::FailedTolerated => warn!("{} failed (tolerated)", identifier),
                InstallStatus::FailedCritical => error!("{} failed", identifier),
            }
        }

        Ok(PackageOutcome {
            identifier: identifier.to_string(),
            group: request.group.clone(),
            critical: request.critical,
            status,
            attempts: walk.attempts,
            interrupted,
        })
    }

    /// Resolve a group, trying one bulk install first when eligible.
    ///
    /// The returned ledger fragment holds one outcome per request in request
    /// order, or, after an interrupt, the outcomes so far plus the pending
    /// identifiers.
    pub fn resolve_group(&mut self, group: &PackageGroup) -> Result<RunLedger> {
        if let Some(empty) = group
            .requests
            .iter()
            .find(|r| r.identifier.trim().is_empty())
        {
            return Err(ProvisionError::configuration(format!(
                "empty package identifier in group '{}'",
                empty.group
            )));
        }

        let mut fragment = RunLedger::new();
        if group.requests.is_empty() {
            return Ok(fragment);
        }
        if self.cancel.is_cancelled() {
            fragment.mark_pending(group.identifiers());
            return Ok(fragment);
        }

        info!(
            "Installing package group: {} ({} packages)",
            group.name,
            group.requests.len()
        );

        let mut bulk_failure = None;
        if group.bulk_eligible {
            let identifiers = group.identifiers();
            if let Some(index) = self.bulk_backend(&identifiers) {
                let backend_id = self.backends[index].id.clone();
                info!("Trying {} for whole group {}", backend_id, group.name);
                let invocation = self.invoke(index, &identifiers);
                let record = AttemptRecord {
                    target: AttemptTarget::Group {
                        name: group.name.clone(),
                        packages: identifiers,
                    },
                    backend: backend_id.clone(),
                    outcome: AttemptOutcome::from_success(invocation.success),
                    diagnostic: invocation.diagnostic,
                };

                if record.is_success() {
                    info!("Group {} installed by {}", group.name, backend_id);
                    for request in &group.requests {
                        fragment.record(PackageOutcome {
                            identifier: request.identifier.clone(),
                            group: request.group.clone(),
                            critical: request.critical,
                            status: InstallStatus::InstalledDirect,
                            attempts: vec![record.clone()],
                            interrupted: false,
                        })?;
                    }
                    return Ok(fragment);
                }

                warn!(
                    "{} group installation failed for {}, trying individual packages...",
                    backend_id, group.name
                );
                bulk_failure = Some(record);
            }
        }

        for (position, request) in group.requests.iter().enumerate() {
            match self.resolve(request) {
                Ok(mut outcome) => {
                    if let Some(record) = &bulk_failure {
                        outcome.attempts.insert(0, record.clone());
                    }
                    fragment.record(outcome)?;
                }
                Err(err) if err.is_interrupted() => {
                    warn!("Interrupted while resolving group {}", group.name);
                    let remaining = &group.requests[position..];
                    match &bulk_failure {
                        // The failed bulk call already covered every member
                        Some(record) => {
                            for request in remaining {
                                fragment.record(PackageOutcome {
                                    identifier: request.identifier.clone(),
                                    group: request.group.clone(),
                                    critical: request.critical,
                                    status: InstallStatus::failure(
                                        self.policy
                                            .tolerates(&request.identifier, self.default_tolerance),
                                    ),
                                    attempts: vec![record.clone()],
                                    interrupted: true,
                                })?;
                            }
                        }
                        None => {
                            fragment.mark_pending(remaining.iter().map(|r| r.identifier.clone()))
                        }
                    }
                    return Ok(fragment);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(fragment)
    }

    /// First non-escalated, bulk-capable, reachable backend accepting every identifier
    fn bulk_backend(&self, identifiers: &[String]) -> Option<usize> {
        self.backends.iter().position(|b| {
            !b.escalated
                && b.bulk
                && !self.unavailable.contains_key(&b.id)
                && identifiers.iter().all(|id| b.accepts(id))
        })
    }

    fn resolve_identifier(
        &mut self,
        identifier: &str,
        tolerated: bool,
        walk: &mut Walk,
    ) -> Result<InstallStatus> {
        if walk.path.iter().any(|p| p == identifier) {
            let mut chain = walk.path.clone();
            chain.push(identifier.to_string());
            let cycle = CycleDetected {
                identifier: identifier.to_string(),
                chain,
            };
            warn!("{}; treating it as failed", cycle);
            return Ok(InstallStatus::failure(tolerated));
        }

        walk.path.push(identifier.to_string());
        let resolution = self.resolve_on_path(identifier, tolerated, walk);
        walk.path.pop();
        resolution
    }

    fn resolve_on_path(
        &mut self,
        identifier: &str,
        tolerated: bool,
        walk: &mut Walk,
    ) -> Result<InstallStatus> {
        let rule = self.policy.lookup(identifier).cloned().unwrap_or_default();

        for dependency in &rule.auxiliary_dependencies {
            info!("Installing auxiliary dependency {} for {}", dependency, identifier);
            let aux = self.resolve_identifier(dependency, true, walk)?;
            if !aux.is_success() {
                warn!(
                    "Auxiliary dependency {} failed, continuing with {}",
                    dependency, identifier
                );
            }
        }

        if self.attempt_candidates(identifier, walk)? {
            return Ok(InstallStatus::InstalledDirect);
        }

        if let Some(fallback) = rule.fallback.as_deref() {
            info!("Trying fallback for {}: {}", identifier, fallback);
            if self.resolve_identifier(fallback, true, walk)?.is_success() {
                return Ok(InstallStatus::InstalledViaFallback);
            }
            warn!("Fallback {} for {} failed", fallback, identifier);
        }

        Ok(InstallStatus::failure(tolerated))
    }

    /// Try each candidate in order; true on the first success
    fn attempt_candidates(&mut self, identifier: &str, walk: &mut Walk) -> Result<bool> {
        let candidates: Vec<usize> = self
            .backends
            .iter()
            .enumerate()
            .filter(|(_, b)| b.accepts(identifier))
            .map(|(i, _)| i)
            .collect();
        let packages = [identifier.to_string()];

        for index in candidates {
            if !walk.attempts.is_empty() && self.cancel.is_cancelled() {
                return Err(ProvisionError::interrupted(vec![identifier.to_string()]));
            }

            let backend_id = self.backends[index].id.clone();
            if self.backends[index].escalated {
                warn!("Escalating {} to {}", identifier, backend_id);
            } else {
                info!("Trying {} for {}", backend_id, identifier);
            }

            let invocation = self.invoke(index, &packages);
            let outcome = AttemptOutcome::from_success(invocation.success);
            walk.attempts.push(AttemptRecord::package(
                identifier,
                backend_id.as_str(),
                outcome,
                invocation.diagnostic,
            ));
            if outcome.is_success() {
                return Ok(true);
            }
            warn!("{} failed for {}", backend_id, identifier);
        }

        Ok(false)
    }

    /// Invoke one backend, folding unavailability into a failed invocation
    fn invoke(&mut self, index: usize, packages: &[String]) -> Invocation {
        let backend = &self.backends[index];
        if let Some(reason) = self.unavailable.get(&backend.id) {
            debug!("Skipping unavailable backend {}", backend.id);
            return Invocation::failure(format!(
                "backend '{}' is unavailable: {}",
                backend.id, reason
            ));
        }

        match self.invoker.invoke(backend, packages) {
            Ok(invocation) => invocation,
            Err(unavailable) => {
                warn!("{}; not retrying it this run", unavailable);
                let diagnostic = unavailable.to_string();
                self.unavailable
                    .insert(backend.id.clone(), unavailable.reason);
                Invocation::failure(diagnostic)
            }
        }
    }
}
