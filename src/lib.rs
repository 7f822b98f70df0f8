//! provision Library
//!
//! This library provides the installation resolver behind the `provision`
//! binary: backends and their invokers, the policy table, per-package and
//! per-group resolution, and the run ledger that classifies every request.

pub mod backend;
pub mod cli;
pub mod config_file;
pub mod error;
pub mod invokers;
pub mod ledger;
pub mod logic;
pub mod package;
pub mod policy;
pub mod signals;
pub mod types;

// Re-export main types for convenience
pub use backend::{Backend, BackendInvoker, Capability, Invocation};
pub use config_file::{BackendConfig, GroupConfig, ProvisionConfig};
pub use error::{BackendUnavailable, CycleDetected, ProvisionError, Result};
pub use invokers::{BackendScript, DryRunInvoker, ScriptedInvoker};
pub use ledger::{AttemptRecord, AttemptTarget, PackageOutcome, RunLedger, RunReport, RunSummary};
pub use logic::driver::RunDriver;
pub use logic::resolver::Resolver;
pub use package::{PackageGroup, PackageRequest, normalize_identifier};
pub use policy::{PolicyRule, PolicyTable};
pub use signals::{CancelToken, init_signal_handlers};
pub use types::{AttemptOutcome, CapabilityKind, InstallStatus, RunMode};
