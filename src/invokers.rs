//! Backend invokers that never touch a real package manager.
//!
//! - `DryRunInvoker` reports success for every call so a configuration can
//!   be walked end to end.
//! - `ScriptedInvoker` answers from a per-backend outcome table, loaded from
//!   JSON or built in code, and keeps a log of every call it received.

use crate::backend::{Backend, BackendInvoker, Invocation};
use crate::error::BackendUnavailable;
use crate::types::AttemptOutcome;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Logs each install it would perform and reports success.
#[derive(Debug, Default)]
pub struct DryRunInvoker {
    calls: usize,
}

impl DryRunInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invocations seen so far
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl BackendInvoker for DryRunInvoker {
    fn invoke(
        &mut self,
        backend: &Backend,
        packages: &[String],
    ) -> Result<Invocation, BackendUnavailable> {
        self.calls += 1;
        info!(
            "[dry-run] {} install {} (timeout {}s)",
            backend.id,
            packages.join(" "),
            backend.timeout.as_secs()
        );
        Ok(Invocation::success("dry run: not executed"))
    }
}

/// Scripted answers for one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendScript {
    /// Outcome for identifiers not listed below
    pub default: AttemptOutcome,
    pub fail: HashSet<String>,
    pub succeed: HashSet<String>,
    /// Identifiers whose install exceeds the backend timeout
    pub timeout: HashSet<String>,
    /// Every call reports `BackendUnavailable`
    pub unavailable: bool,
}

impl Default for BackendScript {
    fn default() -> Self {
        Self {
            default: AttemptOutcome::Success,
            fail: HashSet::new(),
            succeed: HashSet::new(),
            timeout: HashSet::new(),
            unavailable: false,
        }
    }
}

impl BackendScript {
    fn judge(&self, backend: &Backend, identifier: &str) -> Option<String> {
        if self.timeout.contains(identifier) {
            Some(format!(
                "{}: timed out after {}s",
                identifier,
                backend.timeout.as_secs()
            ))
        } else if self.fail.contains(identifier) {
            Some(format!("{}: install failed", identifier))
        } else if self.succeed.contains(identifier) || self.default.is_success() {
            None
        } else {
            Some(format!("{}: install failed", identifier))
        }
    }
}

/// One call received by a `ScriptedInvoker`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub backend: String,
    pub packages: Vec<String>,
}

/// Answers install requests from a per-backend outcome table.
///
/// Backends without a script succeed for every identifier. A call naming
/// several identifiers succeeds only if each of them would succeed alone.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    scripts: HashMap<String, BackendScript>,
    calls: Vec<RecordedCall>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an outcome table (`{"<backend>": BackendScript, ...}`) from JSON
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read outcomes from {:?}", path.as_ref()))?;
        let scripts: HashMap<String, BackendScript> =
            serde_json::from_str(&content).context("Failed to parse outcomes JSON")?;
        Ok(Self {
            scripts,
            calls: Vec::new(),
        })
    }

    fn script_mut(&mut self, backend: &str) -> &mut BackendScript {
        self.scripts.entry(backend.to_string()).or_default()
    }

    /// Outcome for identifiers the backend's script does not list
    pub fn backend_default(mut self, backend: &str, outcome: AttemptOutcome) -> Self {
        self.script_mut(backend).default = outcome;
        self
    }

    pub fn fail<I, S>(mut self, backend: &str, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script_mut(backend)
            .fail
            .extend(identifiers.into_iter().map(Into::into));
        self
    }

    pub fn succeed<I, S>(mut self, backend: &str, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script_mut(backend)
            .succeed
            .extend(identifiers.into_iter().map(Into::into));
        self
    }

    pub fn timeout<I, S>(mut self, backend: &str, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script_mut(backend)
            .timeout
            .extend(identifiers.into_iter().map(Into::into));
        self
    }

    pub fn unavailable(mut self, backend: &str) -> Self {
        self.script_mut(backend).unavailable = true;
        self
    }

    /// Every call received, in order
    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    /// Calls made against `backend`
    pub fn calls_to(&self, backend: &str) -> usize {
        self.calls.iter().filter(|c| c.backend == backend).count()
    }
}

impl BackendInvoker for ScriptedInvoker {
    fn invoke(
        &mut self,
        backend: &Backend,
        packages: &[String],
    ) -> Result<Invocation, BackendUnavailable> {
        self.calls.push(RecordedCall {
            backend: backend.id.clone(),
            packages: packages.to_vec(),
        });

        let Some(script) = self.scripts.get(&backend.id) else {
            debug!("no script for backend {}, reporting success", backend.id);
            return Ok(Invocation::success("installed"));
        };

        if script.unavailable {
            return Err(BackendUnavailable::new(
                backend.id.clone(),
                "scripted as unavailable",
            ));
        }

        let failures: Vec<String> = packages
            .iter()
            .filter_map(|p| script.judge(backend, p))
            .collect();

        if failures.is_empty() {
            Ok(Invocation::success("installed"))
        } else {
            Ok(Invocation::failure(failures.join("; ")))
        }
    }
}
