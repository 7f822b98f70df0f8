//! Configuration file handling for provisioning runs.
//!
//! A single JSON document declares the backends, the package groups and the
//! policy table. Everything is validated before a driver is built so that a
//! malformed configuration aborts the run before any install is attempted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendInvoker, Capability, DEFAULT_TIMEOUT};
use crate::logic::driver::{DEFAULT_SUCCESS_THRESHOLD, RunDriver};
use crate::logic::resolver::Resolver;
use crate::package::{PackageGroup, PackageRequest, parse_requirements};
use crate::policy::PolicyTable;
use crate::types::{CapabilityKind, RunMode};

fn default_threshold() -> f64 {
    DEFAULT_SUCCESS_THRESHOLD
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn enabled() -> bool {
    true
}

/// One backend as declared in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub id: String,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub capability: CapabilityKind,
    /// Accepted identifiers when `capability` is `only`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(default)]
    pub escalated: bool,
    #[serde(default = "enabled")]
    pub bulk: bool,
    /// Disabled backends are dropped before the resolver is built
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// One package group as declared in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub packages: Vec<String>,
    /// Requirements-style list appended to `packages`, relative to the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<PathBuf>,
    #[serde(default)]
    pub bulk_eligible: bool,
    /// Every package in the group is intrinsically critical
    #[serde(default)]
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_packages: Vec<String>,
}

/// Provisioning configuration that can be saved/loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub run_mode: RunMode,
    /// Tolerance for packages whose policy rule does not set one
    #[serde(default)]
    pub default_tolerance: bool,
    /// Success rate (percent) reported as "ready"
    #[serde(default = "default_threshold")]
    pub success_threshold: f64,
    /// Identifiers accepted by `preferred` backends
    #[serde(default)]
    pub preferred_packages: Vec<String>,
    pub backends: Vec<BackendConfig>,
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub policy: PolicyTable,
    /// Directory requirements files are resolved against
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl ProvisionConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {:?}", path))?;

        let mut config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;
        config.base_dir = path.parent().map(Path::to_path_buf);

        Ok(config)
    }

    /// Resolve relative requirements paths against `dir`
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.success_threshold) {
            anyhow::bail!(
                "success_threshold must be between 0 and 100, got {}",
                self.success_threshold
            );
        }

        // Backends
        let active: Vec<&BackendConfig> = self.backends.iter().filter(|b| b.enabled).collect();
        if active.is_empty() {
            anyhow::bail!("At least one enabled backend must be declared");
        }
        let mut ids = HashSet::new();
        for backend in &self.backends {
            if backend.id.trim().is_empty() {
                anyhow::bail!("Backend id must not be empty");
            }
            if !ids.insert(backend.id.as_str()) {
                anyhow::bail!("Duplicate backend id '{}'", backend.id);
            }
            match backend.capability {
                CapabilityKind::Only if backend.packages.is_empty() => {
                    anyhow::bail!("Backend '{}' accepts only an empty package list", backend.id);
                }
                CapabilityKind::Preferred if self.preferred_packages.is_empty() => {
                    anyhow::bail!(
                        "Backend '{}' uses preferred_packages, but none are configured",
                        backend.id
                    );
                }
                _ => {}
            }
        }
        if !active.iter().any(|b| b.capability == CapabilityKind::Any) {
            anyhow::bail!("At least one enabled backend must accept any package");
        }

        // Groups
        let mut names = HashSet::new();
        for group in &self.groups {
            if group.name.trim().is_empty() {
                anyhow::bail!("Group name must not be empty");
            }
            if !names.insert(group.name.as_str()) {
                anyhow::bail!("Duplicate group name '{}'", group.name);
            }
            if group.packages.iter().any(|p| p.trim().is_empty()) {
                anyhow::bail!("Group '{}' contains an empty package identifier", group.name);
            }
            if let Some(unknown) = group
                .critical_packages
                .iter()
                .find(|p| !group.packages.contains(p))
                .filter(|_| group.requirements.is_none())
            {
                anyhow::bail!(
                    "Group '{}' marks '{}' critical but does not list it",
                    group.name,
                    unknown
                );
            }
        }

        self.policy.validate()?;

        Ok(())
    }

    /// Enabled backends, in declaration order
    pub fn backends(&self) -> Vec<Backend> {
        self.backends
            .iter()
            .filter(|b| b.enabled)
            .map(|b| {
                let capability = match b.capability {
                    CapabilityKind::Any => Capability::Any,
                    CapabilityKind::Preferred => Capability::only(&self.preferred_packages),
                    CapabilityKind::Only => Capability::only(&b.packages),
                };
                let mut backend = Backend::new(b.id.clone(), b.rank, capability)
                    .with_timeout(Duration::from_secs(b.timeout_secs));
                backend.escalated = b.escalated;
                backend.bulk = b.bulk;
                backend
            })
            .collect()
    }

    /// Build request groups, reading requirements files and dropping duplicates.
    ///
    /// An identifier listed in several groups is resolved once, in the first
    /// group that lists it; it is critical if any listing marks it critical.
    pub fn package_groups(&self) -> Result<Vec<PackageGroup>> {
        let mut groups: Vec<PackageGroup> = Vec::with_capacity(self.groups.len());
        // identifier → (group index, request index)
        let mut seen: HashMap<String, (usize, usize)> = HashMap::new();

        for config in &self.groups {
            let mut identifiers = config.packages.clone();
            if let Some(requirements) = &config.requirements {
                let path = match &self.base_dir {
                    Some(dir) => dir.join(requirements),
                    None => requirements.clone(),
                };
                let content = fs::read_to_string(&path).with_context(|| {
                    format!(
                        "Failed to read requirements for group '{}' from {:?}",
                        config.name, path
                    )
                })?;
                let listed = parse_requirements(&content);
                debug!("Read {} packages from {:?}", listed.len(), path);
                identifiers.extend(listed);
            }

            let group_index = groups.len();
            let mut group = PackageGroup {
                name: config.name.clone(),
                bulk_eligible: config.bulk_eligible,
                requests: Vec::with_capacity(identifiers.len()),
            };

            for identifier in identifiers {
                let critical = config.critical || config.critical_packages.contains(&identifier);
                if let Some(&(g, r)) = seen.get(&identifier) {
                    let (first_group, existing) = if g == group_index {
                        (config.name.as_str(), &mut group.requests[r])
                    } else {
                        let first = &mut groups[g];
                        (first.name.as_str(), &mut first.requests[r])
                    };
                    warn!(
                        "{} listed again in group {}; keeping the entry from {}",
                        identifier, config.name, first_group
                    );
                    existing.critical |= critical;
                    continue;
                }

                seen.insert(identifier.clone(), (group_index, group.requests.len()));
                let mut request = PackageRequest::new(identifier, config.name.clone());
                request.critical = critical;
                group.requests.push(request);
            }

            groups.push(group);
        }

        Ok(groups)
    }

    /// Validate and assemble a run driver around `invoker`
    pub fn build_driver<I: BackendInvoker>(&self, invoker: I) -> Result<RunDriver<I>> {
        self.validate()?;
        let groups = self.package_groups()?;
        let resolver = Resolver::new(self.backends(), self.policy.clone(), invoker)?
            .with_default_tolerance(self.default_tolerance);

        Ok(RunDriver::new(resolver, groups)
            .with_mode(self.run_mode)
            .with_success_threshold(self.success_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invokers::DryRunInvoker;
    use crate::policy::PolicyRule;
    use serde_json::json;

    fn create_test_config() -> ProvisionConfig {
        serde_json::from_value(json!({
            "preferred_packages": ["numpy", "pandas", "scikit-learn"],
            "backends": [
                {"id": "conda", "capability": "preferred"},
                {"id": "pip", "rank": 1},
                {"id": "pip-unconstrained", "rank": 2, "escalated": true, "bulk": false}
            ],
            "groups": [
                {"name": "core_ml", "packages": ["numpy", "pandas"], "bulk_eligible": true, "critical": true},
                {"name": "graph", "packages": ["dgl", "networkx"], "critical_packages": ["networkx"]}
            ],
            "policy": {"dgl": {"tolerate_failure": true}}
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = create_test_config();
        assert_eq!(config.run_mode, RunMode::Strict);
        assert!(!config.default_tolerance);
        assert_eq!(config.success_threshold, DEFAULT_SUCCESS_THRESHOLD);
        assert!(config.backends[0].bulk && config.backends[0].enabled);
        assert_eq!(config.backends[1].timeout_secs, DEFAULT_TIMEOUT.as_secs());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backends_map_capabilities() {
        let config = create_test_config();
        let backends = config.backends();
        assert_eq!(backends.len(), 3);
        assert!(backends[0].accepts("scikit_learn"));
        assert!(!backends[0].accepts("torch"));
        assert!(backends[1].accepts("torch"));
        assert!(backends[2].escalated && !backends[2].bulk);
    }

    #[test]
    fn test_preferred_and_only_build_the_same_capability() {
        let mut config = create_test_config();
        let explicit = BackendConfig {
            id: "conda-explicit".into(),
            capability: CapabilityKind::Only,
            packages: vec!["NumPy".into(), "pandas".into(), "scikit_learn".into()],
            ..config.backends[0].clone()
        };
        config.backends.push(explicit);

        let backends = config.backends();
        assert_eq!(backends[0].capability, backends[3].capability);
        assert_eq!(
            backends[0].capability,
            Capability::only(&config.preferred_packages)
        );
    }

    #[test]
    fn test_validation_requires_any_backend() {
        let mut config = create_test_config();
        config.backends[1].enabled = false;
        config.backends[2].capability = CapabilityKind::Only;
        config.backends[2].packages = vec!["torch".into()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("accept any package"));
    }

    #[test]
    fn test_validation_duplicate_backend() {
        let mut config = create_test_config();
        config.backends[2].id = "pip".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_empty_identifier() {
        let mut config = create_test_config();
        config.groups[1].packages.push(" ".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_threshold_range() {
        let mut config = create_test_config();
        config.success_threshold = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_self_fallback() {
        let mut config = create_test_config();
        config.policy.insert("gym", PolicyRule::with_fallback("gym"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_preferred_without_list() {
        let mut config = create_test_config();
        config.preferred_packages.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_package_groups_critical_flags() {
        let groups = create_test_config().package_groups().unwrap();
        assert!(groups[0].bulk_eligible);
        assert!(groups[0].requests.iter().all(|r| r.critical));
        assert!(!groups[1].requests[0].critical);
        assert!(groups[1].requests[1].critical);
    }

    #[test]
    fn test_duplicates_first_wins_and_critical_merges() {
        let mut config = create_test_config();
        config.groups[1].packages.push("pandas".into());
        config.groups[1].critical_packages.push("dgl".into());
        config.groups[0].critical = false;
        config.groups[1].critical = true;

        let groups = config.package_groups().unwrap();
        assert_eq!(groups[0].identifiers(), vec!["numpy", "pandas"]);
        assert_eq!(groups[1].identifiers(), vec!["dgl", "networkx"]);
        assert!(groups[0].requests[1].critical, "critical flag merged into first entry");
        assert!(!groups[0].requests[0].critical);
    }

    #[test]
    fn test_build_driver() {
        let driver = create_test_config().build_driver(DryRunInvoker::new()).unwrap();
        assert_eq!(driver.requests().count(), 4);
        assert_eq!(driver.resolver().backends()[2].id, "pip-unconstrained");
    }
}
