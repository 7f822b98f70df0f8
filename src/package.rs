//! Package requests and identifier normalization.

use serde::{Deserialize, Serialize};

/// One package the run driver asks the resolver to install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRequest {
    /// Package identifier as passed to the backends
    pub identifier: String,
    /// Group this request came from (reporting only)
    pub group: String,
    /// Intrinsically critical: a `FailedCritical` outcome fails a strict run
    pub critical: bool,
}

impl PackageRequest {
    pub fn new(identifier: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            group: group.into(),
            critical: false,
        }
    }

    /// Mark the request as intrinsically critical
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// An ordered batch of requests resolved together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageGroup {
    pub name: String,
    /// Try one group-wide install call before resolving packages individually
    pub bulk_eligible: bool,
    pub requests: Vec<PackageRequest>,
}

impl PackageGroup {
    /// Build a group whose requests are all non-critical
    pub fn new<I, S>(name: impl Into<String>, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let requests = identifiers
            .into_iter()
            .map(|id| PackageRequest::new(id, name.clone()))
            .collect();
        Self {
            name,
            bulk_eligible: false,
            requests,
        }
    }

    pub fn bulk(mut self) -> Self {
        self.bulk_eligible = true;
        self
    }

    /// Mark every request in the group intrinsically critical
    pub fn all_critical(mut self) -> Self {
        for request in &mut self.requests {
            request.critical = true;
        }
        self
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.requests.iter().map(|r| r.identifier.clone()).collect()
    }
}

/// Normalize an identifier for capability matching.
///
/// Lowercases and strips `-`, `_` and `.`, so `scikit-learn`,
/// `Scikit_Learn` and `scikitlearn` all compare equal.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier
        .trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Parse a requirements-style package list.
///
/// One identifier per line; blank lines and `#` comments are skipped.
pub fn parse_requirements(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators_and_case() {
        assert_eq!(normalize_identifier("scikit-learn"), "scikitlearn");
        assert_eq!(normalize_identifier("Scikit_Learn"), "scikitlearn");
        assert_eq!(normalize_identifier("Pillow"), "pillow");
        assert_eq!(normalize_identifier("zope.interface"), "zopeinterface");
        assert_eq!(normalize_identifier("  numpy "), "numpy");
    }

    #[test]
    fn test_request_builder() {
        let req = PackageRequest::new("numpy", "core_ml");
        assert!(!req.critical);
        assert!(req.critical().critical);
    }

    #[test]
    fn test_group_builder() {
        let group = PackageGroup::new("core_ml", ["numpy", "pandas"]).bulk().all_critical();
        assert!(group.bulk_eligible);
        assert!(group.requests.iter().all(|r| r.critical && r.group == "core_ml"));
        assert_eq!(group.identifiers(), vec!["numpy", "pandas"]);
    }

    #[test]
    fn test_parse_requirements_skips_comments_and_blanks() {
        let input = "# core\nnumpy\n\n  pandas  \n#scipy\nscikit-learn>=1.3\n";
        assert_eq!(
            parse_requirements(input),
            vec!["numpy", "pandas", "scikit-learn>=1.3"]
        );
    }

    #[test]
    fn test_parse_requirements_empty() {
        assert!(parse_requirements("").is_empty());
        assert!(parse_requirements("\n# only comments\n").is_empty());
    }
}
