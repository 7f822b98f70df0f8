//! Configuration file tests
//!
//! Loading, validation and requirements files go through real files in a
//! temporary directory; the shipped sample configuration is run end to end
//! against its scripted outcomes.

use provision::{InstallStatus, ProvisionConfig, RunMode, ScriptedInvoker};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn sample(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("configs").join(name)
}

fn write_config(dir: &TempDir, json: &str) -> PathBuf {
    let path = dir.path().join("provision.json");
    fs::write(&path, json).unwrap();
    path
}

const MINIMAL: &str = r#"{
    "backends": [{"id": "pip"}],
    "groups": [
        {"name": "base", "packages": ["numpy"], "critical": true},
        {"name": "extras", "requirements": "reqs/extras.txt"}
    ]
}"#;

#[test]
fn test_requirements_resolved_relative_to_config() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("reqs")).unwrap();
    fs::write(
        dir.path().join("reqs/extras.txt"),
        "# helpers\ntqdm\n\nrich\nnumpy\n",
    )
    .unwrap();
    let path = write_config(&dir, MINIMAL);

    let config = ProvisionConfig::load_from_file(&path).unwrap();
    config.validate().unwrap();
    let groups = config.package_groups().unwrap();

    assert_eq!(groups[0].identifiers(), vec!["numpy"]);
    // numpy was already requested by the first group
    assert_eq!(groups[1].identifiers(), vec!["tqdm", "rich"]);
}

#[test]
fn test_missing_requirements_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, MINIMAL);

    let config = ProvisionConfig::load_from_file(&path).unwrap();
    let err = config.package_groups().unwrap_err();
    assert!(format!("{:#}", err).contains("extras"));
}

#[test]
fn test_unknown_field_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{"backends": [{"id": "pip", "priority": 1}], "groups": []}"#,
    );
    assert!(ProvisionConfig::load_from_file(&path).is_err());
}

#[test]
fn test_load_nonexistent_file() {
    assert!(ProvisionConfig::load_from_file("/nonexistent/provision.json").is_err());
}

#[test]
fn test_save_and_reload() {
    let config = ProvisionConfig::load_from_file(sample("ml-workstation.json")).unwrap();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("copy.json");
    config.save_to_file(&path).unwrap();

    let reloaded = ProvisionConfig::load_from_file(&path).unwrap();
    assert_eq!(reloaded.backends, config.backends);
    assert_eq!(reloaded.groups, config.groups);
    assert_eq!(reloaded.policy, config.policy);
    assert_eq!(reloaded.run_mode, RunMode::Strict);
}

#[test]
fn test_sample_config_plan() {
    let config = ProvisionConfig::load_from_file(sample("ml-workstation.json")).unwrap();
    config.validate().unwrap();
    let driver = config
        .build_driver(ScriptedInvoker::new())
        .unwrap();

    let order: Vec<&str> = driver
        .resolver()
        .candidates("Scikit_Learn")
        .iter()
        .map(|b| b.id.as_str())
        .collect();
    assert_eq!(order, vec!["conda", "pip", "pip-break-system-packages"]);
    assert_eq!(driver.requests().count(), 27);
}

#[test]
fn test_sample_config_offline_run() {
    let config = ProvisionConfig::load_from_file(sample("ml-workstation.json")).unwrap();
    let invoker = ScriptedInvoker::load_from_file(sample("outcomes-offline.json")).unwrap();
    let mut driver = config.build_driver(invoker).unwrap();

    let ledger = driver.run().unwrap();
    let summary = driver.summarize(&ledger);

    assert_eq!(summary.total, 27);
    assert_eq!(summary.successful, 25);
    assert_eq!(summary.failed_tolerated, vec!["dgl", "prophet"]);
    assert!(summary.failed_critical.is_empty());
    assert_eq!(summary.exit_code, 0);

    assert_eq!(
        ledger.get("gymnasium").unwrap().status,
        InstallStatus::InstalledViaFallback
    );
    assert_eq!(
        ledger.get("ray[tune]").unwrap().status,
        InstallStatus::InstalledViaFallback
    );
    // conda reported itself unavailable once and was never called again
    let invoker = driver.into_resolver().into_invoker();
    assert_eq!(invoker.calls_to("conda"), 1);
}
