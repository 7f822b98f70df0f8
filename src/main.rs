//! provision - Main entry point
//!
//! Loads a provisioning configuration, resolves every package group and
//! exits with the run's disposition.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use provision::cli::{Cli, Commands};
use provision::{
    BackendInvoker, CancelToken, DryRunInvoker, ProvisionConfig, RunMode, RunReport,
    ScriptedInvoker, init_signal_handlers,
};

/// Exit code for unusable configuration or arguments
const EXIT_CONFIGURATION: i32 = 2;

/// Initialize the logger; RUST_LOG overrides the verbosity flag
fn init_logger(verbose: bool) {
    let default = if verbose { "provision=debug" } else { "provision=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    debug!("CLI arguments parsed");

    let code = match execute(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            EXIT_CONFIGURATION
        }
    };
    std::process::exit(code);
}

fn execute(command: Commands) -> Result<i32> {
    match command {
        Commands::Validate { config } => validate(&config),
        Commands::Plan { config } => plan(&config),
        Commands::Run {
            config,
            outcomes,
            mode,
            report,
        } => run(&config, outcomes.as_deref(), mode, report.as_deref()),
    }
}

fn load(path: &Path) -> Result<ProvisionConfig> {
    info!("Loading configuration from: {:?}", path);
    let config = ProvisionConfig::load_from_file(path)?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration {:?}", path))?;
    Ok(config)
}

fn validate(path: &Path) -> Result<i32> {
    let config = load(path)?;
    let groups = config.package_groups()?;
    let packages: usize = groups.iter().map(|g| g.requests.len()).sum();

    info!("Configuration validation successful");
    println!(
        "✓ Configuration file is valid: {} backends, {} groups, {} packages",
        config.backends().len(),
        groups.len(),
        packages
    );
    Ok(0)
}

fn plan(path: &Path) -> Result<i32> {
    let config = load(path)?;
    let driver = config.build_driver(DryRunInvoker::new())?;
    let resolver = driver.resolver();

    println!("Run mode: {}", config.run_mode);
    for group in driver.groups() {
        let bulk = if group.bulk_eligible { " (bulk)" } else { "" };
        println!("{}{}", group.name, bulk);

        for request in &group.requests {
            let order: Vec<&str> = resolver
                .candidates(&request.identifier)
                .iter()
                .map(|b| b.id.as_str())
                .collect();
            let critical = if request.critical { " [critical]" } else { "" };
            println!("  {}{}: {}", request.identifier, critical, order.join(" > "));

            if let Some(rule) = resolver.policy().lookup(&request.identifier) {
                if !rule.auxiliary_dependencies.is_empty() {
                    println!("    auxiliary: {}", rule.auxiliary_dependencies.join(", "));
                }
                if let Some(fallback) = &rule.fallback {
                    println!("    fallback: {}", fallback);
                }
            }
            let tolerated = resolver
                .policy()
                .tolerates(&request.identifier, config.default_tolerance);
            if tolerated {
                println!("    failure tolerated");
            }
        }
    }
    Ok(0)
}

fn run(
    path: &Path,
    outcomes: Option<&Path>,
    mode: Option<RunMode>,
    report: Option<&Path>,
) -> Result<i32> {
    let mut config = load(path)?;
    if let Some(mode) = mode {
        config.run_mode = mode;
    }

    let invoker: Box<dyn BackendInvoker> = match outcomes {
        Some(file) => {
            info!("Using scripted backend outcomes from {:?}", file);
            Box::new(ScriptedInvoker::load_from_file(file)?)
        }
        None => {
            info!("No outcomes file given, running as a dry run");
            Box::new(DryRunInvoker::new())
        }
    };

    let token = CancelToken::new();
    if let Err(e) = init_signal_handlers(token.clone()) {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    let mut driver = config.build_driver(invoker)?.with_cancel_token(token);
    let ledger = driver.run()?;
    let summary = driver.summarize(&ledger);
    println!("{}", summary);

    if let Some(report_path) = report {
        RunReport::new(&summary, &ledger)
            .write_to_file(report_path)
            .with_context(|| format!("Failed to write report to {:?}", report_path))?;
        info!("Report written to {:?}", report_path);
    }

    Ok(summary.exit_code)
}
