//! # iamctl
//!
//! Command-line interface for the IAM Binding Controller.
//!
//! Runs declarative-batch reconciliation passes: compute the desired
//! binding set for an environment, then apply it so every scope holds
//! exactly the declared bindings.
//!
//! ## Usage
//!
//! ```bash
//! # Validate an environment declaration without touching any state
//! iamctl validate -f environments/dev.yaml
//!
//! # Show what a pass would change, against a copy of the observed state
//! iamctl plan -f environments/dev.yaml --state iam-state.json
//!
//! # Reconcile and persist the resulting state
//! iamctl apply -f environments/dev.yaml --state iam-state.json
//!
//! # Emit the JSON schema for environment declarations
//! iamctl schema
//! ```

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use iam_binding_controller::config;
use iam_binding_controller::constants::{DEFAULT_LOG_LEVEL, DEFAULT_STATE_FILE};
use iam_binding_controller::model::BindingAction;
use iam_binding_controller::statefile::{document_to_memory, load_document};
use iam_binding_controller::telemetry;
use iam_binding_controller::{EnvironmentSpec, FileControlPlane, PassReport, Reconciler};

/// IAM Binding Controller CLI
#[derive(Parser)]
#[command(name = "iamctl")]
#[command(
    about = "IAM Binding Controller CLI",
    long_about = None,
    version,
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("BUILD_GIT_HASH"),
        ", built ",
        env!("BUILD_DATETIME"),
        ")"
    ),
    after_help = "\
Examples:
  iamctl validate -f environments/dev.yaml
  iamctl plan -f environments/dev.yaml
  iamctl apply -f environments/dev.yaml --state iam-state.json
  iamctl schema > environment.schema.json
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace); RUST_LOG overrides
    #[arg(long, global = true, default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an environment declaration without applying anything
    Validate {
        /// Path to the environment YAML file
        #[arg(short = 'f', long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Compute a pass against a copy of the observed state (dry run)
    Plan {
        /// Path to the environment YAML file
        #[arg(short = 'f', long, value_name = "FILE")]
        file: PathBuf,

        /// Path to the state file holding observed bindings
        #[arg(long, value_name = "FILE", default_value = DEFAULT_STATE_FILE)]
        state: PathBuf,

        /// Report output format
        #[arg(long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// Reconcile an environment and persist the resulting state
    Apply {
        /// Path to the environment YAML file
        #[arg(short = 'f', long, value_name = "FILE")]
        file: PathBuf,

        /// Path to the state file holding observed bindings
        #[arg(long, value_name = "FILE", default_value = DEFAULT_STATE_FILE)]
        state: PathBuf,

        /// Report output format
        #[arg(long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// Print the JSON schema for environment declarations
    Schema,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn load_spec(file: &PathBuf) -> Result<EnvironmentSpec> {
    let spec = config::load_environment(file)?;
    Ok(spec)
}

fn render_report(report: &PassReport, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => {
            println!("{:<28} {:<48} KEY", "ACTION", "SCOPE");
            for scope in &report.scopes {
                for outcome in &scope.outcomes {
                    let action = match &outcome.action {
                        BindingAction::Applied => "applied".to_string(),
                        BindingAction::Unchanged => "unchanged".to_string(),
                        BindingAction::Removed => "removed".to_string(),
                        BindingAction::Failed { reason } => format!("failed: {reason}"),
                    };
                    println!(
                        "{:<28} {:<48} {}",
                        action,
                        scope.scope.describe(),
                        outcome.key
                    );
                }
            }
            let summary = report.summary();
            println!();
            println!(
                "{} applied, {} unchanged, {} removed, {} failed",
                summary.applied, summary.unchanged, summary.removed, summary.failed
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_telemetry(&cli.log_level)?;

    match cli.command {
        Commands::Validate { file } => {
            let spec = load_spec(&file)?;
            config::validate(&spec)?;
            info!(
                "Environment '{}' is valid: {} service accounts, {} scopes declared",
                spec.environment,
                spec.service_accounts.len(),
                spec.service_account_bindings.len()
                    + spec.cloud_run_services.len()
                    + spec.cloud_run_jobs.len()
                    + usize::from(spec.project_bindings.is_some())
            );
        }
        Commands::Plan {
            file,
            state,
            output,
        } => {
            let spec = load_spec(&file)?;
            let document = load_document(&state).await?;
            let memory = document_to_memory(&document).await;
            let report = Reconciler::new(&memory).reconcile(&spec).await?;
            render_report(&report, output)?;
            info!("Plan only; no changes were persisted");
        }
        Commands::Apply {
            file,
            state,
            output,
        } => {
            let spec = load_spec(&file)?;
            let plane = FileControlPlane::open(&state).await?;
            let report = Reconciler::new(&plane).reconcile(&spec).await?;
            render_report(&report, output)?;
            let summary = report.summary();
            if summary.failed > 0 {
                bail!("{} binding(s) failed to apply", summary.failed);
            }
        }
        Commands::Schema => {
            let schema = schemars::schema_for!(EnvironmentSpec);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}
