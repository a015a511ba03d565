//! kvmigrate command-line interface.
//!
//! Drives the migration engine against a local store: validate, lint,
//! permission-check, plan, apply, roll back, and inspect history.

mod commands;
mod render;

use clap::{Parser, Subcommand};
use kvmigrate_core::{Endpoint, EnvironmentConfig, Error};
use std::path::PathBuf;

/// Schema and data migration tool for key-value table stores.
#[derive(Parser, Debug)]
#[command(name = "kvmigrate")]
#[command(version, about = "Schema and data migration tool")]
pub struct Args {
    /// Target environment (development, staging, production)
    #[arg(short, long, global = true, default_value = "development")]
    pub environment: String,

    /// Directory containing migration documents
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Directory backups are written under
    #[arg(long, global = true)]
    pub backup_root: Option<PathBuf>,

    /// Path of the local store (defaults per environment)
    #[arg(long, global = true)]
    pub store_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a migration document against the schema rules
    ValidateSchema {
        /// Migration file to validate
        file: PathBuf,
    },

    /// Lint a migration document for policy problems
    LintMigration {
        file: PathBuf,
    },

    /// Probe the store for the permissions a migration run needs
    CheckPermissions,

    /// Show the execution plan for a migration without applying it
    PlanMigration {
        file: PathBuf,
    },

    /// Apply a migration document
    ApplyMigration {
        file: PathBuf,

        /// Report intended actions without touching the store
        #[arg(long)]
        dry_run: bool,

        /// Skip per-operation destructive confirmations
        #[arg(long)]
        force: bool,

        /// Take a backup even if the document does not require one
        #[arg(long)]
        backup: bool,

        /// Skip schema validation
        #[arg(long)]
        skip_validation: bool,
    },

    /// Execute a migration's declared rollback procedure
    RollbackMigration {
        file: PathBuf,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        force: bool,
    },

    /// Generate a numbered migration document skeleton
    GenerateMigration {
        /// Human-readable migration name
        name: String,

        /// Author recorded in the document
        #[arg(long, default_value = "unknown")]
        author: String,
    },

    /// List migration files and whether each has been applied
    ListMigrations,

    /// Show the migration history for this environment
    MigrationStatus,

    /// Apply a migration to production with forced backup
    ProductionDeploy {
        file: PathBuf,

        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("kvmigrate={}", default_level).parse().unwrap())
                .add_directive(format!("kvmigrate_core={}", default_level).parse().unwrap()),
        )
        .init();

    match commands::run(args) {
        Ok(()) => {}
        Err(Error::ConfirmationDeclined) => {
            // Operator chose not to proceed; not a failure
            println!("Aborted.");
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Build the configuration for an environment from defaults plus CLI
/// overrides. `production-deploy` passes "production" regardless of
/// `--environment`.
pub fn build_config(args: &Args, environment: &str) -> EnvironmentConfig {
    let mut config = EnvironmentConfig::for_environment(environment);
    if let Some(dir) = &args.migrations_dir {
        config = config.with_migrations_dir(dir.clone());
    }
    if let Some(root) = &args.backup_root {
        config = config.with_backup_root(root.clone());
    }
    if let Some(path) = &args.store_path {
        config = config.with_endpoint(Endpoint::Local(path.clone()));
    }
    config
}
