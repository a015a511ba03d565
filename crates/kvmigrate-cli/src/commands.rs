//! Subcommand handlers.

use crate::{build_config, render, Args, Command};
use kvmigrate_core::{
    generate, list_migration_files, Endpoint, Engine, EnvironmentConfig, Error, HistoryRecorder,
    Linter, LocalStore, MigrationFile, PermissionProber, Planner, Prompt, RunOptions, RunOutcome,
    SchemaValidator,
};
use std::io::{BufRead, Write};
use std::path::Path;

/// Prompt implementation over stdin/stderr.
struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm(&mut self, message: &str) -> Result<bool, Error> {
        let answer = self.read_phrase(message)?;
        Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
    }

    fn read_phrase(&mut self, message: &str) -> Result<String, Error> {
        eprint!("{} ", message);
        std::io::stderr().flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end().to_string())
    }
}

fn open_store(config: &EnvironmentConfig) -> Result<LocalStore, Error> {
    match &config.endpoint {
        Endpoint::Local(path) => Ok(LocalStore::open(path)?),
        Endpoint::Remote(url) => Err(Error::Io(std::io::Error::other(format!(
            "remote endpoint '{}' is not supported; use --store-path",
            url
        )))),
    }
}

pub fn run(args: Args) -> Result<(), Error> {
    let config = build_config(&args, &args.environment);

    match &args.command {
        Command::ValidateSchema { file } => validate_schema(&config, file),
        Command::LintMigration { file } => lint_migration(&config, file),
        Command::CheckPermissions => check_permissions(&config),
        Command::PlanMigration { file } => plan_migration(&config, file),
        Command::ApplyMigration {
            file,
            dry_run,
            force,
            backup,
            skip_validation,
        } => {
            let options = RunOptions {
                dry_run: *dry_run,
                force: *force,
                backup: *backup,
                skip_validation: *skip_validation,
            };
            apply_migration(&config, file, &options)
        }
        Command::RollbackMigration {
            file,
            dry_run,
            force,
        } => {
            let options = RunOptions {
                dry_run: *dry_run,
                force: *force,
                ..Default::default()
            };
            rollback_migration(&config, file, &options)
        }
        Command::GenerateMigration { name, author } => generate_migration(&config, name, author),
        Command::ListMigrations => list_migrations(&config),
        Command::MigrationStatus => migration_status(&config),
        Command::ProductionDeploy { file, dry_run } => {
            // Production deploys ignore --environment and always back up
            let config = build_config(&args, "production");
            let options = RunOptions {
                dry_run: *dry_run,
                backup: true,
                ..Default::default()
            };
            apply_migration(&config, file, &options)
        }
    }
}

fn validate_schema(config: &EnvironmentConfig, file: &Path) -> Result<(), Error> {
    let file = MigrationFile::load(file.to_path_buf())?;
    let report = SchemaValidator::new(config).validate_file(&file);
    if report.is_valid() {
        println!("{}: valid", file.file_name());
        Ok(())
    } else {
        for violation in &report.violations {
            println!("  - {}", violation);
        }
        Err(Error::Validation(report.violations))
    }
}

fn lint_migration(config: &EnvironmentConfig, file: &Path) -> Result<(), Error> {
    let file = MigrationFile::load(file.to_path_buf())?;
    let document = file.parse()?;
    let report = Linter::new(config).lint(&document, &file.file_name());

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    for error in &report.errors {
        println!("error: {}", error);
    }
    if report.is_clean() {
        println!("{}: clean", file.file_name());
    }
    if report.is_blocked() {
        Err(Error::LintBlocked(report.errors))
    } else {
        Ok(())
    }
}

fn check_permissions(config: &EnvironmentConfig) -> Result<(), Error> {
    let store = open_store(config)?;
    let report = PermissionProber::new(&store, config).probe()?;

    for capability in &report.granted {
        println!("granted: {}", capability);
    }
    for capability in &report.missing {
        println!("MISSING: {}", capability);
    }
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }

    if report.all_granted() {
        println!("all required permissions granted");
        Ok(())
    } else {
        Err(Error::PermissionDenied(report.missing))
    }
}

fn plan_migration(config: &EnvironmentConfig, file: &Path) -> Result<(), Error> {
    let file = MigrationFile::load(file.to_path_buf())?;
    let document = file.parse()?;
    let plan = Planner::new(config).plan(&file.migration_id, &document, false);
    println!("{}", plan.render());
    Ok(())
}

fn apply_migration(
    config: &EnvironmentConfig,
    file: &Path,
    options: &RunOptions,
) -> Result<(), Error> {
    let store = open_store(config)?;
    let file = MigrationFile::load(file.to_path_buf())?;
    tracing::info!(
        migration = %file.migration_id,
        environment = %config.environment,
        "applying migration"
    );
    let outcome = Engine::new(&store, config).apply(&file, options, &mut StdinPrompt)?;
    print_outcome(&file, &outcome);
    Ok(())
}

fn rollback_migration(
    config: &EnvironmentConfig,
    file: &Path,
    options: &RunOptions,
) -> Result<(), Error> {
    let store = open_store(config)?;
    let file = MigrationFile::load(file.to_path_buf())?;
    tracing::info!(
        migration = %file.migration_id,
        environment = %config.environment,
        "rolling back migration"
    );
    let outcome = Engine::new(&store, config).rollback(&file, options, &mut StdinPrompt)?;
    print_outcome(&file, &outcome);
    Ok(())
}

fn print_outcome(file: &MigrationFile, outcome: &RunOutcome) {
    let label = if outcome.plan.dry_run {
        "dry-run complete"
    } else {
        "complete"
    };
    println!(
        "{}: {} ({}/{} operations)",
        file.migration_id, label, outcome.operations_applied, outcome.total_operations
    );
    if let Some(dir) = &outcome.backup_dir {
        println!("backup: {}", dir.display());
    }
    for warning in &outcome.warnings {
        println!("warning: {}", warning);
    }
}

fn generate_migration(config: &EnvironmentConfig, name: &str, author: &str) -> Result<(), Error> {
    let path = generate(&config.migrations_dir, name, author)?;
    println!("created {}", path.display());
    Ok(())
}

fn list_migrations(config: &EnvironmentConfig) -> Result<(), Error> {
    let files = list_migration_files(&config.migrations_dir)?;
    if files.is_empty() {
        println!("no migrations in {}", config.migrations_dir.display());
        return Ok(());
    }

    let store = open_store(config)?;
    let applied = HistoryRecorder::new(&store, config).applied_ids()?;
    println!("{}", render::migrations_table(&files, &applied));
    Ok(())
}

fn migration_status(config: &EnvironmentConfig) -> Result<(), Error> {
    let files = list_migration_files(&config.migrations_dir)?;
    let store = open_store(config)?;
    let entries = HistoryRecorder::new(&store, config).entries()?;
    if files.is_empty() && entries.is_empty() {
        println!(
            "no migrations or history for '{}' ({})",
            config.environment,
            config.migrations_dir.display()
        );
        return Ok(());
    }
    println!("{}", render::status_table(&render::status_rows(&files, &entries)));
    Ok(())
}
