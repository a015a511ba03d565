//! Migration execution state machine.
//!
//! Runs the full pipeline for one document: validate, lint, probe
//! permissions, plan, back up, execute operations in document order, record
//! history. Any failure before execution aborts cleanly; a failure inside
//! execution leaves the run failed with no automatic rollback, and the
//! operator re-enters through [`Engine::rollback`] with the document's
//! declared rollback procedure.

use crate::backup::BackupManager;
use crate::config::EnvironmentConfig;
use crate::document::{BillingModeKind, MigrationDocument, MigrationFile, Operation};
use crate::error::Error;
use crate::history::{HistoryRecorder, MigrationOutcome};
use crate::lint::Linter;
use crate::permissions::PermissionProber;
use crate::plan::{ExecutionPlan, Planner};
use crate::safety::{Prompt, SafetyGate};
use crate::script::{ScriptContext, ScriptRunner};
use crate::store::{BillingMode, TableStore};
use crate::validate::SchemaValidator;
use std::path::{Path, PathBuf};

/// States of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Validating,
    Linting,
    ProbingPermissions,
    BackingUp,
    Executing,
    Recorded,
    /// Terminal: a pre-execution stage failed or the operator declined.
    Aborted,
    /// Terminal: an operation failed mid-execution; manual intervention.
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Pending => "pending",
            RunState::Validating => "validating",
            RunState::Linting => "linting",
            RunState::ProbingPermissions => "probing_permissions",
            RunState::BackingUp => "backing_up",
            RunState::Executing => "executing",
            RunState::Recorded => "recorded",
            RunState::Aborted => "aborted",
            RunState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Options controlling one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Report intended actions without calling any mutating store API.
    pub dry_run: bool,
    /// Skip per-operation destructive confirmations (never the production gate).
    pub force: bool,
    /// Take a backup even if the document does not require one.
    pub backup: bool,
    /// Skip schema validation (lint and permission checks still run).
    pub skip_validation: bool,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    pub operations_applied: usize,
    pub total_operations: usize,
    pub warnings: Vec<String>,
    pub backup_dir: Option<PathBuf>,
    pub plan: ExecutionPlan,
}

/// Orchestrates migration runs against one store and environment.
pub struct Engine<'a, S: TableStore> {
    store: &'a S,
    config: &'a EnvironmentConfig,
}

impl<'a, S: TableStore> Engine<'a, S> {
    pub fn new(store: &'a S, config: &'a EnvironmentConfig) -> Self {
        Self { store, config }
    }

    /// Apply a migration document through the full pipeline.
    ///
    /// There is no engine-level lock: running two applies concurrently
    /// against the same environment is an operator hazard.
    pub fn apply(
        &self,
        file: &MigrationFile,
        options: &RunOptions,
        prompt: &mut dyn Prompt,
    ) -> Result<RunOutcome, Error> {
        let document = file.parse()?;
        let gate = SafetyGate::new(self.config, options.force);
        let mut warnings = Vec::new();

        self.transition(RunState::Pending, &file.migration_id);
        gate.confirm_start(prompt)?;

        self.transition(RunState::Validating, &file.migration_id);
        if options.skip_validation {
            tracing::warn!("schema validation skipped");
        } else {
            let report = SchemaValidator::new(self.config).validate_file(file);
            if !report.is_valid() {
                self.abort(&file.migration_id, "validation failed");
                return Err(Error::Validation(report.violations));
            }
        }

        self.transition(RunState::Linting, &file.migration_id);
        let lint = Linter::new(self.config).lint(&document, &file.file_name());
        for warning in &lint.warnings {
            tracing::warn!(lint = %warning);
        }
        warnings.extend(lint.warnings.clone());
        if lint.is_blocked() {
            self.abort(&file.migration_id, "lint errors");
            return Err(Error::LintBlocked(lint.errors));
        }

        self.transition(RunState::ProbingPermissions, &file.migration_id);
        if options.dry_run {
            tracing::info!("dry-run: permission probe skipped (it mutates the store)");
        } else {
            let probe = PermissionProber::new(self.store, self.config).probe()?;
            warnings.extend(probe.warnings.clone());
            if !probe.all_granted() {
                self.abort(&file.migration_id, "missing permissions");
                return Err(Error::PermissionDenied(probe.missing));
            }
        }

        let plan = Planner::new(self.config).plan(&file.migration_id, &document, options.dry_run);
        tracing::info!("\n{}", plan.render());
        gate.confirm_execution(prompt)?;

        self.transition(RunState::BackingUp, &file.migration_id);
        let backup_wanted =
            options.backup || document.backup_required || self.config.is_production();
        let backup_dir = if backup_wanted && !options.dry_run {
            Some(
                BackupManager::new(self.store, self.config)
                    .create_backup(&file.migration_id, &document, &file.path)?,
            )
        } else {
            None
        };

        self.transition(RunState::Executing, &file.migration_id);
        let applied = match self.execute_operations(
            &document.operations,
            options,
            prompt,
            &gate,
            &mut warnings,
        ) {
            Ok(applied) => applied,
            Err(Error::ConfirmationDeclined) => {
                self.abort(&file.migration_id, "operator declined");
                return Err(Error::ConfirmationDeclined);
            }
            Err(e) => {
                if self.config.is_production() {
                    tracing::error!(migration = %file.migration_id, "PRODUCTION migration failed: {}", e);
                } else {
                    tracing::error!(migration = %file.migration_id, "migration failed: {}", e);
                }
                if !options.dry_run {
                    self.record(&file.migration_id, &document, MigrationOutcome::Failed)?;
                }
                return Err(e);
            }
        };

        self.transition(RunState::Recorded, &file.migration_id);
        if !options.dry_run {
            self.record(&file.migration_id, &document, MigrationOutcome::Applied)?;
        }

        Ok(RunOutcome {
            state: RunState::Recorded,
            operations_applied: applied,
            total_operations: document.operations.len(),
            warnings,
            backup_dir,
            plan,
        })
    }

    /// Re-enter the executor with the document's declared rollback
    /// procedure. Validation and lint are not re-run; the procedure is
    /// operator-invoked remediation.
    pub fn rollback(
        &self,
        file: &MigrationFile,
        options: &RunOptions,
        prompt: &mut dyn Prompt,
    ) -> Result<RunOutcome, Error> {
        let document = file.parse()?;
        let procedure = document
            .rollback_procedure
            .clone()
            .ok_or_else(|| Error::MissingRollback(file.migration_id.clone()))?;

        let gate = SafetyGate::new(self.config, options.force);
        let mut warnings = Vec::new();

        self.transition(RunState::Pending, &file.migration_id);
        gate.confirm_start(prompt)?;

        let mut rollback_document = document.clone();
        rollback_document.operations = procedure.operations.clone();
        let plan =
            Planner::new(self.config).plan(&file.migration_id, &rollback_document, options.dry_run);
        tracing::info!("rollback: {}\n{}", procedure.description, plan.render());
        gate.confirm_execution(prompt)?;

        self.transition(RunState::Executing, &file.migration_id);
        let applied = match self.execute_operations(
            &procedure.operations,
            options,
            prompt,
            &gate,
            &mut warnings,
        ) {
            Ok(applied) => applied,
            Err(Error::ConfirmationDeclined) => {
                self.abort(&file.migration_id, "operator declined");
                return Err(Error::ConfirmationDeclined);
            }
            Err(e) => {
                if !options.dry_run {
                    self.record(&file.migration_id, &document, MigrationOutcome::Failed)?;
                }
                return Err(e);
            }
        };

        self.transition(RunState::Recorded, &file.migration_id);
        if !options.dry_run {
            self.record(&file.migration_id, &document, MigrationOutcome::RolledBack)?;
        }

        Ok(RunOutcome {
            state: RunState::Recorded,
            operations_applied: applied,
            total_operations: procedure.operations.len(),
            warnings,
            backup_dir: None,
            plan,
        })
    }

    /// Execute operations strictly sequentially, in document order. Each
    /// operation fully converges before the next starts.
    fn execute_operations(
        &self,
        operations: &[Operation],
        options: &RunOptions,
        prompt: &mut dyn Prompt,
        gate: &SafetyGate<'_>,
        warnings: &mut Vec<String>,
    ) -> Result<usize, Error> {
        let mut applied = 0;
        for (index, operation) in operations.iter().enumerate() {
            tracing::info!(
                step = index + 1,
                total = operations.len(),
                op = operation.type_name(),
                "{}",
                operation.intent()
            );
            self.execute_operation(index, operation, options, prompt, gate, warnings)
                .map_err(|e| match e {
                    Error::ConfirmationDeclined | Error::OperationFailed { .. } => e,
                    other => Error::OperationFailed {
                        index,
                        op_type: operation.type_name().to_string(),
                        reason: other.to_string(),
                    },
                })?;
            applied += 1;
        }
        Ok(applied)
    }

    fn execute_operation(
        &self,
        index: usize,
        operation: &Operation,
        options: &RunOptions,
        prompt: &mut dyn Prompt,
        gate: &SafetyGate<'_>,
        warnings: &mut Vec<String>,
    ) -> Result<(), Error> {
        match operation {
            Operation::CreateTable {
                table_name,
                table_definition,
                ..
            } => {
                if self.store.table_exists(table_name)? {
                    let warning = format!("table '{}' already exists, skipping", table_name);
                    tracing::warn!("{}", warning);
                    warnings.push(warning);
                    return Ok(());
                }
                if options.dry_run {
                    tracing::info!("dry-run: would create table '{}'", table_name);
                    return Ok(());
                }
                self.store.create_table(table_name, table_definition)?;
                // Later operations may depend on this table having converged
                self.store.wait_until_active(table_name)?;
                Ok(())
            }

            Operation::ModifyTable {
                table_name,
                modifications,
                ..
            } => {
                let request = parse_modifications(modifications).map_err(|reason| {
                    Error::OperationFailed {
                        index,
                        op_type: "modify_table".to_string(),
                        reason,
                    }
                })?;
                if options.dry_run {
                    tracing::info!(
                        "dry-run: would modify '{}' ({} change(s))",
                        table_name,
                        modifications.len()
                    );
                    return Ok(());
                }
                let billing = self
                    .resolve_billing(table_name, &request)
                    .map_err(|reason| Error::OperationFailed {
                        index,
                        op_type: "modify_table".to_string(),
                        reason,
                    })?;
                self.store.update_billing_mode(table_name, &billing)?;
                Ok(())
            }

            Operation::DeleteTable { table_name, .. } => {
                gate.confirm_operation(prompt, &operation.intent())?;
                if options.dry_run {
                    tracing::info!("dry-run: would delete table '{}'", table_name);
                    return Ok(());
                }
                self.store.delete_table(table_name)?;
                Ok(())
            }

            Operation::CreateIndex {
                table_name, index, ..
            } => {
                if options.dry_run {
                    tracing::info!(
                        "dry-run: would create index '{}' on '{}'",
                        index.index_name,
                        table_name
                    );
                    return Ok(());
                }
                // Index backfill is asynchronous; only the request is issued
                self.store.create_index(table_name, index)?;
                Ok(())
            }

            Operation::DeleteIndex {
                table_name,
                index_name,
                ..
            } => {
                gate.confirm_operation(prompt, &operation.intent())?;
                if options.dry_run {
                    tracing::info!(
                        "dry-run: would delete index '{}' on '{}'",
                        index_name,
                        table_name
                    );
                    return Ok(());
                }
                self.store.delete_index(table_name, index_name)?;
                Ok(())
            }

            Operation::UpdateCapacity {
                table_name,
                billing_mode,
                read_capacity,
                write_capacity,
                ..
            } => {
                let billing = match (billing_mode, read_capacity, write_capacity) {
                    (Some(BillingModeKind::PayPerRequest), _, _) => BillingMode::PayPerRequest,
                    (_, Some(read), Some(write)) => BillingMode::Provisioned {
                        read_capacity: *read,
                        write_capacity: *write,
                    },
                    _ => {
                        return Err(Error::OperationFailed {
                            index,
                            op_type: "update_capacity".to_string(),
                            reason: "provisioned capacity requires both read_capacity and write_capacity"
                                .to_string(),
                        })
                    }
                };
                if options.dry_run {
                    tracing::info!(
                        "dry-run: would set capacity of '{}' to {}",
                        table_name,
                        billing
                    );
                    return Ok(());
                }
                self.store.update_billing_mode(table_name, &billing)?;
                Ok(())
            }

            Operation::CustomScript {
                script_path, args, ..
            } => {
                if options.dry_run {
                    tracing::info!("dry-run: would run script '{}'", script_path);
                    return Ok(());
                }
                let context = ScriptContext::from_config(self.config, options.dry_run);
                let outcome = ScriptRunner::run(Path::new(script_path), args, &context)?;
                if outcome.success() {
                    Ok(())
                } else {
                    Err(Error::Script(format!(
                        "'{}' exited with {}: {}",
                        script_path,
                        outcome.exit_code,
                        outcome.stderr.trim()
                    )))
                }
            }
        }
    }

    /// Fold a parsed modification request into a concrete billing mode.
    /// Missing provisioned sides fall back to the table's current values.
    fn resolve_billing(
        &self,
        table_name: &str,
        request: &ModificationRequest,
    ) -> Result<BillingMode, String> {
        if let Some(BillingModeKind::PayPerRequest) = request.mode {
            return Ok(BillingMode::PayPerRequest);
        }
        let current = match self.store.describe_table(table_name) {
            Ok(description) => match description.definition.billing_mode {
                BillingMode::Provisioned {
                    read_capacity,
                    write_capacity,
                } => (read_capacity, write_capacity),
                BillingMode::PayPerRequest => (5, 5),
            },
            Err(e) => return Err(e.to_string()),
        };
        Ok(BillingMode::Provisioned {
            read_capacity: request.read.unwrap_or(current.0),
            write_capacity: request.write.unwrap_or(current.1),
        })
    }

    fn record(
        &self,
        migration_id: &str,
        document: &MigrationDocument,
        status: MigrationOutcome,
    ) -> Result<(), Error> {
        HistoryRecorder::new(self.store, self.config).record(
            migration_id,
            &document.version,
            &document.name,
            status,
        )?;
        Ok(())
    }

    fn transition(&self, state: RunState, migration_id: &str) {
        tracing::debug!(migration = migration_id, state = %state, "state transition");
    }

    fn abort(&self, migration_id: &str, reason: &str) {
        tracing::warn!(migration = migration_id, reason, "run aborted");
    }
}

/// Parsed `modify_table` modification set.
struct ModificationRequest {
    mode: Option<BillingModeKind>,
    read: Option<u64>,
    write: Option<u64>,
}

/// Dispatch each modification key to its handler. Unknown keys are
/// rejected, not ignored.
fn parse_modifications(
    modifications: &serde_json::Map<String, serde_json::Value>,
) -> Result<ModificationRequest, String> {
    let mut request = ModificationRequest {
        mode: None,
        read: None,
        write: None,
    };

    for (key, value) in modifications {
        match key.as_str() {
            "billing_mode" => {
                request.mode = Some(match value.as_str() {
                    Some("provisioned") => BillingModeKind::Provisioned,
                    Some("pay_per_request") => BillingModeKind::PayPerRequest,
                    other => return Err(format!("invalid billing_mode value: {:?}", other)),
                });
            }
            "read_capacity" => {
                request.read = Some(
                    value
                        .as_u64()
                        .ok_or_else(|| format!("read_capacity must be an integer: {}", value))?,
                );
            }
            "write_capacity" => {
                request.write = Some(
                    value
                        .as_u64()
                        .ok_or_else(|| format!("write_capacity must be an integer: {}", value))?,
                );
            }
            unknown => {
                return Err(format!("unknown modification key '{}'", unknown));
            }
        }
    }

    Ok(request)
}
