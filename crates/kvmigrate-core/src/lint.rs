//! Style and policy lints for migration documents.
//!
//! Warnings never block. Errors block, and only destructive operations
//! against production produce them.

use crate::config::EnvironmentConfig;
use crate::document::{MigrationDocument, Operation};

/// Minimum description length before the linter warns.
pub const MIN_DESCRIPTION_LEN: usize = 10;

/// Outcome of a lint run.
#[derive(Debug, Clone, Default)]
pub struct LintReport {
    /// Advisory findings; surfaced but never blocking.
    pub warnings: Vec<String>,
    /// Blocking findings; abort the pipeline before permission probing.
    pub errors: Vec<String>,
}

impl LintReport {
    pub fn is_blocked(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }
}

/// Lints a migration document against the current environment's policy.
pub struct Linter<'a> {
    config: &'a EnvironmentConfig,
}

impl<'a> Linter<'a> {
    pub fn new(config: &'a EnvironmentConfig) -> Self {
        Self { config }
    }

    /// Run all lint rules. `file_name` is the document's on-disk filename.
    pub fn lint(&self, document: &MigrationDocument, file_name: &str) -> LintReport {
        let mut report = LintReport::default();

        if !filename_follows_convention(file_name) {
            report.warnings.push(format!(
                "filename '{}' should match NNN_snake_case_name.json",
                file_name
            ));
        }

        if document.description.trim().len() < MIN_DESCRIPTION_LEN {
            report.warnings.push(format!(
                "description is shorter than {} characters",
                MIN_DESCRIPTION_LEN
            ));
        }

        for (index, operation) in document.operations.iter().enumerate() {
            if operation.is_destructive() {
                let finding = format!(
                    "operation {} ({}) is destructive: {}",
                    index,
                    operation.type_name(),
                    operation.intent()
                );
                if self.config.is_production() {
                    report
                        .errors
                        .push(format!("{} - blocked in production", finding));
                } else {
                    report.warnings.push(format!(
                        "{} - requires confirmation at execution time",
                        finding
                    ));
                }
            }

            if let Operation::CreateTable { table_name, .. } = operation {
                if !table_name.starts_with(&self.config.table_prefix) {
                    report.warnings.push(format!(
                        "operation {}: table '{}' does not carry the '{}' prefix",
                        index, table_name, self.config.table_prefix
                    ));
                }
            }
        }

        if self.config.is_production() && !document.backup_required {
            report.warnings.push(
                "production migration without backup_required: true (a backup is forced anyway)"
                    .to_string(),
            );
        }

        if document.rollback_procedure.is_none() {
            report
                .warnings
                .push("no rollback_procedure declared".to_string());
        }

        report
    }
}

/// `NNN_snake_case_name.json`: three-digit sequence prefix, snake_case rest.
fn filename_follows_convention(file_name: &str) -> bool {
    let Some(stem) = file_name.strip_suffix(".json") else {
        return false;
    };
    let bytes = stem.as_bytes();
    if bytes.len() < 5 {
        return false;
    }
    let digits_ok = bytes[..3].iter().all(u8::is_ascii_digit);
    let rest_ok = bytes[4..]
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'_');
    digits_ok && bytes[3] == b'_' && rest_ok
}
