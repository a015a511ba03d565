//! Pre-execution backups.
//!
//! Snapshots the schema and full data of every table a migration touches
//! into a timestamped, migration-named directory with a manifest. No
//! backup, no migration: a single snapshot failure aborts the run before
//! execution begins.

use crate::config::EnvironmentConfig;
use crate::document::MigrationDocument;
use crate::error::Error;
use crate::store::TableStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest written alongside every backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub migration: String,
    pub source_file: String,
    pub environment: String,
    pub region: String,
    /// Tables captured in this backup.
    pub tables: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Captures pre-execution snapshots.
pub struct BackupManager<'a, S: TableStore> {
    store: &'a S,
    config: &'a EnvironmentConfig,
}

impl<'a, S: TableStore> BackupManager<'a, S> {
    pub fn new(store: &'a S, config: &'a EnvironmentConfig) -> Self {
        Self { store, config }
    }

    /// Deduplicated list of tables the document touches, in first-use order.
    /// Custom scripts contribute none.
    pub fn affected_tables(document: &MigrationDocument) -> Vec<String> {
        let mut tables = Vec::new();
        for operation in &document.operations {
            if let Some(name) = operation.table_name() {
                if !tables.iter().any(|t| t == name) {
                    tables.push(name.to_string());
                }
            }
        }
        tables
    }

    /// Snapshot every affected table that exists. Returns the backup
    /// directory. Tables the migration is about to create are skipped;
    /// a failure on any existing table aborts.
    pub fn create_backup(
        &self,
        migration_id: &str,
        document: &MigrationDocument,
        source_file: &Path,
    ) -> Result<PathBuf, Error> {
        let timestamp = Utc::now();
        let dir = self.config.backup_root.join(format!(
            "{}_{}",
            migration_id,
            timestamp.format("%Y%m%dT%H%M%SZ")
        ));
        fs::create_dir_all(&dir)?;

        let mut captured = Vec::new();
        for table in Self::affected_tables(document) {
            let exists = self
                .store
                .table_exists(&table)
                .map_err(|e| Error::BackupFailed {
                    table: table.clone(),
                    reason: e.to_string(),
                })?;
            if !exists {
                tracing::debug!(table = %table, "skipping backup of nonexistent table");
                continue;
            }
            self.snapshot_table(&table, &dir)?;
            captured.push(table);
        }

        let manifest = BackupManifest {
            migration: migration_id.to_string(),
            source_file: source_file.display().to_string(),
            environment: self.config.environment.clone(),
            region: self.config.region.clone(),
            tables: captured,
            created_at: timestamp,
        };
        fs::write(
            dir.join("manifest.json"),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        tracing::info!(dir = %dir.display(), tables = manifest.tables.len(), "backup complete");
        Ok(dir)
    }

    fn snapshot_table(&self, table: &str, dir: &Path) -> Result<(), Error> {
        let description = self
            .store
            .describe_table(table)
            .map_err(|e| Error::BackupFailed {
                table: table.to_string(),
                reason: e.to_string(),
            })?;
        let items = self.store.scan(table).map_err(|e| Error::BackupFailed {
            table: table.to_string(),
            reason: e.to_string(),
        })?;

        fs::write(
            dir.join(format!("{}.schema.json", table)),
            serde_json::to_string_pretty(&description)?,
        )?;
        fs::write(
            dir.join(format!("{}.data.json", table)),
            serde_json::to_string_pretty(&items)?,
        )?;

        tracing::debug!(table = %table, items = items.len(), "captured table snapshot");
        Ok(())
    }
}
