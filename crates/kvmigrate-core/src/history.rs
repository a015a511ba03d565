//! Migration history.
//!
//! An append-only log of every applied (or attempted) migration, stored as
//! items in a history table inside the store being migrated. Identity is
//! the composite `(migration_id, applied_at)`, so repeated applications of
//! the same migration each get their own entry. Nothing here is ever
//! deleted or mutated.

use crate::config::EnvironmentConfig;
use crate::error::Error;
use crate::store::{TableDefinition, TableStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Bare name of the history table; the environment prefix is prepended.
pub const HISTORY_TABLE: &str = "schema_migrations";

/// Final status of a recorded migration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
    Applied,
    Failed,
    RolledBack,
}

impl std::fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationOutcome::Applied => write!(f, "applied"),
            MigrationOutcome::Failed => write!(f, "failed"),
            MigrationOutcome::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// One immutable history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub migration_id: String,
    /// RFC 3339 UTC timestamp; sort key of the history table.
    pub applied_at: String,
    pub version: String,
    pub name: String,
    pub status: MigrationOutcome,
    pub environment: String,
    pub region: String,
}

/// Appends to and reads the per-environment migration history.
pub struct HistoryRecorder<'a, S: TableStore> {
    store: &'a S,
    config: &'a EnvironmentConfig,
}

impl<'a, S: TableStore> HistoryRecorder<'a, S> {
    pub fn new(store: &'a S, config: &'a EnvironmentConfig) -> Self {
        Self { store, config }
    }

    /// Fully-prefixed history table name for this environment.
    pub fn table_name(&self) -> String {
        self.config.prefixed(HISTORY_TABLE)
    }

    /// Append one entry for a migration attempt.
    pub fn record(
        &self,
        migration_id: &str,
        version: &str,
        name: &str,
        status: MigrationOutcome,
    ) -> Result<HistoryEntry, Error> {
        self.ensure_table()?;

        let entry = HistoryEntry {
            migration_id: migration_id.to_string(),
            applied_at: Utc::now().to_rfc3339(),
            version: version.to_string(),
            name: name.to_string(),
            status,
            environment: self.config.environment.clone(),
            region: self.config.region.clone(),
        };

        self.store
            .put_item(&self.table_name(), &serde_json::to_value(&entry)?)?;
        tracing::info!(
            migration = migration_id,
            status = %status,
            "recorded migration history entry"
        );
        Ok(entry)
    }

    /// All entries for the current environment, oldest first.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>, Error> {
        let table = self.table_name();
        if !self.store.table_exists(&table)? {
            return Ok(Vec::new());
        }

        let mut entries: Vec<HistoryEntry> = self
            .store
            .scan(&table)?
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .filter(|e: &HistoryEntry| e.environment == self.config.environment)
            .collect();
        entries.sort_by(|a, b| a.applied_at.cmp(&b.applied_at));
        Ok(entries)
    }

    /// Migration ids with at least one `applied` entry.
    pub fn applied_ids(&self) -> Result<Vec<String>, Error> {
        let mut ids: Vec<String> = self
            .entries()?
            .into_iter()
            .filter(|e| e.status == MigrationOutcome::Applied)
            .map(|e| e.migration_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn ensure_table(&self) -> Result<(), Error> {
        let table = self.table_name();
        if !self.store.table_exists(&table)? {
            let definition =
                TableDefinition::simple("migration_id").with_sort_key("applied_at");
            self.store.create_table(&table, &definition)?;
        }
        Ok(())
    }
}
