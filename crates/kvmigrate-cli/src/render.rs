//! Tabular rendering for listings.

use comfy_table::{Cell, Table};
use kvmigrate_core::HistoryEntry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Render the migration files with their applied status.
pub fn migrations_table(files: &[PathBuf], applied: &[String]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["File", "Migration", "Status"]);

    for path in files {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let migration_id = migration_id(path);
        let status = if applied.iter().any(|id| id == migration_id) {
            "applied"
        } else {
            "pending"
        };
        table.add_row(vec![
            Cell::new(file_name),
            Cell::new(migration_id),
            Cell::new(status),
        ]);
    }

    table
}

/// One line of the migration-status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub migration_id: String,
    /// "-" when the document no longer exists on disk.
    pub file_name: String,
    /// Latest recorded outcome, or "pending" when never attempted.
    pub status: String,
    /// "-" when never attempted.
    pub last_applied_at: String,
    pub version: String,
}

/// Merge the on-disk documents with the recorded history: every file gets
/// a row carrying its latest outcome, and history entries whose document
/// is gone still appear.
pub fn status_rows(files: &[PathBuf], entries: &[HistoryEntry]) -> Vec<StatusRow> {
    // Entries arrive oldest first, so the last insert per id wins.
    let mut latest: BTreeMap<&str, &HistoryEntry> = BTreeMap::new();
    for entry in entries {
        latest.insert(entry.migration_id.as_str(), entry);
    }

    let mut rows = Vec::new();
    for path in files {
        let id = migration_id(path);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        match latest.remove(id) {
            Some(entry) => rows.push(StatusRow {
                migration_id: id.to_string(),
                file_name,
                status: entry.status.to_string(),
                last_applied_at: entry.applied_at.clone(),
                version: entry.version.clone(),
            }),
            None => rows.push(StatusRow {
                migration_id: id.to_string(),
                file_name,
                status: "pending".to_string(),
                last_applied_at: "-".to_string(),
                version: "-".to_string(),
            }),
        }
    }

    // Recorded migrations whose document no longer exists on disk.
    for (id, entry) in latest {
        rows.push(StatusRow {
            migration_id: id.to_string(),
            file_name: "-".to_string(),
            status: entry.status.to_string(),
            last_applied_at: entry.applied_at.clone(),
            version: entry.version.clone(),
        });
    }

    rows
}

/// Render the merged migration-status report.
pub fn status_table(rows: &[StatusRow]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Migration",
        "File",
        "Status",
        "Last applied",
        "Version",
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(&row.migration_id),
            Cell::new(&row.file_name),
            Cell::new(&row.status),
            Cell::new(&row.last_applied_at),
            Cell::new(&row.version),
        ]);
    }

    table
}

fn migration_id(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or_default()
}
