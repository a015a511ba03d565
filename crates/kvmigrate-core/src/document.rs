//! Migration document model.
//!
//! A migration document is the declarative unit of change: metadata, an
//! ordered list of operations, and an optional author-supplied rollback
//! procedure. Documents are JSON files named `NNN_snake_case_name.json`
//! under the migrations directory; the filename stem is the migration id.

use crate::error::Error;
use crate::store::{IndexDefinition, TableDefinition};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The closed set of operation type tags.
pub const OPERATION_TYPES: &[&str] = &[
    "create_table",
    "modify_table",
    "delete_table",
    "create_index",
    "delete_index",
    "update_capacity",
    "custom_script",
];

/// Advisory risk level of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Low
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Advisory metadata carried by every operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationMeta {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<String>,
}

/// Target billing mode named by an `update_capacity` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingModeKind {
    Provisioned,
    PayPerRequest,
}

/// One atomic directive within a migration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    CreateTable {
        table_name: String,
        table_definition: TableDefinition,
        #[serde(flatten)]
        meta: OperationMeta,
    },
    ModifyTable {
        table_name: String,
        modifications: serde_json::Map<String, serde_json::Value>,
        #[serde(flatten)]
        meta: OperationMeta,
    },
    DeleteTable {
        table_name: String,
        #[serde(flatten)]
        meta: OperationMeta,
    },
    CreateIndex {
        table_name: String,
        index: IndexDefinition,
        #[serde(flatten)]
        meta: OperationMeta,
    },
    DeleteIndex {
        table_name: String,
        index_name: String,
        #[serde(flatten)]
        meta: OperationMeta,
    },
    UpdateCapacity {
        table_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        billing_mode: Option<BillingModeKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        read_capacity: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        write_capacity: Option<u64>,
        #[serde(flatten)]
        meta: OperationMeta,
    },
    CustomScript {
        script_path: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(flatten)]
        meta: OperationMeta,
    },
}

impl Operation {
    /// The operation's type tag as it appears in documents.
    pub fn type_name(&self) -> &'static str {
        match self {
            Operation::CreateTable { .. } => "create_table",
            Operation::ModifyTable { .. } => "modify_table",
            Operation::DeleteTable { .. } => "delete_table",
            Operation::CreateIndex { .. } => "create_index",
            Operation::DeleteIndex { .. } => "delete_index",
            Operation::UpdateCapacity { .. } => "update_capacity",
            Operation::CustomScript { .. } => "custom_script",
        }
    }

    /// Advisory metadata.
    pub fn meta(&self) -> &OperationMeta {
        match self {
            Operation::CreateTable { meta, .. } => meta,
            Operation::ModifyTable { meta, .. } => meta,
            Operation::DeleteTable { meta, .. } => meta,
            Operation::CreateIndex { meta, .. } => meta,
            Operation::DeleteIndex { meta, .. } => meta,
            Operation::UpdateCapacity { meta, .. } => meta,
            Operation::CustomScript { meta, .. } => meta,
        }
    }

    /// The table this operation touches, if any.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            Operation::CreateTable { table_name, .. }
            | Operation::ModifyTable { table_name, .. }
            | Operation::DeleteTable { table_name, .. }
            | Operation::CreateIndex { table_name, .. }
            | Operation::DeleteIndex { table_name, .. }
            | Operation::UpdateCapacity { table_name, .. } => Some(table_name),
            Operation::CustomScript { .. } => None,
        }
    }

    /// Whether the operation destroys structures or data.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Operation::DeleteTable { .. } | Operation::DeleteIndex { .. }
        )
    }

    /// Minimum risk level inherent to this operation type.
    pub fn inherent_risk(&self) -> RiskLevel {
        match self {
            Operation::DeleteTable { .. } | Operation::DeleteIndex { .. } => RiskLevel::High,
            Operation::ModifyTable { .. }
            | Operation::UpdateCapacity { .. }
            | Operation::CustomScript { .. } => RiskLevel::Medium,
            Operation::CreateTable { .. } | Operation::CreateIndex { .. } => RiskLevel::Low,
        }
    }

    /// Effective risk: the worse of declared and inherent risk.
    pub fn risk(&self) -> RiskLevel {
        self.meta().risk_level.max(self.inherent_risk())
    }

    /// Human-readable intent of this operation.
    pub fn intent(&self) -> String {
        match self {
            Operation::CreateTable { table_name, .. } => {
                format!("Create table '{}'", table_name)
            }
            Operation::ModifyTable {
                table_name,
                modifications,
                ..
            } => {
                let keys: Vec<&str> = modifications.keys().map(String::as_str).collect();
                format!("Modify table '{}' ({})", table_name, keys.join(", "))
            }
            Operation::DeleteTable { table_name, .. } => {
                format!("Delete table '{}'", table_name)
            }
            Operation::CreateIndex {
                table_name, index, ..
            } => {
                format!("Create index '{}' on '{}'", index.index_name, table_name)
            }
            Operation::DeleteIndex {
                table_name,
                index_name,
                ..
            } => {
                format!("Delete index '{}' on '{}'", index_name, table_name)
            }
            Operation::UpdateCapacity { table_name, .. } => {
                format!("Update capacity of '{}'", table_name)
            }
            Operation::CustomScript { script_path, .. } => {
                format!("Run script '{}'", script_path)
            }
        }
    }
}

/// Author-supplied inverse operation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackProcedure {
    #[serde(default)]
    pub description: String,
    pub operations: Vec<Operation>,
}

/// The declarative unit of change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationDocument {
    /// Strict `MAJOR.MINOR.PATCH`.
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub created_at: String,
    /// `all` or a specific environment name.
    #[serde(default = "default_target_environment")]
    pub target_environment: String,
    /// Forced `true` at execution time against production.
    #[serde(default)]
    pub backup_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<String>,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_procedure: Option<RollbackProcedure>,
    /// Display-only checklist; never executed automatically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_steps: Option<Vec<String>>,
}

fn default_target_environment() -> String {
    "all".to_string()
}

impl MigrationDocument {
    /// Whether the document applies to the given environment.
    pub fn targets_environment(&self, environment: &str) -> bool {
        self.target_environment == "all" || self.target_environment == environment
    }

    /// Whether any operation is destructive.
    pub fn has_destructive_operations(&self) -> bool {
        self.operations.iter().any(Operation::is_destructive)
    }
}

/// A migration document file on disk, parsed to raw JSON.
///
/// The raw value is kept so the validator can report every structural
/// defect instead of stopping at the first bad operation tag.
#[derive(Debug, Clone)]
pub struct MigrationFile {
    pub path: PathBuf,
    /// Filename stem, e.g. `001_create_users`.
    pub migration_id: String,
    pub raw: serde_json::Value,
}

impl MigrationFile {
    /// Load a migration file. Malformed JSON is a structural error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let source = fs::read_to_string(&path)?;
        let raw: serde_json::Value =
            serde_json::from_str(&source).map_err(|e| Error::Structural(e.to_string()))?;
        let migration_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path,
            migration_id,
            raw,
        })
    }

    /// Filename including extension.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Deserialize into the typed document.
    pub fn parse(&self) -> Result<MigrationDocument, Error> {
        serde_json::from_value(self.raw.clone()).map_err(|e| Error::Structural(e.to_string()))
    }
}

/// List migration files in a directory, sorted by filename.
pub fn list_migration_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Next unused zero-padded sequence number in a migrations directory.
pub fn next_sequence(dir: &Path) -> Result<u32, Error> {
    let mut max = 0u32;
    for path in list_migration_files(dir)? {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if let Some(seq) = stem.get(..3).and_then(|p| p.parse::<u32>().ok()) {
                max = max.max(seq);
            }
        }
    }
    Ok(max + 1)
}

/// Generate a new migration document skeleton and write it to disk.
///
/// Returns the path of the generated `NNN_snake_case_name.json` file.
pub fn generate(dir: &Path, name: &str, author: &str) -> Result<PathBuf, Error> {
    let seq = next_sequence(dir)?;
    let snake = to_snake_case(name);
    let path = dir.join(format!("{:03}_{}.json", seq, snake));

    let document = MigrationDocument {
        version: "1.0.0".to_string(),
        name: name.to_string(),
        description: format!("TODO: describe what '{}' changes and why", name),
        author: author.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        target_environment: "all".to_string(),
        backup_required: false,
        estimated_duration: None,
        operations: Vec::new(),
        rollback_procedure: Some(RollbackProcedure {
            description: "Reverse the changes above".to_string(),
            operations: Vec::new(),
        }),
        validation_steps: None,
    };

    fs::create_dir_all(dir)?;
    fs::write(&path, serde_json::to_string_pretty(&document)?)?;
    Ok(path)
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document_json() -> serde_json::Value {
        json!({
            "version": "1.0.0",
            "name": "create users table",
            "description": "Creates the users table with an email index",
            "author": "ops",
            "created_at": "2025-01-10T00:00:00Z",
            "target_environment": "all",
            "backup_required": true,
            "operations": [
                {
                    "type": "create_table",
                    "table_name": "dev_users",
                    "table_definition": {
                        "partition_key": {"name": "id", "attr_type": "string"}
                    },
                    "description": "base table",
                    "risk_level": "low"
                },
                {
                    "type": "delete_index",
                    "table_name": "dev_users",
                    "index_name": "by_email",
                    "risk_level": "medium"
                }
            ],
            "rollback_procedure": {
                "description": "drop the table",
                "operations": [
                    {"type": "delete_table", "table_name": "dev_users"}
                ]
            }
        })
    }

    #[test]
    fn test_parse_document() {
        let doc: MigrationDocument =
            serde_json::from_value(sample_document_json()).unwrap();

        assert_eq!(doc.version, "1.0.0");
        assert_eq!(doc.operations.len(), 2);
        assert!(doc.backup_required);
        assert!(doc.rollback_procedure.is_some());
        assert!(doc.targets_environment("staging"));

        match &doc.operations[0] {
            Operation::CreateTable { table_name, .. } => assert_eq!(table_name, "dev_users"),
            other => panic!("unexpected operation: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_operation_type_fails_parse() {
        let mut value = sample_document_json();
        value["operations"][0]["type"] = json!("truncate_table");
        let result: Result<MigrationDocument, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[test]
    fn test_operation_risk_floors() {
        let doc: MigrationDocument =
            serde_json::from_value(sample_document_json()).unwrap();

        // Declared low, inherent low
        assert_eq!(doc.operations[0].risk(), RiskLevel::Low);
        // Declared medium, but delete_index is inherently high
        assert_eq!(doc.operations[1].risk(), RiskLevel::High);
        assert!(doc.operations[1].is_destructive());
        assert!(doc.has_destructive_operations());
    }

    #[test]
    fn test_operation_intent() {
        let doc: MigrationDocument =
            serde_json::from_value(sample_document_json()).unwrap();
        assert_eq!(doc.operations[0].intent(), "Create table 'dev_users'");
        assert_eq!(
            doc.operations[1].intent(),
            "Delete index 'by_email' on 'dev_users'"
        );
    }

    #[test]
    fn test_target_environment_default() {
        let doc: MigrationDocument = serde_json::from_value(json!({
            "version": "1.0.0",
            "name": "x",
            "operations": []
        }))
        .unwrap();
        assert_eq!(doc.target_environment, "all");
    }

    #[test]
    fn test_load_and_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("001_create_users.json");
        std::fs::write(&path, sample_document_json().to_string()).unwrap();

        let file = MigrationFile::load(&path).unwrap();
        assert_eq!(file.migration_id, "001_create_users");
        assert_eq!(file.file_name(), "001_create_users.json");

        let doc = file.parse().unwrap();
        assert_eq!(doc.name, "create users table");
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("001_bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = MigrationFile::load(&path);
        assert!(matches!(result, Err(Error::Structural(_))));
    }

    #[test]
    fn test_next_sequence_and_generate() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_sequence(dir.path()).unwrap(), 1);

        let first = generate(dir.path(), "Create Users Table", "ops").unwrap();
        assert!(first.ends_with("001_create_users_table.json"));

        let second = generate(dir.path(), "add email index", "ops").unwrap();
        assert!(second.ends_with("002_add_email_index.json"));

        // Generated skeleton parses back
        let file = MigrationFile::load(&second).unwrap();
        let doc = file.parse().unwrap();
        assert_eq!(doc.version, "1.0.0");
        assert!(doc.rollback_procedure.is_some());
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("Create Users Table"), "create_users_table");
        assert_eq!(to_snake_case("add-email.index"), "add_email_index");
        assert_eq!(to_snake_case("  spaced  out  "), "spaced_out");
    }
}
