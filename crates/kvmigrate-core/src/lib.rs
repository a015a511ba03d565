//! kvmigrate core - schema and data migration engine for key-value table
//! stores.
//!
//! Migrations are JSON documents of ordered operations. This crate parses,
//! validates, and lints them, probes store permissions, produces execution
//! plans, snapshots affected tables, applies operations sequentially, and
//! records every attempt in a per-environment history table.

pub mod backup;
pub mod config;
pub mod document;
pub mod error;
pub mod executor;
pub mod history;
pub mod lint;
pub mod permissions;
pub mod plan;
pub mod safety;
pub mod script;
pub mod store;
pub mod validate;

pub use backup::{BackupManager, BackupManifest};
pub use config::{Endpoint, EnvironmentConfig, PRODUCTION_ENV};
pub use document::{
    generate, list_migration_files, next_sequence, MigrationDocument, MigrationFile, Operation,
    OperationMeta, RiskLevel, RollbackProcedure,
};
pub use error::Error;
pub use executor::{Engine, RunOptions, RunOutcome, RunState};
pub use history::{HistoryEntry, HistoryRecorder, MigrationOutcome, HISTORY_TABLE};
pub use lint::{LintReport, Linter};
pub use permissions::{PermissionProber, ProbeReport};
pub use plan::{ExecutionPlan, PlanStep, Planner};
pub use safety::{Prompt, SafetyGate, ScriptedPrompt, PRODUCTION_PHRASE};
pub use script::{ScriptContext, ScriptOutcome, ScriptRunner};
pub use store::{
    AttributeType, BillingMode, IndexDefinition, KeyAttribute, LocalStore, StoreError,
    TableDefinition, TableDescription, TableStatus, TableStore,
};
pub use validate::{SchemaValidator, ValidationReport};
