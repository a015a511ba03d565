//! Table store abstraction.
//!
//! The engine talks to the target key-value table store through the
//! [`TableStore`] trait: control-plane calls (create/describe/modify/delete
//! tables and indexes), a convergence wait, and the two data-plane calls the
//! backup and history subsystems need (scan, put-item). The sled-backed
//! [`LocalStore`] implements it for the local endpoint and for tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod local;

pub use local::LocalStore;

/// Errors surfaced by a table store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A table with this name already exists.
    #[error("table already exists: {0}")]
    TableExists(String),

    /// The named index does not exist on the table.
    #[error("index '{index}' not found on table '{table}'")]
    IndexNotFound { table: String, index: String },

    /// An index with this name already exists on the table.
    #[error("index '{index}' already exists on table '{table}'")]
    IndexExists { table: String, index: String },

    /// The executing principal lacks a capability.
    #[error("access denied: {capability}")]
    AccessDenied { capability: String },

    /// An item is missing the table's key attributes.
    #[error("item is missing key attribute '{attribute}'")]
    MissingKeyAttribute { attribute: String },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Backend(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Scalar type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Number,
    Binary,
}

/// A named key attribute (partition or sort key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    pub attr_type: AttributeType,
}

impl KeyAttribute {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }
}

/// Capacity mode of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum BillingMode {
    /// Explicit read/write capacity units.
    Provisioned {
        read_capacity: u64,
        write_capacity: u64,
    },
    /// On-demand capacity.
    PayPerRequest,
}

impl Default for BillingMode {
    fn default() -> Self {
        BillingMode::PayPerRequest
    }
}

impl std::fmt::Display for BillingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingMode::Provisioned {
                read_capacity,
                write_capacity,
            } => write!(f, "provisioned ({}r/{}w)", read_capacity, write_capacity),
            BillingMode::PayPerRequest => write!(f, "pay_per_request"),
        }
    }
}

/// A secondary index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub index_name: String,
    pub partition_key: KeyAttribute,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<KeyAttribute>,
}

/// Declarative table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub partition_key: KeyAttribute,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<KeyAttribute>,
    #[serde(default)]
    pub billing_mode: BillingMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_secondary_indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    /// Minimal definition: string partition key, on-demand capacity.
    pub fn simple(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: KeyAttribute::new(partition_key, AttributeType::String),
            sort_key: None,
            billing_mode: BillingMode::PayPerRequest,
            global_secondary_indexes: Vec::new(),
        }
    }

    /// Add a string sort key.
    pub fn with_sort_key(mut self, name: impl Into<String>) -> Self {
        self.sort_key = Some(KeyAttribute::new(name, AttributeType::String));
        self
    }

    /// Set the billing mode.
    pub fn with_billing_mode(mut self, billing_mode: BillingMode) -> Self {
        self.billing_mode = billing_mode;
        self
    }
}

/// Lifecycle status of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Creating,
    Active,
    Deleting,
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableStatus::Creating => write!(f, "creating"),
            TableStatus::Active => write!(f, "active"),
            TableStatus::Deleting => write!(f, "deleting"),
        }
    }
}

/// Full description of an existing table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescription {
    pub table_name: String,
    pub definition: TableDefinition,
    pub status: TableStatus,
    pub item_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Control-plane and data-plane interface to the target table store.
///
/// Implementations are expected to be synchronous; the engine executes
/// operations strictly sequentially and blocks on convergence waits.
pub trait TableStore {
    /// Create a table. Fails with [`StoreError::TableExists`] if present.
    fn create_table(&self, name: &str, definition: &TableDefinition) -> Result<(), StoreError>;

    /// Describe an existing table.
    fn describe_table(&self, name: &str) -> Result<TableDescription, StoreError>;

    /// Check whether a table exists.
    fn table_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// List all table names.
    fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    /// Delete a table and all of its data.
    fn delete_table(&self, name: &str) -> Result<(), StoreError>;

    /// Change a table's billing mode / provisioned capacity.
    fn update_billing_mode(&self, name: &str, billing: &BillingMode) -> Result<(), StoreError>;

    /// Add a secondary index. Backfill is asynchronous on real systems;
    /// this call only issues the request.
    fn create_index(&self, table: &str, index: &IndexDefinition) -> Result<(), StoreError>;

    /// Remove a secondary index.
    fn delete_index(&self, table: &str, index_name: &str) -> Result<(), StoreError>;

    /// Block until the table reaches the active state.
    fn wait_until_active(&self, name: &str) -> Result<(), StoreError>;

    /// Full scan of a table's items.
    fn scan(&self, table: &str) -> Result<Vec<serde_json::Value>, StoreError>;

    /// Write a single item. The item must carry the table's key attributes.
    fn put_item(&self, table: &str, item: &serde_json::Value) -> Result<(), StoreError>;

    /// Identity of the executing principal, for soft introspection probes.
    fn caller_identity(&self) -> Result<String, StoreError>;
}
