//! Sled-backed table store for the local endpoint.
//!
//! Table descriptions live in a metadata tree; each table's items live in
//! their own tree, keyed by the encoded partition (and optional sort) key.
//! Local tables converge instantly, so `wait_until_active` only verifies
//! the table is present and active.

use super::{
    BillingMode, IndexDefinition, StoreError, TableDefinition, TableDescription, TableStatus,
    TableStore,
};
use chrono::Utc;
use std::path::Path;

const META_TREE: &str = "meta:tables";
const DATA_TREE_PREFIX: &str = "data:";

/// Embedded sled-backed implementation of [`TableStore`].
pub struct LocalStore {
    db: sled::Db,
    meta: sled::Tree,
}

impl LocalStore {
    /// Open (or create) a local store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let meta = db.open_tree(META_TREE)?;
        Ok(Self { db, meta })
    }

    fn data_tree(&self, table: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(format!("{DATA_TREE_PREFIX}{table}"))?)
    }

    fn load_description(&self, name: &str) -> Result<TableDescription, StoreError> {
        match self.meta.get(name.as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(StoreError::TableNotFound(name.to_string())),
        }
    }

    fn save_description(&self, description: &TableDescription) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(description)?;
        self.meta
            .insert(description.table_name.as_bytes(), bytes)?;
        Ok(())
    }

    /// Encode an item's primary key from its key attribute values.
    fn item_key(
        definition: &TableDefinition,
        item: &serde_json::Value,
    ) -> Result<Vec<u8>, StoreError> {
        let pk_name = definition.partition_key.name.as_str();
        let pk = item.get(pk_name).ok_or_else(|| StoreError::MissingKeyAttribute {
            attribute: pk_name.to_string(),
        })?;

        let mut key = pk.to_string().into_bytes();
        if let Some(sort_key) = &definition.sort_key {
            let sk = item
                .get(sort_key.name.as_str())
                .ok_or_else(|| StoreError::MissingKeyAttribute {
                    attribute: sort_key.name.clone(),
                })?;
            key.push(0);
            key.extend_from_slice(sk.to_string().as_bytes());
        }
        Ok(key)
    }
}

impl TableStore for LocalStore {
    fn create_table(&self, name: &str, definition: &TableDefinition) -> Result<(), StoreError> {
        if self.meta.contains_key(name.as_bytes())? {
            return Err(StoreError::TableExists(name.to_string()));
        }

        let description = TableDescription {
            table_name: name.to_string(),
            definition: definition.clone(),
            status: TableStatus::Active,
            item_count: 0,
            created_at: Utc::now(),
        };
        self.save_description(&description)?;
        tracing::debug!(table = name, "created local table");
        Ok(())
    }

    fn describe_table(&self, name: &str) -> Result<TableDescription, StoreError> {
        let mut description = self.load_description(name)?;
        description.item_count = self.data_tree(name)?.len() as u64;
        Ok(description)
    }

    fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.meta.contains_key(name.as_bytes())?)
    }

    fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in self.meta.iter() {
            let (key, _) = entry?;
            names.push(String::from_utf8_lossy(&key).into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn delete_table(&self, name: &str) -> Result<(), StoreError> {
        if self.meta.remove(name.as_bytes())?.is_none() {
            return Err(StoreError::TableNotFound(name.to_string()));
        }
        self.db.drop_tree(format!("{DATA_TREE_PREFIX}{name}"))?;
        tracing::debug!(table = name, "deleted local table");
        Ok(())
    }

    fn update_billing_mode(&self, name: &str, billing: &BillingMode) -> Result<(), StoreError> {
        let mut description = self.load_description(name)?;
        description.definition.billing_mode = billing.clone();
        self.save_description(&description)
    }

    fn create_index(&self, table: &str, index: &IndexDefinition) -> Result<(), StoreError> {
        let mut description = self.load_description(table)?;
        if description
            .definition
            .global_secondary_indexes
            .iter()
            .any(|i| i.index_name == index.index_name)
        {
            return Err(StoreError::IndexExists {
                table: table.to_string(),
                index: index.index_name.clone(),
            });
        }
        description
            .definition
            .global_secondary_indexes
            .push(index.clone());
        self.save_description(&description)
    }

    fn delete_index(&self, table: &str, index_name: &str) -> Result<(), StoreError> {
        let mut description = self.load_description(table)?;
        let before = description.definition.global_secondary_indexes.len();
        description
            .definition
            .global_secondary_indexes
            .retain(|i| i.index_name != index_name);
        if description.definition.global_secondary_indexes.len() == before {
            return Err(StoreError::IndexNotFound {
                table: table.to_string(),
                index: index_name.to_string(),
            });
        }
        self.save_description(&description)
    }

    fn wait_until_active(&self, name: &str) -> Result<(), StoreError> {
        // Local tables are active as soon as they are created.
        let description = self.load_description(name)?;
        debug_assert_eq!(description.status, TableStatus::Active);
        Ok(())
    }

    fn scan(&self, table: &str) -> Result<Vec<serde_json::Value>, StoreError> {
        if !self.table_exists(table)? {
            return Err(StoreError::TableNotFound(table.to_string()));
        }
        let tree = self.data_tree(table)?;
        let mut items = Vec::new();
        for entry in tree.iter() {
            let (_, value) = entry?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }

    fn put_item(&self, table: &str, item: &serde_json::Value) -> Result<(), StoreError> {
        let description = self.load_description(table)?;
        let key = Self::item_key(&description.definition, item)?;
        let tree = self.data_tree(table)?;
        tree.insert(key, serde_json::to_vec(item)?)?;
        Ok(())
    }

    fn caller_identity(&self) -> Result<String, StoreError> {
        Ok("local".to_string())
    }
}
