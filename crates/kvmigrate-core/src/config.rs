//! Environment configuration.
//!
//! One [`EnvironmentConfig`] is constructed at startup and passed by
//! reference into every component; there is no ambient global state.

use std::path::PathBuf;

/// Name of the production environment.
pub const PRODUCTION_ENV: &str = "production";

/// Default directory containing migration documents.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Default root directory for backup snapshots.
pub const DEFAULT_BACKUP_ROOT: &str = "backups";

/// Endpoint of the target table store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Embedded sled store at this path.
    Local(PathBuf),
    /// Remote store URL (credentials are resolved ambiently).
    Remote(String),
}

/// Per-environment configuration, resolved once per process.
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// Environment name (e.g. "development", "staging", "production").
    pub environment: String,

    /// Region the target store lives in.
    pub region: String,

    /// Prefix every table name in this environment carries.
    pub table_prefix: String,

    /// Where the target store is reached.
    pub endpoint: Endpoint,

    /// Directory containing migration documents.
    pub migrations_dir: PathBuf,

    /// Root directory for backup snapshots.
    pub backup_root: PathBuf,
}

impl EnvironmentConfig {
    /// Build the configuration for a named environment with its defaults.
    pub fn for_environment(environment: impl Into<String>) -> Self {
        let environment = environment.into();
        let table_prefix = match environment.as_str() {
            PRODUCTION_ENV => "prod_".to_string(),
            "staging" => "staging_".to_string(),
            _ => "dev_".to_string(),
        };

        Self {
            region: "us-east-1".to_string(),
            table_prefix,
            endpoint: Endpoint::Local(PathBuf::from(".kvmigrate").join(&environment)),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            backup_root: PathBuf::from(DEFAULT_BACKUP_ROOT),
            environment,
        }
    }

    /// Set the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the table name prefix.
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Set the store endpoint.
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set the migrations directory.
    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the backup root directory.
    pub fn with_backup_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_root = dir.into();
        self
    }

    /// Whether this configuration targets production.
    pub fn is_production(&self) -> bool {
        self.environment == PRODUCTION_ENV
    }

    /// Prefix a bare table name for this environment.
    pub fn prefixed(&self, table: &str) -> String {
        format!("{}{}", self.table_prefix, table)
    }
}
