//! Engine error taxonomy.

use crate::store::StoreError;
use thiserror::Error;

/// Errors produced by the migration engine.
///
/// Everything upstream of execution is recoverable by fixing the document
/// and re-running from scratch. An `OperationFailed` raised mid-execution
/// leaves the run in the failed state with no automatic rollback.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed document; no partial validation results exist.
    #[error("malformed migration document: {0}")]
    Structural(String),

    /// Validation violations, collected and reported in batch.
    #[error("validation failed: {} violation(s)", .0.len())]
    Validation(Vec<String>),

    /// Blocking lint errors (destructive operations in production).
    #[error("lint blocked execution: {} error(s)", .0.len())]
    LintBlocked(Vec<String>),

    /// The executing principal lacks required capabilities.
    #[error("missing permissions: {}", .0.join(", "))]
    PermissionDenied(Vec<String>),

    /// A table snapshot failed; execution never began.
    #[error("backup failed for table '{table}': {reason}")]
    BackupFailed { table: String, reason: String },

    /// An operation handler failed mid-execution.
    #[error("operation {index} ({op_type}) failed: {reason}")]
    OperationFailed {
        index: usize,
        op_type: String,
        reason: String,
    },

    /// Operator declined a confirmation prompt.
    #[error("confirmation declined by operator")]
    ConfirmationDeclined,

    /// The document declares no rollback procedure.
    #[error("migration '{0}' declares no rollback procedure")]
    MissingRollback(String),

    /// Custom script invocation failed.
    #[error("script error: {0}")]
    Script(String),

    /// Table store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_the_rule() {
        let err = Error::Validation(vec!["version must match X.Y.Z".to_string()]);
        assert!(err.to_string().contains("1 violation"));

        let err = Error::OperationFailed {
            index: 2,
            op_type: "delete_table".to_string(),
            reason: "table not found".to_string(),
        };
        assert!(err.to_string().contains("operation 2"));
        assert!(err.to_string().contains("delete_table"));
    }
}
