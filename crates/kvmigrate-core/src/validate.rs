//! Structural and semantic validation of migration documents.
//!
//! The validator never mutates the document. After a successful parse it
//! accumulates every violation before reporting, so one run surfaces every
//! defect; malformed JSON is a single violation and stops all other checks.

use crate::config::EnvironmentConfig;
use crate::document::{MigrationDocument, MigrationFile, OPERATION_TYPES};
use serde_json::Value;

/// Modification keys `modify_table` supports.
const MODIFICATION_KEYS: &[&str] = &["billing_mode", "read_capacity", "write_capacity"];

/// Outcome of a validation run.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Ordered violation messages; empty means the document is valid.
    pub violations: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    fn push(&mut self, message: impl Into<String>) {
        self.violations.push(message.into());
    }
}

/// Validates a migration document against the current environment.
pub struct SchemaValidator<'a> {
    config: &'a EnvironmentConfig,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(config: &'a EnvironmentConfig) -> Self {
        Self { config }
    }

    /// Validate raw document source. Malformed JSON yields a single
    /// violation and no further checks execute.
    pub fn validate_source(&self, source: &str) -> ValidationReport {
        match serde_json::from_str::<Value>(source) {
            Ok(raw) => self.validate_value(&raw),
            Err(e) => {
                let mut report = ValidationReport::default();
                report.push(format!("malformed document: {}", e));
                report
            }
        }
    }

    /// Validate a loaded migration file.
    pub fn validate_file(&self, file: &MigrationFile) -> ValidationReport {
        self.validate_value(&file.raw)
    }

    /// Validate a parsed JSON document.
    pub fn validate_value(&self, raw: &Value) -> ValidationReport {
        let mut report = ValidationReport::default();

        let object = match raw.as_object() {
            Some(object) => object,
            None => {
                report.push("document must be a JSON object");
                return report;
            }
        };

        // Required top-level fields
        for field in ["version", "name", "description", "operations"] {
            if !object.contains_key(field) {
                report.push(format!("missing required field '{}'", field));
            }
        }

        // Version format
        if let Some(version) = object.get("version") {
            match version.as_str() {
                Some(v) if is_semver(v) => {}
                Some(v) => report.push(format!(
                    "version '{}' must match MAJOR.MINOR.PATCH",
                    v
                )),
                None => report.push("version must be a string"),
            }
        }

        // Operations list
        match object.get("operations").and_then(Value::as_array) {
            Some(operations) if operations.is_empty() => {
                report.push("no operations: 'operations' must be a non-empty list");
            }
            Some(operations) => {
                for (index, operation) in operations.iter().enumerate() {
                    self.check_operation(index, operation, &mut report);
                }
            }
            None => {
                if object.contains_key("operations") {
                    report.push("'operations' must be a list");
                }
            }
        }

        // Target environment vs current environment. A mismatch is a
        // violation so the caller decides explicitly instead of a silent
        // no-op.
        if let Some(target) = object.get("target_environment").and_then(Value::as_str) {
            if target != "all" && target != self.config.environment {
                report.push(format!(
                    "target_environment '{}' does not include current environment '{}'",
                    target, self.config.environment
                ));
            }
        }

        // Final check: must deserialize into the typed document
        if report.is_valid() {
            if let Err(e) = serde_json::from_value::<MigrationDocument>(raw.clone()) {
                report.push(format!("document does not deserialize: {}", e));
            }
        }

        report
    }

    fn check_operation(&self, index: usize, operation: &Value, report: &mut ValidationReport) {
        let object = match operation.as_object() {
            Some(object) => object,
            None => {
                report.push(format!("operation {}: must be an object", index));
                return;
            }
        };

        match object.get("type").and_then(Value::as_str) {
            Some(op_type) if OPERATION_TYPES.contains(&op_type) => {}
            Some(op_type) => {
                report.push(format!(
                    "operation {}: unknown operation type '{}'",
                    index, op_type
                ));
            }
            None => report.push(format!("operation {}: missing 'type'", index)),
        }

        if object.get("type").and_then(Value::as_str) == Some("modify_table") {
            if let Some(modifications) = object.get("modifications").and_then(Value::as_object) {
                for key in modifications.keys() {
                    if !MODIFICATION_KEYS.contains(&key.as_str()) {
                        report.push(format!(
                            "operation {}: unknown modification key '{}'",
                            index, key
                        ));
                    }
                }
            }
        }
    }
}

/// Strict `MAJOR.MINOR.PATCH` check.
fn is_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> EnvironmentConfig {
        EnvironmentConfig::for_environment("development")
    }

    fn valid_document() -> Value {
        json!({
            "version": "1.0.0",
            "name": "create users",
            "description": "Creates the users table",
            "operations": [
                {
                    "type": "create_table",
                    "table_name": "dev_users",
                    "table_definition": {
                        "partition_key": {"name": "id", "attr_type": "string"}
                    }
                }
            ]
        })
    }

    #[test]
    fn test_valid_document_passes() {
        let config = config();
        let report = SchemaValidator::new(&config).validate_value(&valid_document());
        assert!(report.is_valid(), "violations: {:?}", report.violations);
    }

    #[test]
    fn test_malformed_source_single_violation() {
        let config = config();
        let report = SchemaValidator::new(&config).validate_source("{oops");
        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].contains("malformed"));
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let config = config();
        let report = SchemaValidator::new(&config).validate_value(&json!({}));

        // One violation per missing required field, in one run
        assert_eq!(report.violations.len(), 4);
        assert!(report.violations[0].contains("version"));
        assert!(report.violations[3].contains("operations"));
    }

    #[test]
    fn test_bad_version_rejected() {
        let config = config();
        let validator = SchemaValidator::new(&config);

        for bad in ["1.0", "1.0.0-beta", "v1.0.0", "1..0", "a.b.c"] {
            let mut doc = valid_document();
            doc["version"] = json!(bad);
            let report = validator.validate_value(&doc);
            assert!(
                report.violations.iter().any(|v| v.contains("MAJOR.MINOR.PATCH")),
                "expected version violation for '{}'",
                bad
            );
        }
    }

    #[test]
    fn test_empty_operations_rejected() {
        let config = config();
        let mut doc = valid_document();
        doc["operations"] = json!([]);
        let report = SchemaValidator::new(&config).validate_value(&doc);
        assert!(report.violations.iter().any(|v| v.contains("no operations")));
    }

    #[test]
    fn test_unknown_operation_type_names_index() {
        let config = config();
        let mut doc = valid_document();
        doc["operations"]
            .as_array_mut()
            .unwrap()
            .push(json!({"type": "truncate_table", "table_name": "x"}));
        let report = SchemaValidator::new(&config).validate_value(&doc);
        assert!(report
            .violations
            .iter()
            .any(|v| v.contains("operation 1") && v.contains("truncate_table")));
    }

    #[test]
    fn test_unknown_modification_key_rejected() {
        let config = config();
        let mut doc = valid_document();
        doc["operations"].as_array_mut().unwrap().push(json!({
            "type": "modify_table",
            "table_name": "dev_users",
            "modifications": {"read_capacity": 10, "stream_specification": "NEW_IMAGE"}
        }));
        let report = SchemaValidator::new(&config).validate_value(&doc);
        assert!(report
            .violations
            .iter()
            .any(|v| v.contains("operation 1") && v.contains("stream_specification")));
    }

    #[test]
    fn test_environment_mismatch_is_violation() {
        let config = config();
        let mut doc = valid_document();
        doc["target_environment"] = json!("production");
        let report = SchemaValidator::new(&config).validate_value(&doc);
        assert!(!report.is_valid());
        assert!(report.violations[0].contains("target_environment"));
    }

    #[test]
    fn test_version_failure_independent_of_other_fields() {
        let config = config();
        let mut doc = valid_document();
        doc["version"] = json!("not-a-version");
        doc["operations"] = json!([]);
        let report = SchemaValidator::new(&config).validate_value(&doc);

        // Both defects are surfaced in a single run
        assert!(report.violations.len() >= 2);
    }

    #[test]
    fn test_is_semver() {
        assert!(is_semver("0.0.1"));
        assert!(is_semver("12.34.56"));
        assert!(!is_semver("1.2"));
        assert!(!is_semver("1.2.3.4"));
        assert!(!is_semver("1.2.x"));
    }
}
