//! Integration tests for the full migration pipeline.

use kvmigrate_core::{
    generate, list_migration_files, BillingMode, Engine, EnvironmentConfig, Error, HistoryRecorder,
    LocalStore, MigrationFile, MigrationOutcome, RunOptions, RunState, SchemaValidator,
    ScriptedPrompt, TableDefinition, TableStore, PRODUCTION_PHRASE,
};
use serde_json::json;
use std::fs;
use std::path::PathBuf;

struct TestContext {
    store: LocalStore,
    config: EnvironmentConfig,
    _dir: tempfile::TempDir,
}

impl TestContext {
    fn new(environment: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("store")).unwrap();
        let config = EnvironmentConfig::for_environment(environment)
            .with_migrations_dir(dir.path().join("migrations"))
            .with_backup_root(dir.path().join("backups"));
        fs::create_dir_all(&config.migrations_dir).unwrap();

        Self {
            store,
            config,
            _dir: dir,
        }
    }

    fn engine(&self) -> Engine<'_, LocalStore> {
        Engine::new(&self.store, &self.config)
    }

    fn write_migration(&self, file_name: &str, value: serde_json::Value) -> MigrationFile {
        let path = self.config.migrations_dir.join(file_name);
        fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
        MigrationFile::load(path).unwrap()
    }

    fn history(&self) -> HistoryRecorder<'_, LocalStore> {
        HistoryRecorder::new(&self.store, &self.config)
    }
}

fn orders_migration(prefix: &str) -> serde_json::Value {
    json!({
        "version": "1.0.0",
        "name": "create orders",
        "description": "Creates the orders table with a customer lookup index",
        "author": "platform",
        "backup_required": false,
        "operations": [
            {
                "type": "create_table",
                "table_name": format!("{prefix}orders"),
                "table_definition": {
                    "partition_key": {"name": "order_id", "attr_type": "string"},
                    "sort_key": {"name": "created_at", "attr_type": "string"},
                    "billing_mode": {"mode": "provisioned", "read_capacity": 10, "write_capacity": 5}
                },
                "description": "Orders keyed by id and creation time"
            },
            {
                "type": "create_index",
                "table_name": format!("{prefix}orders"),
                "index": {
                    "index_name": "by_customer",
                    "partition_key": {"name": "customer_id", "attr_type": "string"}
                }
            }
        ],
        "rollback_procedure": {
            "description": "Drop the orders table",
            "operations": [
                {"type": "delete_table", "table_name": format!("{prefix}orders")}
            ]
        }
    })
}

#[test]
fn test_full_apply_pipeline() {
    let ctx = TestContext::new("development");
    let file = ctx.write_migration("001_create_orders.json", orders_migration("dev_"));

    let outcome = ctx
        .engine()
        .apply(&file, &RunOptions::default(), &mut ScriptedPrompt::default())
        .unwrap();

    assert_eq!(outcome.state, RunState::Recorded);
    assert_eq!(outcome.operations_applied, 2);
    assert_eq!(outcome.plan.steps.len(), 2);

    let description = ctx.store.describe_table("dev_orders").unwrap();
    assert_eq!(
        description.definition.billing_mode,
        BillingMode::Provisioned {
            read_capacity: 10,
            write_capacity: 5
        }
    );
    assert_eq!(description.definition.global_secondary_indexes.len(), 1);

    let entries = ctx.history().entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, MigrationOutcome::Applied);
}

#[test]
fn test_applying_twice_warns_and_appends_history() {
    let ctx = TestContext::new("development");
    let file = ctx.write_migration("001_create_orders.json", orders_migration("dev_"));
    let engine = ctx.engine();

    engine
        .apply(&file, &RunOptions::default(), &mut ScriptedPrompt::default())
        .unwrap();
    let second = engine
        .apply(&file, &RunOptions::default(), &mut ScriptedPrompt::default())
        .unwrap();

    assert!(second
        .warnings
        .iter()
        .any(|w| w.contains("'dev_orders' already exists")));

    // History is append-only: one entry per attempt
    let entries = ctx.history().entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(ctx.history().applied_ids().unwrap(), vec!["001_create_orders"]);
}

#[test]
fn test_dry_run_makes_no_store_changes() {
    let ctx = TestContext::new("development");
    let file = ctx.write_migration("001_create_orders.json", orders_migration("dev_"));

    let options = RunOptions {
        dry_run: true,
        ..Default::default()
    };
    let outcome = ctx
        .engine()
        .apply(&file, &options, &mut ScriptedPrompt::default())
        .unwrap();

    assert!(outcome.plan.dry_run);
    assert!(outcome.backup_dir.is_none());
    assert!(ctx.store.list_tables().unwrap().is_empty());
    assert!(ctx.history().entries().unwrap().is_empty());
}

#[test]
fn test_backup_precedes_delete_and_preserves_data() {
    let ctx = TestContext::new("development");
    ctx.store
        .create_table("dev_legacy", &TableDefinition::simple("id"))
        .unwrap();
    for i in 0..3 {
        ctx.store
            .put_item("dev_legacy", &json!({"id": format!("row{i}"), "n": i}))
            .unwrap();
    }

    let file = ctx.write_migration(
        "002_drop_legacy.json",
        json!({
            "version": "1.0.0",
            "name": "drop legacy",
            "description": "Removes the legacy table after snapshotting it",
            "backup_required": true,
            "operations": [{"type": "delete_table", "table_name": "dev_legacy"}],
            "rollback_procedure": {"operations": []}
        }),
    );

    let outcome = ctx
        .engine()
        .apply(
            &file,
            &RunOptions::default(),
            &mut ScriptedPrompt::new(["y"]),
        )
        .unwrap();

    assert!(!ctx.store.table_exists("dev_legacy").unwrap());

    let backup_dir = outcome.backup_dir.expect("backup directory");
    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(backup_dir.join("manifest.json")).unwrap())
            .unwrap();
    assert_eq!(manifest["migration"], "002_drop_legacy");
    assert_eq!(manifest["tables"], json!(["dev_legacy"]));

    let data: Vec<serde_json::Value> =
        serde_json::from_str(&fs::read_to_string(backup_dir.join("dev_legacy.data.json")).unwrap())
            .unwrap();
    assert_eq!(data.len(), 3);
}

#[test]
fn test_production_requires_phrase_twice() {
    let ctx = TestContext::new("production");
    let file = ctx.write_migration("001_create_orders.json", orders_migration("prod_"));
    let engine = ctx.engine();

    // Wrong phrase at the first gate
    let result = engine.apply(
        &file,
        &RunOptions::default(),
        &mut ScriptedPrompt::new(["yes please"]),
    );
    assert!(matches!(result, Err(Error::ConfirmationDeclined)));
    assert!(ctx.store.list_tables().unwrap().is_empty());

    // Correct phrase only once: aborts at the post-plan gate
    let result = engine.apply(
        &file,
        &RunOptions::default(),
        &mut ScriptedPrompt::new([PRODUCTION_PHRASE]),
    );
    assert!(matches!(result, Err(Error::ConfirmationDeclined)));
    assert!(ctx.store.list_tables().unwrap().is_empty());

    // Phrase at both gates: production always takes a backup
    let outcome = engine
        .apply(
            &file,
            &RunOptions::default(),
            &mut ScriptedPrompt::new([PRODUCTION_PHRASE, PRODUCTION_PHRASE]),
        )
        .unwrap();
    assert_eq!(outcome.state, RunState::Recorded);
    assert!(ctx.store.table_exists("prod_orders").unwrap());
}

#[test]
fn test_environment_targeting_is_enforced() {
    let ctx = TestContext::new("development");
    let mut doc = orders_migration("staging_");
    doc["target_environment"] = json!("staging");
    let file = ctx.write_migration("001_create_orders.json", doc);

    let result = ctx.engine().apply(
        &file,
        &RunOptions::default(),
        &mut ScriptedPrompt::default(),
    );
    match result {
        Err(Error::Validation(violations)) => {
            assert!(violations.iter().any(|v| v.contains("staging")));
        }
        other => panic!("expected validation failure, got {:?}", other.is_ok()),
    }
}

#[test]
fn test_rollback_restores_and_records() {
    let ctx = TestContext::new("development");
    let file = ctx.write_migration("001_create_orders.json", orders_migration("dev_"));
    let engine = ctx.engine();

    engine
        .apply(&file, &RunOptions::default(), &mut ScriptedPrompt::default())
        .unwrap();
    engine
        .rollback(
            &file,
            &RunOptions::default(),
            &mut ScriptedPrompt::new(["y"]),
        )
        .unwrap();

    assert!(!ctx.store.table_exists("dev_orders").unwrap());

    let entries = ctx.history().entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status, MigrationOutcome::Applied);
    assert_eq!(entries[1].status, MigrationOutcome::RolledBack);
}

#[test]
fn test_generate_then_validate_then_apply() {
    let ctx = TestContext::new("development");

    let path = generate(&ctx.config.migrations_dir, "Add Sessions Table", "ops").unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "001_add_sessions_table.json"
    );

    // The generated skeleton has no operations yet
    let file = MigrationFile::load(path.clone()).unwrap();
    let report = SchemaValidator::new(&ctx.config).validate_file(&file);
    assert!(!report.is_valid());
    assert!(report.violations.iter().any(|v| v.contains("no operations")));

    // Fill in an operation and the pipeline accepts it
    let mut doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    doc["operations"] = json!([{
        "type": "create_table",
        "table_name": "dev_sessions",
        "table_definition": {"partition_key": {"name": "sid", "attr_type": "string"}}
    }]);
    fs::write(&path, doc.to_string()).unwrap();

    let file = MigrationFile::load(path).unwrap();
    ctx.engine()
        .apply(&file, &RunOptions::default(), &mut ScriptedPrompt::default())
        .unwrap();
    assert!(ctx.store.table_exists("dev_sessions").unwrap());

    // Sequence numbering continues from the highest existing file
    let next = generate(&ctx.config.migrations_dir, "second", "ops").unwrap();
    assert!(next.file_name().unwrap().to_str().unwrap().starts_with("002_"));
}

#[test]
fn test_migration_files_listed_in_order() {
    let ctx = TestContext::new("development");
    ctx.write_migration("002_second.json", orders_migration("dev_"));
    ctx.write_migration("001_first.json", orders_migration("dev_"));
    fs::write(ctx.config.migrations_dir.join("notes.txt"), "ignored").unwrap();

    let files: Vec<PathBuf> = list_migration_files(&ctx.config.migrations_dir).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["001_first.json", "002_second.json"]);
}

#[test]
fn test_failed_operation_stops_midway_and_is_recorded() {
    let ctx = TestContext::new("development");
    let file = ctx.write_migration(
        "003_partial.json",
        json!({
            "version": "1.0.0",
            "name": "partial",
            "description": "Second operation targets a table that does not exist",
            "operations": [
                {
                    "type": "create_table",
                    "table_name": "dev_a",
                    "table_definition": {"partition_key": {"name": "id", "attr_type": "string"}}
                },
                {
                    "type": "update_capacity",
                    "table_name": "dev_missing",
                    "read_capacity": 5,
                    "write_capacity": 5
                }
            ]
        }),
    );

    let result = ctx.engine().apply(
        &file,
        &RunOptions::default(),
        &mut ScriptedPrompt::default(),
    );
    match result {
        Err(Error::OperationFailed { index, op_type, .. }) => {
            assert_eq!(index, 1);
            assert_eq!(op_type, "update_capacity");
        }
        other => panic!("expected operation failure, got {:?}", other.is_ok()),
    }

    // The first operation already converged; there is no automatic rollback
    assert!(ctx.store.table_exists("dev_a").unwrap());

    let entries = ctx.history().entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, MigrationOutcome::Failed);
}
