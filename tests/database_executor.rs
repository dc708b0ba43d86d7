// tests/database_executor.rs

use std::sync::Arc;

use rusqlite::Connection;
use tempfile::TempDir;
use scriptrunner::exec::{DatabaseExecutor, ExecutionContext, NamedConnection, ScriptExecutor};
use scriptrunner::params::{ParamValue, ParameterBag};
use scriptrunner::storage::{FsTempStorage, TempStorage};
use scriptrunner::types::ExecutionStatus;
use scriptrunner_test_utils::builders::{MetadataBuilder, ScriptTextBuilder};
use scriptrunner_test_utils::{init_tracing, with_timeout};

fn seeded_database(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("app.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT);
         INSERT INTO t (id, label) VALUES (6, 'six'), (7, 'seven'), (8, 'eight');",
    )
    .unwrap();
    path
}

fn remaining_ids(path: &std::path::Path) -> Vec<i64> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn.prepare("SELECT id FROM t ORDER BY id").unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[tokio::test]
async fn test_delete_with_substituted_parameter() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let db = seeded_database(&dir);
    let storage = Arc::new(FsTempStorage::new(dir.path().join("tmp")));
    let executor = DatabaseExecutor::new(
        vec![NamedConnection {
            name: "main".to_string(),
            connection_string: format!("Data Source={}", db.display()),
        }],
        storage.clone(),
    );

    let text = ScriptTextBuilder::new("purge", "Purge")
        .param("Id", "Int", &["Required: true"])
        .body("DELETE FROM t WHERE id = $(Id);\n")
        .build_sql();
    let script_path = storage.write(&text, ".sql").await.unwrap();
    let meta = MetadataBuilder::new("purge").source_path("purge.sql").build();
    let mut bag = ParameterBag::new();
    bag.insert("Id".to_string(), ParamValue::from("7"));

    let result = with_timeout(executor.execute(&meta, &ExecutionContext::new(&script_path, bag))).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded, "stderr: {}", result.stderr);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "[OK] 1 rows affected");
    assert_eq!(remaining_ids(&db), [6, 8]);
    assert!(!script_path.exists());
}

#[tokio::test]
async fn test_failing_statement_rolls_back_the_batch() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let db = seeded_database(&dir);
    let storage = Arc::new(FsTempStorage::new(dir.path().join("tmp")));
    let executor = DatabaseExecutor::new(Vec::new(), storage.clone());

    let sql = "DELETE FROM t WHERE id = {{Id}};\nINSERT INTO missing_table VALUES (1);\n";
    let script_path = storage.write(sql, ".sql").await.unwrap();
    let meta = MetadataBuilder::new("broken")
        .source_path("broken.sql")
        .connection_string(&format!("Data Source={}", db.display()))
        .build();
    let mut bag = ParameterBag::new();
    bag.insert("Id".to_string(), ParamValue::Int(6));

    let result = with_timeout(executor.execute(&meta, &ExecutionContext::new(&script_path, bag))).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.exit_code, -1);
    assert!(result.stderr.contains("missing_table"), "stderr: {}", result.stderr);
    assert_eq!(remaining_ids(&db), [6, 7, 8]);
    assert!(!script_path.exists());
}

#[tokio::test]
async fn test_missing_connection_fails_and_cleans_up() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(FsTempStorage::new(dir.path().join("tmp")));
    let executor = DatabaseExecutor::new(Vec::new(), storage.clone());

    let script_path = storage.write("SELECT 1;\n", ".sql").await.unwrap();
    let meta = MetadataBuilder::new("orphan").source_path("orphan.sql").build();

    let result = with_timeout(executor.execute(
        &meta,
        &ExecutionContext::new(&script_path, ParameterBag::new()),
    ))
    .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.stderr.contains("connection string missing"));
    assert!(!script_path.exists());
}
