mod common;

use common::Item;
use graphkeep_core::db::migrations::latest_version;
use graphkeep_core::db::{open_store, open_store_in_memory, DbError, ValueTransformers};
use graphkeep_core::{Coordinator, QuerySpec, StorageLocation, StoreConfig, StoreLocator};
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn table_exists(conn: &Connection, table: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1;",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        == 1
}

#[test]
fn open_store_applies_latest_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Model.sqlite");

    let conn = open_store(&path, None).unwrap();
    let version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, latest_version());
    assert!(table_exists(&conn, "objects"));
    assert!(path.exists());
}

#[test]
fn open_store_rejects_newer_schema_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Model.sqlite");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("PRAGMA user_version = 99;").unwrap();
    }

    let err = open_store(&path, None).unwrap_err();
    assert!(matches!(
        err,
        DbError::UnsupportedSchemaVersion {
            db_version: 99,
            ..
        }
    ));
}

#[test]
fn value_transformers_run_before_schema_work() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let hook: Box<ValueTransformers> = Box::new(move |conn: &Connection| {
        counter.fetch_add(1, Ordering::SeqCst);
        conn.execute_batch("CREATE TEMP TABLE transformer_marker (value TEXT);")
    });

    let conn = open_store_in_memory(Some(hook.as_ref())).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    conn.execute("INSERT INTO transformer_marker (value) VALUES ('ok');", [])
        .unwrap();
}

#[test]
fn failing_value_transformers_abort_open() {
    let hook: Box<ValueTransformers> = Box::new(|_: &Connection| Err(rusqlite::Error::InvalidQuery));

    let err = open_store_in_memory(Some(hook.as_ref())).unwrap_err();
    assert!(matches!(err, DbError::Transformers(_)));
}

#[test]
fn coordinator_resolves_and_reopens_on_disk_store() {
    let dir = tempfile::tempdir().unwrap();
    let locator = StoreLocator::new(dir.path().join("app"), dir.path().join("groups"));
    let config = StoreConfig::new()
        .with_location(StorageLocation::SharedGroup("group.example.notes".to_string()))
        .with_container_name("Notes")
        .with_locator(locator)
        .register::<Item>();

    let expected = dir
        .path()
        .join("groups")
        .join("group.example.notes")
        .join("Notes.sqlite");
    assert_eq!(config.resolve_store_path().unwrap(), Some(expected.clone()));

    {
        let coordinator = Coordinator::open(config.clone());
        assert_eq!(coordinator.store_path(), Some(expected.as_path()));
        let mut context = coordinator.background_context();
        context.insert(Item::new("a", "alpha", 1)).unwrap();
        context.save().unwrap();
    }

    let reopened = Coordinator::open(config);
    let items = reopened
        .entities::<Item>()
        .get_all(&QuerySpec::none())
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "alpha");
}

#[test]
fn in_memory_config_has_no_store_path() {
    let config = StoreConfig::in_memory();
    assert_eq!(config.resolve_store_path().unwrap(), None);
    assert_eq!(config.container_name(), "Model");

    let coordinator = Coordinator::open(config);
    assert!(coordinator.store().is_in_memory());
    assert_eq!(coordinator.store_path(), None);
}
