//! Connection bootstrap utilities for the durable store.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas and register value transformers.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Value transformers are registered before migrations run.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Hook registering custom SQL functions (value transformations) on a
/// connection before the store schema is touched.
pub type ValueTransformers = dyn Fn(&Connection) -> rusqlite::Result<()> + Send + Sync;

/// Opens the store file at `path` and applies all pending migrations.
///
/// # Side effects
/// - Creates the SQLite file when it does not exist yet.
/// - Emits `store_open` logging events with duration and status.
pub fn open_store(
    path: impl AsRef<Path>,
    transformers: Option<&ValueTransformers>,
) -> DbResult<Connection> {
    open_with("file", transformers, || Connection::open(path.as_ref()))
}

/// Opens a non-persistent store and applies all pending migrations.
pub fn open_store_in_memory(transformers: Option<&ValueTransformers>) -> DbResult<Connection> {
    open_with("memory", transformers, Connection::open_in_memory)
}

fn open_with(
    mode: &str,
    transformers: Option<&ValueTransformers>,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=store_open module=db status=start mode={mode}");

    let mut conn = match connect() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=store_open module=db status=error mode={mode} duration_ms={} error_code=store_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, transformers) {
        Ok(()) => {
            info!(
                "event=store_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=store_open module=db status=error mode={mode} duration_ms={} error_code=store_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(
    conn: &mut Connection,
    transformers: Option<&ValueTransformers>,
) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    if let Some(register) = transformers {
        register(conn).map_err(DbError::Transformers)?;
    }
    apply_migrations(conn)?;
    Ok(())
}
