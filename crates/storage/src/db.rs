use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{self, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::StorageError;

/// Opens (creating if needed) the ledger database at `path`.
///
/// `synchronous=FULL` makes every committed append durable before the
/// commit returns.
pub async fn open_pool(path: &str) -> Result<SqlitePool, StorageError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlite::SqliteSynchronous::Full)
        .busy_timeout(Duration::from_secs(30))
        .statement_cache_capacity(100);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    apply_schema(&pool).await?;
    info!("Trade ledger opened at {}", path);
    Ok(pool)
}

/// Single-connection in-memory database; the data lives as long as the pool.
pub async fn open_in_memory() -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    let schema = include_str!("../../../sql/schema.sql");
    sqlx::query(schema).execute(pool).await?;
    Ok(())
}

/// Moves WAL contents into the main database file.
pub async fn checkpoint(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
        .execute(pool)
        .await?;
    Ok(())
}
