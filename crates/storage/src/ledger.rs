use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info};

use common::models::TradeRecord;

use crate::StorageError;
use crate::db;
use crate::repositories::TradeRepository;

/// Append-only trade history.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Replaces the in-memory view with what is on disk. Returns the record count.
    async fn load(&self) -> Result<usize, StorageError>;

    /// Durably appends one record. Returns only after the write is committed.
    async fn append(&self, record: TradeRecord) -> Result<(), StorageError>;

    /// Full history in append order.
    async fn all(&self) -> Vec<TradeRecord>;

    async fn flush(&self) -> Result<(), StorageError>;
}

/// SQLite-backed [`TradeStore`]. Appends are serialized by the records lock,
/// so row order matches completion order.
pub struct TradeLedger {
    pool: SqlitePool,
    records: Mutex<Vec<TradeRecord>>,
}

impl TradeLedger {
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let ledger = Self::with_pool(db::open_pool(path).await?);
        let n = ledger.load().await?;
        info!("Loaded {} trades from history", n);
        Ok(ledger)
    }

    pub async fn in_memory() -> Result<Self, StorageError> {
        Ok(Self::with_pool(db::open_in_memory().await?))
    }

    fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Flushes and releases the database. Used on graceful shutdown.
    pub async fn close(&self) -> Result<(), StorageError> {
        self.flush().await?;
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl TradeStore for TradeLedger {
    async fn load(&self) -> Result<usize, StorageError> {
        let mut records = self.records.lock().await;
        *records = TradeRepository::fetch_all(&self.pool).await?;
        Ok(records.len())
    }

    async fn append(&self, record: TradeRecord) -> Result<(), StorageError> {
        let mut records = self.records.lock().await;
        let seq = TradeRepository::insert(&self.pool, &record).await?;
        debug!(
            "Recorded trade #{} {} {} {} accepted={}",
            seq, record.origin.as_str(), record.side, record.symbol, record.accepted
        );
        records.push(record);
        Ok(())
    }

    async fn all(&self) -> Vec<TradeRecord> {
        self.records.lock().await.clone()
    }

    async fn flush(&self) -> Result<(), StorageError> {
        let _guard = self.records.lock().await;
        db::checkpoint(&self.pool).await
    }
}
