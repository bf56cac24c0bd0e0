use thiserror::Error;

pub mod db;
pub mod ledger;
pub mod repositories;

pub use ledger::{TradeLedger, TradeStore};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("corrupt trade record at seq {seq}: {reason}")]
    Corrupt { seq: i64, reason: String },
}
