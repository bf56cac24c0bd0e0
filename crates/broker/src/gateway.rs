use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use common::models::{AccountSnapshot, ErrorKind, OrderRequest, Position};

/// A classified failure from the brokerage.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct BrokerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BrokerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Broker acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub id: String,
    pub status: String,
    pub filled_at: Option<DateTime<Utc>>,
}

/// Order/account/positions surface of the brokerage.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn submit_order(&self, order: &OrderRequest) -> Result<BrokerOrder, BrokerError>;

    async fn get_account(&self) -> Result<AccountSnapshot, BrokerError>;

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError>;
}
