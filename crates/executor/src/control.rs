use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use broker::BrokerError;
use common::models::{
    AccountSnapshot, ErrorKind, Mode, OrderOrigin, OrderOutcome, OrderRequest, OrderSide,
    Position, StreamStatus, TradeRecord,
};
use storage::TradeStore;

use crate::mode::ModeController;
use crate::observations::{ObservedSignal, SignalObservations};
use crate::services::execution_service::{ExecutionError, OrderExecutor};

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("manual trades require manual mode (current mode: {current})")]
    ModeViolation { current: Mode },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl ControlError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModeViolation { .. } => "mode_violation",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Broker(e) if e.kind == ErrorKind::Timeout => "timeout",
            Self::Broker(e) if e.is_transient() => "broker_transient",
            Self::Broker(_) => "broker_permanent",
            Self::Execution(ExecutionError::Persistence { .. }) => "persistence",
        }
    }
}

/// Body of `/manual-trade` and `/programmatic-trade`. `action` is accepted
/// as an alias of `side`.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    #[serde(alias = "action")]
    pub side: String,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokerHealth {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub mode: Mode,
    pub stream: StreamStatus,
    pub broker: BrokerHealth,
    pub timestamp: DateTime<Utc>,
}

/// Operator facade over the running engine.
pub struct ControlSurface {
    mode: Arc<ModeController>,
    executor: Arc<OrderExecutor>,
    store: Arc<dyn TradeStore>,
    stream_status: watch::Receiver<StreamStatus>,
    observations: Arc<SignalObservations>,
}

impl ControlSurface {
    pub fn new(
        mode: Arc<ModeController>,
        executor: Arc<OrderExecutor>,
        store: Arc<dyn TradeStore>,
        stream_status: watch::Receiver<StreamStatus>,
        observations: Arc<SignalObservations>,
    ) -> Self {
        Self {
            mode,
            executor,
            store,
            stream_status,
            observations,
        }
    }

    /// Never fails; an unreachable broker is reported as degraded.
    pub async fn health(&self) -> Health {
        let stream = self.stream_status.borrow().clone();
        let broker = match self.executor.account().await {
            Ok(_) => BrokerHealth {
                reachable: true,
                error: None,
            },
            Err(e) => {
                warn!("Health check: broker unreachable: {}", e);
                BrokerHealth {
                    reachable: false,
                    error: Some(e.to_string()),
                }
            }
        };

        Health {
            status: if broker.reachable && stream.is_live() {
                "healthy"
            } else {
                "degraded"
            },
            mode: self.mode.get().await,
            stream,
            broker,
            timestamp: Utc::now(),
        }
    }

    pub async fn account(&self) -> Result<AccountSnapshot, ControlError> {
        Ok(self.executor.account().await?)
    }

    pub async fn positions(&self) -> Result<Vec<Position>, ControlError> {
        Ok(self.executor.positions().await?)
    }

    pub async fn trades(&self) -> Vec<TradeRecord> {
        self.store.all().await
    }

    pub async fn mode(&self) -> Mode {
        self.mode.get().await
    }

    pub async fn set_mode(&self, mode: Mode) -> Mode {
        self.mode.set(mode).await;
        mode
    }

    pub async fn recent_signals(&self) -> Vec<ObservedSignal> {
        self.observations.recent().await
    }

    pub async fn submit_manual_trade(&self, req: TradeRequest) -> Result<OrderOutcome, ControlError> {
        let current = self.mode.get().await;
        if current != Mode::Manual {
            warn!("Manual trade for {} refused: mode is {}", req.symbol, current);
            return Err(ControlError::ModeViolation { current });
        }
        let request = self.order_request(req, OrderOrigin::ManualOperator)?;
        Ok(self.executor.submit(request).await?)
    }

    pub async fn submit_programmatic_trade(&self, req: TradeRequest) -> Result<OrderOutcome, ControlError> {
        let request = self.order_request(req, OrderOrigin::ProgrammaticCall)?;
        Ok(self.executor.submit(request).await?)
    }

    fn order_request(&self, req: TradeRequest, origin: OrderOrigin) -> Result<OrderRequest, ControlError> {
        let symbol = req.symbol.trim();
        if symbol.is_empty() {
            return Err(ControlError::InvalidRequest("symbol must not be empty".into()));
        }
        let side: OrderSide = req.side.parse().map_err(ControlError::InvalidRequest)?;
        let quantity = match req.quantity {
            None => self.executor.default_quantity(),
            Some(q) if q > 0 => u32::try_from(q)
                .map_err(|_| ControlError::InvalidRequest(format!("quantity {} is too large", q)))?,
            Some(q) => {
                return Err(ControlError::InvalidRequest(format!(
                    "quantity must be positive, got {}",
                    q
                )));
            }
        };

        info!("{} order requested: {} {} x{}", origin.as_str(), side, symbol, quantity);
        Ok(OrderRequest::market(symbol, side, quantity, origin))
    }
}
