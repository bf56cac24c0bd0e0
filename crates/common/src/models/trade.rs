use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::{ErrorKind, OrderOrigin, OrderOutcome, OrderSide, OrderType};
use super::signal::Signal;

/// Durable, immutable entry of the trade history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub order_type: OrderType,
    pub origin: OrderOrigin,
    pub requested_at: DateTime<Utc>,
    pub accepted: bool,
    pub broker_order_id: Option<String>,
    pub broker_status: Option<String>,
    pub error: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub filled_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub signal: Option<Signal>,
    pub recorded_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn from_outcome(outcome: &OrderOutcome, signal: Option<&Signal>) -> Self {
        let request = &outcome.request;
        Self {
            id: Uuid::new_v4(),
            order_id: request.id,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            order_type: request.order_type,
            origin: request.origin,
            requested_at: request.timestamp,
            accepted: outcome.accepted,
            broker_order_id: outcome.broker_order_id.clone(),
            broker_status: outcome.broker_status.clone(),
            error: outcome.error,
            error_message: outcome.error_message.clone(),
            filled_at: outcome.filled_at,
            attempts: outcome.attempts,
            signal: signal.cloned(),
            recorded_at: Utc::now(),
        }
    }
}
