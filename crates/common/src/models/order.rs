use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signal::SignalAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    #[serde(alias = "buy", alias = "Buy")]
    Buy,
    #[serde(alias = "sell", alias = "Sell")]
    Sell,
}

impl OrderSide {
    /// Hold has no side.
    pub fn from_action(action: SignalAction) -> Option<Self> {
        match action {
            SignalAction::Buy => Some(Self::Buy),
            SignalAction::Sell => Some(Self::Sell),
            SignalAction::Hold => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(format!("unknown order side '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
        }
    }
}

/// Who asked for the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderOrigin {
    SignalAuto,
    ManualOperator,
    ProgrammaticCall,
}

impl OrderOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignalAuto => "signal_auto",
            Self::ManualOperator => "manual_operator",
            Self::ProgrammaticCall => "programmatic_call",
        }
    }
}

impl std::str::FromStr for OrderOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signal_auto" => Ok(Self::SignalAuto),
            "manual_operator" => Ok(Self::ManualOperator),
            "programmatic_call" => Ok(Self::ProgrammaticCall),
            other => Err(format!("unknown order origin '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub order_type: OrderType,
    pub timestamp: DateTime<Utc>,
    pub origin: OrderOrigin,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, quantity: u32, origin: OrderOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.trim().to_uppercase(),
            side,
            quantity,
            order_type: OrderType::Market,
            timestamp: Utc::now(),
            origin,
        }
    }
}

/// Classified broker failure. Transient kinds are eligible for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Network,
    Timeout,
    ServerError,
    InvalidSymbol,
    InsufficientFunds,
    Unauthorized,
    Rejected,
    Decode,
}

impl ErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Network | Self::Timeout | Self::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::ServerError => "server_error",
            Self::InvalidSymbol => "invalid_symbol",
            Self::InsufficientFunds => "insufficient_funds",
            Self::Unauthorized => "unauthorized",
            Self::Rejected => "rejected",
            Self::Decode => "decode",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "rate_limited" => Self::RateLimited,
            "network" => Self::Network,
            "timeout" => Self::Timeout,
            "server_error" => Self::ServerError,
            "invalid_symbol" => Self::InvalidSymbol,
            "insufficient_funds" => Self::InsufficientFunds,
            "unauthorized" => Self::Unauthorized,
            "rejected" => Self::Rejected,
            "decode" => Self::Decode,
            other => return Err(format!("unknown error kind '{}'", other)),
        })
    }
}

/// Terminal result of submitting an [`OrderRequest`], after any retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub request: OrderRequest,
    pub accepted: bool,
    pub broker_order_id: Option<String>,
    pub broker_status: Option<String>,
    pub error: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub filled_at: Option<DateTime<Utc>>,
    pub attempts: u32,
}

impl OrderOutcome {
    pub fn accepted(
        request: OrderRequest,
        broker_order_id: String,
        broker_status: String,
        filled_at: Option<DateTime<Utc>>,
        attempts: u32,
    ) -> Self {
        Self {
            request,
            accepted: true,
            broker_order_id: Some(broker_order_id),
            broker_status: Some(broker_status),
            error: None,
            error_message: None,
            filled_at,
            attempts,
        }
    }

    pub fn failed(request: OrderRequest, kind: ErrorKind, message: String, attempts: u32) -> Self {
        Self {
            request,
            accepted: false,
            broker_order_id: None,
            broker_status: None,
            error: Some(kind),
            error_message: Some(message),
            filled_at: None,
            attempts,
        }
    }
}
