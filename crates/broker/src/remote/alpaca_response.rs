use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::models::{AccountSnapshot, ErrorKind, OrderRequest, Position};

use crate::gateway::{BrokerError, BrokerOrder};
use crate::traits::RemoteResponse;

#[derive(Debug, Serialize)]
pub struct AlpacaOrderBody {
    pub symbol: String,
    pub qty: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub time_in_force: String,
    pub client_order_id: String,
}

impl From<&OrderRequest> for AlpacaOrderBody {
    fn from(order: &OrderRequest) -> Self {
        Self {
            symbol: order.symbol.clone(),
            qty: order.quantity.to_string(),
            side: order.side.as_str().to_lowercase(),
            order_type: order.order_type.as_str().to_string(),
            time_in_force: "gtc".to_string(),
            client_order_id: order.id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AlpacaOrderResponse {
    pub id: String,
    pub status: String,
    pub filled_at: Option<DateTime<Utc>>,
}

impl RemoteResponse<BrokerOrder> for AlpacaOrderResponse {
    fn to_model(&self) -> Result<BrokerOrder, BrokerError> {
        Ok(BrokerOrder {
            id: self.id.clone(),
            status: self.status.clone(),
            filled_at: self.filled_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AlpacaAccount {
    pub equity: String,
    pub cash: String,
    pub buying_power: String,
    pub portfolio_value: Option<String>,
    pub currency: Option<String>,
    pub status: String,
}

impl RemoteResponse<AccountSnapshot> for AlpacaAccount {
    fn to_model(&self) -> Result<AccountSnapshot, BrokerError> {
        let equity = decimal("equity", &self.equity)?;
        Ok(AccountSnapshot {
            equity,
            cash: decimal("cash", &self.cash)?,
            buying_power: decimal("buying_power", &self.buying_power)?,
            portfolio_value: match &self.portfolio_value {
                Some(v) => decimal("portfolio_value", v)?,
                None => equity,
            },
            currency: self.currency.clone().unwrap_or_else(|| "USD".to_string()),
            status: self.status.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AlpacaPosition {
    pub symbol: String,
    pub qty: String,
    pub market_value: String,
    pub cost_basis: String,
    pub unrealized_pl: String,
    pub current_price: String,
}

impl RemoteResponse<Position> for AlpacaPosition {
    fn to_model(&self) -> Result<Position, BrokerError> {
        Ok(Position {
            symbol: self.symbol.clone(),
            qty: decimal("qty", &self.qty)?,
            market_value: decimal("market_value", &self.market_value)?,
            cost_basis: decimal("cost_basis", &self.cost_basis)?,
            unrealized_pl: decimal("unrealized_pl", &self.unrealized_pl)?,
            current_price: decimal("current_price", &self.current_price)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AlpacaErrorBody {
    pub message: String,
}

fn decimal(field: &str, raw: &str) -> Result<f64, BrokerError> {
    raw.trim().parse::<f64>().map_err(|e| {
        BrokerError::new(
            ErrorKind::Decode,
            format!("field '{}' is not a number ('{}'): {}", field, raw, e),
        )
    })
}
