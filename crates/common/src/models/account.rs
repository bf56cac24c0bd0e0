use serde::{Deserialize, Serialize};

/// Fresh view of the brokerage account. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: f64,
    pub cash: f64,
    pub buying_power: f64,
    pub portfolio_value: f64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub qty: f64,
    pub market_value: f64,
    pub cost_basis: f64,
    pub unrealized_pl: f64,
    pub current_price: f64,
}
