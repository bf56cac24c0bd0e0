use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use common::config::Settings;
use common::models::{AccountSnapshot, ErrorKind, OrderRequest, Position};

use crate::gateway::{BrokerError, BrokerGateway, BrokerOrder};
use crate::remote::alpaca_response::{
    AlpacaAccount, AlpacaErrorBody, AlpacaOrderBody, AlpacaOrderResponse, AlpacaPosition,
};
use crate::traits::RemoteResponse;

#[derive(Clone)]
pub struct AlpacaClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

impl AlpacaClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        secret_key: &str,
        timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .user_agent("signal-trader/0.1.0")
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::new(ErrorKind::Network, format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, BrokerError> {
        Self::new(
            &settings.broker_base_url,
            &settings.broker_api_key,
            &settings.broker_api_secret,
            settings.broker_timeout,
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BrokerError> {
        let resp = self
            .authed(builder)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let kind = classify_status(status, &body);
            let message = error_message(&body);
            error!("Alpaca request failed ({}): {}", status, message);
            return Err(BrokerError::new(kind, format!("HTTP {}: {}", status.as_u16(), message)));
        }

        resp.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(e)
            } else {
                BrokerError::new(ErrorKind::Decode, format!("unreadable broker response: {}", e))
            }
        })
    }

    async fn find_by_client_id(&self, client_order_id: &str) -> Result<BrokerOrder, BrokerError> {
        let url = format!("{}/v2/orders:by_client_order_id", self.base_url);
        let order: AlpacaOrderResponse = self
            .send(self.client.get(&url).query(&[("client_order_id", client_order_id)]))
            .await?;
        order.to_model()
    }
}

#[async_trait]
impl BrokerGateway for AlpacaClient {
    async fn submit_order(&self, order: &OrderRequest) -> Result<BrokerOrder, BrokerError> {
        let url = format!("{}/v2/orders", self.base_url);
        let body = AlpacaOrderBody::from(order);

        info!("Placing Order: {} {} {}", order.side, order.quantity, order.symbol);

        let placed = self
            .send::<AlpacaOrderResponse>(self.client.post(&url).json(&body))
            .await
            .and_then(|resp| resp.to_model());

        match placed {
            Ok(order) => Ok(order),
            // A retry after a lost acknowledgement lands here; the first attempt went through.
            Err(e) if is_duplicate_client_id(&e) => {
                warn!("Order {} already known to broker, fetching it", order.id);
                self.find_by_client_id(&body.client_order_id).await
            }
            // 2xx with an unreadable body: the order is live, read it back.
            Err(e) if e.kind == ErrorKind::Decode => {
                warn!("Order {} acknowledged but {}, fetching it", order.id, e.message);
                self.find_by_client_id(&body.client_order_id).await
            }
            Err(e) => Err(e),
        }
    }

    async fn get_account(&self) -> Result<AccountSnapshot, BrokerError> {
        let url = format!("{}/v2/account", self.base_url);
        let account: AlpacaAccount = self.send(self.client.get(&url)).await?;
        debug!("Fetched account, status {}", account.status);
        account.to_model()
    }

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
        let url = format!("{}/v2/positions", self.base_url);
        let positions: Vec<AlpacaPosition> = self.send(self.client.get(&url)).await?;
        positions.iter().map(|p| p.to_model()).collect()
    }
}

fn transport_error(e: reqwest::Error) -> BrokerError {
    let kind = if e.is_timeout() {
        ErrorKind::Timeout
    } else {
        ErrorKind::Network
    };
    BrokerError::new(kind, e.to_string())
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<AlpacaErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn is_duplicate_client_id(e: &BrokerError) -> bool {
    e.kind == ErrorKind::Rejected && e.message.to_lowercase().contains("client_order_id")
}

/// Maps a non-success HTTP response onto the retry taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> ErrorKind {
    let text = body.to_lowercase();
    let insufficient = text.contains("insufficient") || text.contains("buying power");

    match status.as_u16() {
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::ServerError,
        408 => ErrorKind::Timeout,
        401 => ErrorKind::Unauthorized,
        403 if insufficient => ErrorKind::InsufficientFunds,
        403 => ErrorKind::Unauthorized,
        404 => ErrorKind::InvalidSymbol,
        422 if insufficient => ErrorKind::InsufficientFunds,
        422 if text.contains("asset") || text.contains("symbol") => ErrorKind::InvalidSymbol,
        _ => ErrorKind::Rejected,
    }
}
