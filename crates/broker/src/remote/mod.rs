pub mod alpaca_client;
pub mod alpaca_response;

pub use alpaca_client::AlpacaClient;
