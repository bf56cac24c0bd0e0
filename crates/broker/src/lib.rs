pub mod gateway;
pub mod remote;
pub mod traits;

pub use gateway::{BrokerError, BrokerGateway, BrokerOrder};
pub use remote::AlpacaClient;
