pub mod trade_repo;

pub use trade_repo::TradeRepository;
