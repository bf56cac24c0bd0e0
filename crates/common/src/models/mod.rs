pub mod account;
pub mod mode;
pub mod order;
pub mod signal;
pub mod stream;
pub mod trade;

pub use account::{AccountSnapshot, Position};
pub use mode::Mode;
pub use order::{ErrorKind, OrderOrigin, OrderOutcome, OrderRequest, OrderSide, OrderType};
pub use signal::{Signal, SignalAction};
pub use stream::{StreamState, StreamStatus};
pub use trade::TradeRecord;
