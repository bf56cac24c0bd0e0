pub mod heartbeat;
pub mod remote;
pub mod services;
pub mod traits;

pub use remote::{DecodeError, Frame, decode_frame};
pub use services::signal_gateway::SignalGateway;
