pub mod signal_frame;

pub use signal_frame::{
    DecodeError, Frame, SignalPayload, decode_frame, ping_frame, subscribe_frame,
};
