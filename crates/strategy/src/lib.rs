pub mod decision;

pub use decision::{Decision, RejectReason, decide};
