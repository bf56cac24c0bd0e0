use serde::Serialize;

use common::models::{OrderSide, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    Hold,
    BelowThreshold { confidence: f64, threshold: f64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hold => write!(f, "HOLD signal"),
            Self::BelowThreshold {
                confidence,
                threshold,
            } => write!(f, "confidence {:.2} below threshold {:.2}", confidence, threshold),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Accept { side: OrderSide },
    Reject(RejectReason),
}

#[cfg(test)]
impl Decision {
    fn is_accept(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }
}

/// Accept iff the signal is directional and `confidence >= threshold`.
pub fn decide(signal: &Signal, threshold: f64) -> Decision {
    let Some(side) = OrderSide::from_action(signal.action) else {
        return Decision::Reject(RejectReason::Hold);
    };

    if signal.confidence >= threshold {
        Decision::Accept { side }
    } else {
        Decision::Reject(RejectReason::BelowThreshold {
            confidence: signal.confidence,
            threshold,
        })
    }
}
