use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use common::models::{Mode, Signal};
use strategy::Decision;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    /// Dropped by the decision engine.
    Rejected,
    /// Accepted while in manual mode.
    Observed,
    Executed { order_id: Uuid, accepted: bool },
    /// Submitted, but the trade record could not be written.
    Unrecorded { order_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
pub struct ObservedSignal {
    pub signal: Signal,
    pub decision: Decision,
    pub mode: Mode,
    #[serde(flatten)]
    pub disposition: Disposition,
    pub observed_at: DateTime<Utc>,
}

/// Bounded ring of recently routed signals, oldest first.
#[derive(Debug)]
pub struct SignalObservations {
    capacity: usize,
    entries: RwLock<VecDeque<ObservedSignal>>,
}

impl SignalObservations {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub async fn record(&self, signal: &Signal, decision: Decision, mode: Mode, disposition: Disposition) {
        let mut entries = self.entries.write().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(ObservedSignal {
            signal: signal.clone(),
            decision,
            mode,
            disposition,
            observed_at: Utc::now(),
        });
    }

    pub async fn recent(&self) -> Vec<ObservedSignal> {
        self.entries.read().await.iter().cloned().collect()
    }
}
