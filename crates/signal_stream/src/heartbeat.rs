use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    Idle,
    SendPing,
    Dead,
}

/// Liveness tracking for one connection.
///
/// After `interval` without inbound traffic a ping is due (and again every
/// `interval` while still silent). The connection is dead once the oldest
/// unanswered ping is `2 * interval` old.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    last_inbound: Instant,
    last_ping: Option<Instant>,
    first_unanswered: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_inbound: now,
            last_ping: None,
            first_unanswered: None,
        }
    }

    pub fn on_inbound(&mut self, now: Instant) {
        self.last_inbound = now;
        self.last_ping = None;
        self.first_unanswered = None;
    }

    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        if let Some(first) = self.first_unanswered {
            if now.saturating_duration_since(first) >= self.interval * 2 {
                return HeartbeatAction::Dead;
            }
        }

        let quiet_since = self.last_ping.unwrap_or(self.last_inbound);
        if now.saturating_duration_since(quiet_since) >= self.interval {
            self.last_ping = Some(now);
            self.first_unanswered.get_or_insert(now);
            return HeartbeatAction::SendPing;
        }

        HeartbeatAction::Idle
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
