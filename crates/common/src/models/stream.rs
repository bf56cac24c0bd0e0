use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Stopped,
}

/// Published by the signal stream client on every state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub state: StreamState,
    pub since: DateTime<Utc>,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
}

impl StreamStatus {
    pub fn new(state: StreamState) -> Self {
        Self {
            state,
            since: Utc::now(),
            last_frame_at: None,
            reconnect_attempts: 0,
        }
    }

    pub fn is_live(&self) -> bool {
        self.state == StreamState::Connected
    }
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self::new(StreamState::Disconnected)
    }
}
