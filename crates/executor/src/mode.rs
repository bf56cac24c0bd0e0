use tokio::sync::RwLock;
use tracing::info;

use common::models::Mode;

/// Single choke point for the trading mode.
#[derive(Debug, Default)]
pub struct ModeController {
    mode: RwLock<Mode>,
}

impl ModeController {
    pub fn new(initial: Mode) -> Self {
        Self {
            mode: RwLock::new(initial),
        }
    }

    pub async fn get(&self) -> Mode {
        *self.mode.read().await
    }

    /// Returns `true` if the mode actually changed.
    pub async fn set(&self, mode: Mode) -> bool {
        let mut current = self.mode.write().await;
        if *current == mode {
            return false;
        }
        info!("Trading mode changed: {} -> {}", *current, mode);
        *current = mode;
        true
    }
}
