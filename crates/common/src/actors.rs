use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorType {
    SignalStream,
    SignalRouter,
    StatusReporter,
}

/// Messages sent from Actors to the Supervisor
pub enum ControlMessage {
    Heartbeat(Uuid),
    Shutdown(Uuid),
    Error(Uuid, String),
}

impl std::fmt::Debug for ControlMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heartbeat(id) => write!(f, "Heartbeat({})", id),
            Self::Shutdown(id) => write!(f, "Shutdown({})", id),
            Self::Error(id, err) => write!(f, "Error({}, {})", id, err),
        }
    }
}

/// Cooperative shutdown token. Flips to `true` once, never back.
pub type ShutdownSignal = watch::Receiver<bool>;

pub fn shutdown_channel() -> (watch::Sender<bool>, ShutdownSignal) {
    watch::channel(false)
}

/// Resolves once shutdown is requested (or the sender is gone).
pub async fn wait_for_shutdown(shutdown: &mut ShutdownSignal) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub fn is_shutdown(shutdown: &ShutdownSignal) -> bool {
    *shutdown.borrow()
}

/// The trait that all restartable services must implement
#[async_trait]
pub trait Actor: Send + Sync {
    fn name(&self) -> ActorType;

    fn id(&self) -> Uuid;

    /// The main loop of the actor.
    /// Must return once `shutdown` fires; heartbeats go through `spawn_heartbeat`.
    async fn run(
        &mut self,
        supervisor_tx: mpsc::Sender<ControlMessage>,
        shutdown: ShutdownSignal,
    ) -> anyhow::Result<()>;

    fn spawn_heartbeat(&self, supervisor_tx: mpsc::Sender<ControlMessage>) -> JoinHandle<()> {
        let id = self.id();
        tokio::spawn(async move {
            loop {
                if supervisor_tx
                    .send(ControlMessage::Heartbeat(id))
                    .await
                    .is_err()
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        })
    }
}
