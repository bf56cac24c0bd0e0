use std::{collections::HashMap, time::Duration};
use tracing::{error, info, warn};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};
use uuid::Uuid;

use common::actors::{Actor, ActorType, ControlMessage, ShutdownSignal, wait_for_shutdown};

pub type ActorFactory = Box<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

struct Running {
    id: Uuid,
    handle: JoinHandle<()>,
}

/// Spawns registered actors, restarts them when they exit or go silent, and
/// drains them on shutdown.
pub struct Supervisor {
    actor_factories: HashMap<ActorType, ActorFactory>,
    pulses: HashMap<ActorType, Instant>,
    running: HashMap<ActorType, Running>,
    heartbeat_timeout: Duration,
    grace: Duration,
}

impl Supervisor {
    pub fn new(grace: Duration) -> Self {
        Self {
            actor_factories: HashMap::new(),
            pulses: HashMap::new(),
            running: HashMap::new(),
            heartbeat_timeout: Duration::from_secs(3),
            grace,
        }
    }

    pub fn register_actor(&mut self, actor_type: ActorType, factory: ActorFactory) {
        self.actor_factories.insert(actor_type, factory);
    }

    /// Runs until `shutdown` fires, then waits up to the grace period for
    /// every actor to return and aborts the rest.
    pub async fn start(&mut self, mut shutdown: ShutdownSignal) {
        let mut check_interval = time::interval(Duration::from_secs(1));
        let (supervisor_tx, mut supervisor_rx) = mpsc::channel::<ControlMessage>(512);

        let actors: Vec<ActorType> = self.actor_factories.keys().copied().collect();
        for actor in actors {
            self.spawn_actor(actor, supervisor_tx.clone(), shutdown.clone());
        }

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,

                Some(msg) = supervisor_rx.recv() => self.handle_message(msg),

                _ = check_interval.tick() => {
                    let dead_timeout = Instant::now() - self.heartbeat_timeout;
                    let mut restart = Vec::new();

                    for (actor_type, running) in self.running.iter() {
                        if running.handle.is_finished() {
                            warn!("{:?} exited, restarting", actor_type);
                            restart.push(*actor_type);
                        } else if self.pulses.get(actor_type).is_some_and(|t| *t < dead_timeout) {
                            warn!("{:?} is unresponsive!", actor_type);
                            running.handle.abort();
                            restart.push(*actor_type);
                        }
                    }

                    for actor_type in restart {
                        self.spawn_actor(actor_type, supervisor_tx.clone(), shutdown.clone());
                    }
                }
            }
        }

        self.drain().await;
    }

    fn handle_message(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Heartbeat(id) => {
                if let Some(actor_type) = self.actor_type_of(id) {
                    self.pulses.insert(actor_type, Instant::now());
                }
            }
            ControlMessage::Shutdown(id) => {
                if let Some(actor_type) = self.actor_type_of(id) {
                    warn!("{:?} is shutting down gracefully.", actor_type);
                    self.pulses.remove(&actor_type);
                    if let Some(running) = self.running.remove(&actor_type) {
                        running.handle.abort();
                    }
                }
            }
            ControlMessage::Error(id, error_msg) => match self.actor_type_of(id) {
                Some(actor_type) => error!("Actor {:?} reported error: {}", actor_type, error_msg),
                None => error!("Stale actor {} reported error: {}", id, error_msg),
            },
        }
    }

    /// Messages from a replaced instance are ignored.
    fn actor_type_of(&self, id: Uuid) -> Option<ActorType> {
        self.running
            .iter()
            .find(|(_, running)| running.id == id)
            .map(|(actor_type, _)| *actor_type)
    }

    async fn drain(&mut self) {
        info!("Supervisor draining {} actors", self.running.len());
        let deadline = Instant::now() + self.grace;

        for (actor_type, mut running) in self.running.drain() {
            match time::timeout_at(deadline, &mut running.handle).await {
                Ok(_) => info!("{:?} stopped", actor_type),
                Err(_) => {
                    warn!("{:?} did not stop within grace period, aborting", actor_type);
                    running.handle.abort();
                }
            }
        }
        self.pulses.clear();
    }

    fn spawn_actor(&mut self, actor_type: ActorType, tx: mpsc::Sender<ControlMessage>, shutdown: ShutdownSignal) {
        let Some(factory) = self.actor_factories.get(&actor_type) else {
            return;
        };
        let mut new_actor = factory();
        let id = new_actor.id();
        let handle = tokio::spawn(async move {
            if let Err(e) = new_actor.run(tx, shutdown).await {
                error!("Actor {:?} crashed: {}", actor_type, e);
            }
        });
        self.running.insert(actor_type, Running { id, handle });
        self.pulses.insert(actor_type, Instant::now());
    }
}
