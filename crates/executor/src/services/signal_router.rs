use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

use common::actors::{Actor, ActorType, ControlMessage, ShutdownSignal, wait_for_shutdown};
use common::models::{Mode, Signal};
use strategy::{Decision, decide};

use crate::observations::{Disposition, SignalObservations};
use crate::services::execution_service::{ExecutionError, OrderExecutor, SignalRouting};

/// Consumes validated signals: decision engine, then mode gate, then executor.
pub struct SignalRouter {
    id: Uuid,
    signal_rx: broadcast::Receiver<Arc<Signal>>,
    executor: Arc<OrderExecutor>,
    observations: Arc<SignalObservations>,
    threshold: f64,
}

#[async_trait]
impl Actor for SignalRouter {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> ActorType {
        ActorType::SignalRouter
    }

    async fn run(
        &mut self,
        supervisor_tx: mpsc::Sender<ControlMessage>,
        mut shutdown: ShutdownSignal,
    ) -> anyhow::Result<()> {
        let heartbeat_handle = self.spawn_heartbeat(supervisor_tx.clone());
        info!("Signal router started (threshold {:.2})", self.threshold);

        loop {
            let signal = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                res = self.signal_rx.recv() => match res {
                    Ok(signal) => signal,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Signal router lagged: missed {} signals", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        heartbeat_handle.abort();
                        anyhow::bail!("signal channel closed");
                    }
                },
            };

            if let Err(e) = self.route(&signal).await {
                supervisor_tx
                    .send(ControlMessage::Error(self.id, e.to_string()))
                    .await?;
            }
        }

        info!("Signal router stopped");
        heartbeat_handle.abort();
        Ok(())
    }
}

impl SignalRouter {
    pub fn new(
        signal_rx: broadcast::Receiver<Arc<Signal>>,
        executor: Arc<OrderExecutor>,
        observations: Arc<SignalObservations>,
        threshold: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            signal_rx,
            executor,
            observations,
            threshold,
        }
    }

    pub async fn route(&self, signal: &Signal) -> Result<(), ExecutionError> {
        let decision = decide(signal, self.threshold);
        let side = match decision {
            Decision::Accept { side } => side,
            Decision::Reject(reason) => {
                info!("Signal {} {} ignored: {}", signal.symbol, signal.action, reason);
                let mode = self.executor.mode().await;
                self.observations
                    .record(signal, decision, mode, Disposition::Rejected)
                    .await;
                return Ok(());
            }
        };

        match self.executor.route_signal(signal, side).await {
            Ok(SignalRouting::Observed) => {
                self.observations
                    .record(signal, decision, Mode::Manual, Disposition::Observed)
                    .await;
                Ok(())
            }
            Ok(SignalRouting::Submitted(outcome)) => {
                let disposition = Disposition::Executed {
                    order_id: outcome.request.id,
                    accepted: outcome.accepted,
                };
                self.observations
                    .record(signal, decision, Mode::Auto, disposition)
                    .await;
                Ok(())
            }
            Err(e) => {
                error!("Signal {} {} not recorded: {}", signal.symbol, signal.action, e);
                let ExecutionError::Persistence { order_id, .. } = &e;
                self.observations
                    .record(
                        signal,
                        decision,
                        Mode::Auto,
                        Disposition::Unrecorded { order_id: *order_id },
                    )
                    .await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::actors::shutdown_channel;
    use common::models::{OrderOrigin, OrderSide, SignalAction};
    use storage::{TradeLedger, TradeStore};

    use super::*;
    use crate::mode::ModeController;
    use crate::retry::RetryPolicy;
    use crate::services::execution_service::tests::{MockBroker, executor, filled, signal};

    async fn router(mode: Mode, broker: MockBroker) -> (SignalRouter, Arc<TradeLedger>, broadcast::Sender<Arc<Signal>>, tokio::sync::watch::Sender<bool>) {
        let ledger = Arc::new(TradeLedger::in_memory().await.unwrap());
        let (executor, shutdown_tx) = executor(Arc::new(broker), ledger.clone(), mode);
        let (signal_tx, signal_rx) = broadcast::channel(16);
        let router = SignalRouter::new(
            signal_rx,
            Arc::new(executor),
            Arc::new(SignalObservations::new(16)),
            0.70,
        );
        (router, ledger, signal_tx, shutdown_tx)
    }

    #[tokio::test]
    async fn confident_signal_in_auto_mode_places_one_order() {
        let mut broker = MockBroker::new();
        broker.expect_submit_order().times(1).returning(filled);
        let (router, ledger, _tx, _shutdown) = router(Mode::Auto, broker).await;

        router.route(&signal("TSLA", SignalAction::Buy, 0.91)).await.unwrap();

        let trades = ledger.all().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol, "TSLA");
        assert_eq!(trades[0].side, OrderSide::Buy);
        assert_eq!(trades[0].origin, OrderOrigin::SignalAuto);
        assert!(trades[0].accepted);

        let seen = router.observations.recent().await;
        assert!(matches!(seen[0].disposition, Disposition::Executed { accepted: true, .. }));
    }

    #[tokio::test]
    async fn weak_signals_never_reach_the_broker() {
        let mut broker = MockBroker::new();
        broker.expect_submit_order().never();
        let (router, ledger, _tx, _shutdown) = router(Mode::Auto, broker).await;

        router.route(&signal("AAPL", SignalAction::Sell, 0.40)).await.unwrap();
        router.route(&signal("MSFT", SignalAction::Buy, 0.65)).await.unwrap();
        router.route(&signal("AMZN", SignalAction::Hold, 0.99)).await.unwrap();

        assert!(ledger.all().await.is_empty());
        let seen = router.observations.recent().await;
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].signal.symbol, "AAPL");
        assert!(seen.iter().all(|o| o.disposition == Disposition::Rejected));
    }

    #[tokio::test]
    async fn manual_mode_observes_without_trading() {
        let mut broker = MockBroker::new();
        broker.expect_submit_order().never();
        let (router, ledger, _tx, _shutdown) = router(Mode::Manual, broker).await;

        router.route(&signal("NVDA", SignalAction::Buy, 0.99)).await.unwrap();

        assert!(ledger.all().await.is_empty());
        let seen = router.observations.recent().await;
        assert_eq!(seen[0].disposition, Disposition::Observed);
        assert_eq!(seen[0].mode, Mode::Manual);
    }

    #[tokio::test]
    async fn run_consumes_broadcast_until_shutdown() {
        let mut broker = MockBroker::new();
        broker.expect_submit_order().times(2).returning(filled);
        let (mut router, ledger, signal_tx, shutdown_tx) = router(Mode::Auto, broker).await;
        let (supervisor_tx, _supervisor_rx) = mpsc::channel(64);
        let shutdown = shutdown_tx.subscribe();

        let handle = tokio::spawn(async move { router.run(supervisor_tx, shutdown).await });

        signal_tx.send(Arc::new(signal("TSLA", SignalAction::Buy, 0.91))).unwrap();
        signal_tx.send(Arc::new(signal("AMD", SignalAction::Sell, 0.75))).unwrap();

        for _ in 0..100 {
            if ledger.all().await.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();

        handle.await.unwrap().unwrap();
        let symbols: Vec<String> = ledger.all().await.into_iter().map(|t| t.symbol).collect();
        assert_eq!(symbols, ["TSLA", "AMD"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn mode_changes_take_effect_while_routing() {
        let mut broker = MockBroker::new();
        broker.expect_submit_order().returning(filled);
        let ledger = Arc::new(TradeLedger::in_memory().await.unwrap());
        let mode = Arc::new(ModeController::new(Mode::Auto));
        let (shutdown_tx, shutdown) = shutdown_channel();
        let executor = Arc::new(OrderExecutor::new(
            Arc::new(broker),
            ledger.clone(),
            mode.clone(),
            RetryPolicy::default(),
            Duration::from_secs(10),
            1,
            shutdown.clone(),
        ));
        let observations = Arc::new(SignalObservations::new(256));
        let (signal_tx, signal_rx) = broadcast::channel(256);
        let mut router = SignalRouter::new(signal_rx, executor, observations.clone(), 0.70);
        let (supervisor_tx, _supervisor_rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move { router.run(supervisor_tx, shutdown).await });

        async fn routed(observations: &SignalObservations, n: usize) {
            for _ in 0..500 {
                if observations.recent().await.len() >= n {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("router did not handle {} signals", n);
        }

        // Lock-step: each signal is routed under the mode set just before it.
        for round in 0..10 {
            let target = if round % 2 == 0 { Mode::Manual } else { Mode::Auto };
            mode.set(target).await;
            assert_eq!(mode.get().await, target);
            signal_tx
                .send(Arc::new(signal(&format!("LS{}", round), SignalAction::Buy, 0.95)))
                .unwrap();
            routed(&observations, round + 1).await;
            assert_eq!(mode.get().await, target);
        }
        let lockstep: Vec<String> = ledger.all().await.into_iter().map(|t| t.symbol).collect();
        assert_eq!(lockstep, ["LS1", "LS3", "LS5", "LS7", "LS9"]);

        // Burst: flip the mode while the router is busy with a backlog.
        for round in 0..40 {
            signal_tx
                .send(Arc::new(signal(&format!("B{}", round), SignalAction::Sell, 0.90)))
                .unwrap();
            let target = if round % 3 == 0 { Mode::Manual } else { Mode::Auto };
            mode.set(target).await;
            assert_eq!(mode.get().await, target);
        }
        routed(&observations, 50).await;

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let seen = observations.recent().await;
        let trades = ledger.all().await;
        for obs in &seen {
            let recorded = trades
                .iter()
                .any(|t| t.signal.as_ref().is_some_and(|s| s.symbol == obs.signal.symbol));
            match obs.mode {
                Mode::Manual => {
                    assert_eq!(obs.disposition, Disposition::Observed);
                    assert!(!recorded, "{} traded while manual", obs.signal.symbol);
                }
                Mode::Auto => {
                    assert!(matches!(obs.disposition, Disposition::Executed { accepted: true, .. }));
                    assert!(recorded, "{} not recorded", obs.signal.symbol);
                }
            }
        }
        let executed = seen.iter().filter(|o| o.mode == Mode::Auto).count();
        assert_eq!(trades.len(), executed);
        assert!(trades.iter().all(|t| t.origin == OrderOrigin::SignalAuto));
    }
}
