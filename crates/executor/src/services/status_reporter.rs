use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

use common::actors::{Actor, ActorType, ControlMessage, ShutdownSignal, wait_for_shutdown};

use crate::services::execution_service::OrderExecutor;

/// Periodically logs account equity, cash and open positions.
pub struct StatusReporter {
    id: Uuid,
    executor: Arc<OrderExecutor>,
    interval: Duration,
}

#[async_trait]
impl Actor for StatusReporter {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> ActorType {
        ActorType::StatusReporter
    }

    async fn run(
        &mut self,
        supervisor_tx: mpsc::Sender<ControlMessage>,
        mut shutdown: ShutdownSignal,
    ) -> anyhow::Result<()> {
        let heartbeat_handle = self.spawn_heartbeat(supervisor_tx);
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = ticker.tick() => {
                    self.report().await;
                }
            }
        }

        heartbeat_handle.abort();
        Ok(())
    }
}

impl StatusReporter {
    pub fn new(executor: Arc<OrderExecutor>, interval: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            executor,
            interval,
        }
    }

    /// One status line plus one line per position. Returns `false` if the
    /// broker could not be queried.
    pub async fn report(&self) -> bool {
        let mode = self.executor.mode().await;
        let account = match self.executor.account().await {
            Ok(account) => account,
            Err(e) => {
                warn!("Status report skipped: {}", e);
                return false;
            }
        };
        info!(
            "Status | Mode: {} | Equity: {:.2} {} | Cash: {:.2} | Buying power: {:.2}",
            mode, account.equity, account.currency, account.cash, account.buying_power
        );

        match self.executor.positions().await {
            Ok(positions) if positions.is_empty() => info!("Status | No open positions"),
            Ok(positions) => {
                for p in positions {
                    info!(
                        "Status | {} qty={} value={:.2} P/L={:.2}",
                        p.symbol, p.qty, p.market_value, p.unrealized_pl
                    );
                }
            }
            Err(e) => {
                warn!("Could not fetch positions: {}", e);
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use broker::BrokerError;
    use common::actors::shutdown_channel;
    use common::models::{AccountSnapshot, ErrorKind, Mode, Position};
    use storage::TradeLedger;

    use super::*;
    use crate::services::execution_service::tests::{MockBroker, executor};

    fn account() -> AccountSnapshot {
        AccountSnapshot {
            equity: 100_000.0,
            cash: 50_000.0,
            buying_power: 200_000.0,
            portfolio_value: 100_000.0,
            currency: "USD".into(),
            status: "ACTIVE".into(),
        }
    }

    #[tokio::test]
    async fn report_survives_broker_failure() {
        let mut broker = MockBroker::new();
        broker
            .expect_get_account()
            .times(1)
            .returning(|| Err(BrokerError::new(ErrorKind::Network, "connection refused")));
        broker.expect_get_positions().never();
        let ledger = Arc::new(TradeLedger::in_memory().await.unwrap());
        let (executor, _shutdown) = executor(Arc::new(broker), ledger, Mode::Manual);

        let reporter = StatusReporter::new(Arc::new(executor), Duration::from_secs(300));
        assert!(!reporter.report().await);
    }

    #[tokio::test]
    async fn report_logs_account_and_positions() {
        let mut broker = MockBroker::new();
        broker.expect_get_account().times(1).returning(|| Ok(account()));
        broker.expect_get_positions().times(1).returning(|| {
            Ok(vec![Position {
                symbol: "TSLA".into(),
                qty: 3.0,
                market_value: 750.0,
                cost_basis: 700.0,
                unrealized_pl: 50.0,
                current_price: 250.0,
            }])
        });
        let ledger = Arc::new(TradeLedger::in_memory().await.unwrap());
        let (executor, _shutdown) = executor(Arc::new(broker), ledger, Mode::Auto);

        let reporter = StatusReporter::new(Arc::new(executor), Duration::from_secs(300));
        assert!(reporter.report().await);
    }

    #[tokio::test]
    async fn run_reports_each_interval_and_stops_on_shutdown() {
        let mut broker = MockBroker::new();
        broker.expect_get_account().times(2..).returning(|| Ok(account()));
        broker.expect_get_positions().returning(|| Ok(Vec::new()));
        let ledger = Arc::new(TradeLedger::in_memory().await.unwrap());
        let (executor, _executor_shutdown) = executor(Arc::new(broker), ledger, Mode::Auto);

        let mut reporter = StatusReporter::new(Arc::new(executor), Duration::from_millis(20));
        let (shutdown_tx, shutdown) = shutdown_channel();
        let (supervisor_tx, _supervisor_rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move { reporter.run(supervisor_tx, shutdown).await });

        time::sleep(Duration::from_millis(70)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
