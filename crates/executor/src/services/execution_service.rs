use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time;
use tracing::{error, info};
use uuid::Uuid;

use broker::{BrokerError, BrokerGateway};
use common::actors::ShutdownSignal;
use common::models::{
    AccountSnapshot, ErrorKind, Mode, OrderOrigin, OrderOutcome, OrderRequest, OrderSide,
    Position, Signal, TradeRecord,
};
use storage::{StorageError, TradeStore};

use crate::mode::ModeController;
use crate::retry::{Attempted, RetryPolicy};

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(
        "order {order_id} was not recorded (broker order id: {}): {source}",
        .broker_order_id.as_deref().unwrap_or("none")
    )]
    Persistence {
        order_id: Uuid,
        broker_order_id: Option<String>,
        #[source]
        source: StorageError,
    },
}

/// What happened to an accepted signal.
#[derive(Debug)]
pub enum SignalRouting {
    Submitted(OrderOutcome),
    /// Manual mode: surfaced for the operator only.
    Observed,
}

/// Runs a broker call under `limit`; exceeding it is a transient `Timeout`.
pub async fn timed<T, F>(limit: Duration, call: F) -> Result<T, BrokerError>
where
    F: Future<Output = Result<T, BrokerError>>,
{
    match time::timeout(limit, call).await {
        Ok(res) => res,
        Err(_) => Err(BrokerError::new(
            ErrorKind::Timeout,
            format!("broker did not respond within {:?}", limit),
        )),
    }
}

pub struct OrderExecutor {
    gateway: Arc<dyn BrokerGateway>,
    store: Arc<dyn TradeStore>,
    mode: Arc<ModeController>,
    policy: RetryPolicy,
    call_timeout: Duration,
    default_quantity: u32,
    shutdown: ShutdownSignal,
}

impl OrderExecutor {
    pub fn new(
        gateway: Arc<dyn BrokerGateway>,
        store: Arc<dyn TradeStore>,
        mode: Arc<ModeController>,
        policy: RetryPolicy,
        call_timeout: Duration,
        default_quantity: u32,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            gateway,
            store,
            mode,
            policy,
            call_timeout,
            default_quantity,
            shutdown,
        }
    }

    pub fn default_quantity(&self) -> u32 {
        self.default_quantity
    }

    pub async fn mode(&self) -> Mode {
        self.mode.get().await
    }

    /// Mode gate for an accepted signal. The mode is sampled once, here.
    pub async fn route_signal(
        &self,
        signal: &Signal,
        side: OrderSide,
    ) -> Result<SignalRouting, ExecutionError> {
        match self.mode.get().await {
            Mode::Manual => {
                info!(
                    "[MANUAL MODE] Signal received for {} -> Action: {}, Confidence: {:.2}",
                    signal.symbol, signal.action, signal.confidence
                );
                Ok(SignalRouting::Observed)
            }
            Mode::Auto => {
                info!(
                    "[AUTO MODE] Executing {} {} x{} (confidence {:.2})",
                    side, signal.symbol, self.default_quantity, signal.confidence
                );
                let request = OrderRequest::market(
                    &signal.symbol,
                    side,
                    self.default_quantity,
                    OrderOrigin::SignalAuto,
                );
                self.execute(request, Some(signal))
                    .await
                    .map(SignalRouting::Submitted)
            }
        }
    }

    /// Submits regardless of mode. Mode checks belong to the caller.
    pub async fn submit(&self, request: OrderRequest) -> Result<OrderOutcome, ExecutionError> {
        self.execute(request, None).await
    }

    pub async fn account(&self) -> Result<AccountSnapshot, BrokerError> {
        timed(self.call_timeout, self.gateway.get_account()).await
    }

    pub async fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        timed(self.call_timeout, self.gateway.get_positions()).await
    }

    async fn execute(
        &self,
        request: OrderRequest,
        signal: Option<&Signal>,
    ) -> Result<OrderOutcome, ExecutionError> {
        let mut shutdown = self.shutdown.clone();
        let Attempted { result, attempts } = self
            .policy
            .run(
                |_| timed(self.call_timeout, self.gateway.submit_order(&request)),
                BrokerError::is_transient,
                &mut shutdown,
            )
            .await;

        let outcome = match result {
            Ok(order) => {
                info!(
                    "Order placed: {} {} x{} -> {} ({})",
                    request.side, request.symbol, request.quantity, order.id, order.status
                );
                OrderOutcome::accepted(request, order.id, order.status, order.filled_at, attempts)
            }
            Err(e) => {
                error!(
                    "Order failed after {} attempt(s): {} {} x{}: {}",
                    attempts, request.side, request.symbol, request.quantity, e
                );
                OrderOutcome::failed(request, e.kind, e.message, attempts)
            }
        };

        let record = TradeRecord::from_outcome(&outcome, signal);
        if let Err(source) = self.store.append(record).await {
            error!(
                "Failed to record order {} (broker order id {:?}): {}",
                outcome.request.id, outcome.broker_order_id, source
            );
            return Err(ExecutionError::Persistence {
                order_id: outcome.request.id,
                broker_order_id: outcome.broker_order_id,
                source,
            });
        }

        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use broker::BrokerOrder;
    use chrono::Utc;
    use common::actors::shutdown_channel;
    use common::models::SignalAction;
    use mockall::mock;
    use storage::TradeLedger;
    use tokio::sync::watch;
    use tokio::time::Instant;

    use super::*;

    mock! {
        pub Broker {}

        #[async_trait]
        impl BrokerGateway for Broker {
            async fn submit_order(&self, order: &OrderRequest) -> Result<BrokerOrder, BrokerError>;
            async fn get_account(&self) -> Result<AccountSnapshot, BrokerError>;
            async fn get_positions(&self) -> Result<Vec<Position>, BrokerError>;
        }
    }

    mock! {
        pub Store {}

        #[async_trait]
        impl TradeStore for Store {
            async fn load(&self) -> Result<usize, StorageError>;
            async fn append(&self, record: TradeRecord) -> Result<(), StorageError>;
            async fn all(&self) -> Vec<TradeRecord>;
            async fn flush(&self) -> Result<(), StorageError>;
        }
    }

    /// Broker that never answers within any sane timeout.
    struct StalledBroker;

    #[async_trait]
    impl BrokerGateway for StalledBroker {
        async fn submit_order(&self, _order: &OrderRequest) -> Result<BrokerOrder, BrokerError> {
            time::sleep(Duration::from_secs(3600)).await;
            Err(BrokerError::new(ErrorKind::Rejected, "unreachable"))
        }

        async fn get_account(&self) -> Result<AccountSnapshot, BrokerError> {
            time::sleep(Duration::from_secs(3600)).await;
            Err(BrokerError::new(ErrorKind::Rejected, "unreachable"))
        }

        async fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
            Ok(Vec::new())
        }
    }

    pub fn signal(symbol: &str, action: SignalAction, confidence: f64) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            action,
            confidence,
            timestamp: Utc::now(),
        }
    }

    pub fn filled(order: &OrderRequest) -> Result<BrokerOrder, BrokerError> {
        Ok(BrokerOrder {
            id: format!("alp-{}", order.symbol),
            status: "accepted".to_string(),
            filled_at: None,
        })
    }

    pub fn executor(
        gateway: Arc<dyn BrokerGateway>,
        store: Arc<dyn TradeStore>,
        mode: Mode,
    ) -> (OrderExecutor, watch::Sender<bool>) {
        let (shutdown_tx, shutdown) = shutdown_channel();
        let executor = OrderExecutor::new(
            gateway,
            store,
            Arc::new(ModeController::new(mode)),
            RetryPolicy::default(),
            Duration::from_secs(10),
            1,
            shutdown,
        );
        (executor, shutdown_tx)
    }

    #[tokio::test]
    async fn auto_mode_signal_is_submitted_and_recorded() {
        let mut broker = MockBroker::new();
        broker
            .expect_submit_order()
            .times(1)
            .withf(|o| o.symbol == "TSLA" && o.side == OrderSide::Buy && o.quantity == 1)
            .returning(filled);
        let ledger = Arc::new(TradeLedger::in_memory().await.unwrap());
        let (executor, _shutdown) = executor(Arc::new(broker), ledger.clone(), Mode::Auto);

        let sig = signal("TSLA", SignalAction::Buy, 0.91);
        let routing = executor.route_signal(&sig, OrderSide::Buy).await.unwrap();

        let SignalRouting::Submitted(outcome) = routing else {
            panic!("expected submission, got {:?}", routing);
        };
        assert!(outcome.accepted);
        assert_eq!(outcome.attempts, 1);

        let trades = ledger.all().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol, "TSLA");
        assert_eq!(trades[0].side, OrderSide::Buy);
        assert_eq!(trades[0].origin, OrderOrigin::SignalAuto);
        assert!(trades[0].accepted);
        assert_eq!(trades[0].broker_order_id.as_deref(), Some("alp-TSLA"));
        assert_eq!(trades[0].signal.as_ref(), Some(&sig));
    }

    #[tokio::test]
    async fn manual_mode_signal_is_only_observed() {
        let mut broker = MockBroker::new();
        broker.expect_submit_order().never();
        let ledger = Arc::new(TradeLedger::in_memory().await.unwrap());
        let (executor, _shutdown) = executor(Arc::new(broker), ledger.clone(), Mode::Manual);

        let routing = executor
            .route_signal(&signal("NVDA", SignalAction::Buy, 0.99), OrderSide::Buy)
            .await
            .unwrap();

        assert!(matches!(routing, SignalRouting::Observed));
        assert!(ledger.all().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_exhausts_retries_into_one_failed_record() {
        let mut broker = MockBroker::new();
        broker
            .expect_submit_order()
            .times(4)
            .returning(|_| Err(BrokerError::new(ErrorKind::RateLimited, "429 too many requests")));
        let mut store = MockStore::new();
        store
            .expect_append()
            .times(1)
            .withf(|r| {
                !r.accepted && r.attempts == 4 && r.error == Some(ErrorKind::RateLimited)
            })
            .returning(|_| Ok(()));
        let (executor, _shutdown) = executor(Arc::new(broker), Arc::new(store), Mode::Auto);

        let start = Instant::now();
        let outcome = executor
            .submit(OrderRequest::market("AAPL", OrderSide::Sell, 2, OrderOrigin::ProgrammaticCall))
            .await
            .unwrap();

        assert!(!outcome.accepted);
        assert_eq!(outcome.error, Some(ErrorKind::RateLimited));
        assert_eq!(outcome.attempts, 4);
        assert_eq!(start.elapsed(), Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_recorded_without_retry() {
        let mut broker = MockBroker::new();
        broker
            .expect_submit_order()
            .times(1)
            .returning(|_| Err(BrokerError::new(ErrorKind::InsufficientFunds, "insufficient buying power")));
        let mut store = MockStore::new();
        store
            .expect_append()
            .times(1)
            .withf(|r| r.error == Some(ErrorKind::InsufficientFunds) && r.attempts == 1)
            .returning(|_| Ok(()));
        let (executor, _shutdown) = executor(Arc::new(broker), Arc::new(store), Mode::Manual);

        let start = Instant::now();
        let outcome = executor
            .submit(OrderRequest::market("MSFT", OrderSide::Buy, 1, OrderOrigin::ManualOperator))
            .await
            .unwrap();

        assert!(!outcome.accepted);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_broker_times_out_as_transient() {
        let mut store = MockStore::new();
        store
            .expect_append()
            .times(1)
            .withf(|r| r.error == Some(ErrorKind::Timeout) && r.attempts == 2)
            .returning(|_| Ok(()));
        let (shutdown_tx, shutdown) = shutdown_channel();
        let executor = OrderExecutor::new(
            Arc::new(StalledBroker),
            Arc::new(store),
            Arc::new(ModeController::new(Mode::Auto)),
            RetryPolicy::with_max_retries(1),
            Duration::from_secs(10),
            1,
            shutdown,
        );

        let start = Instant::now();
        let outcome = executor
            .submit(OrderRequest::market("AMD", OrderSide::Buy, 1, OrderOrigin::ProgrammaticCall))
            .await
            .unwrap();

        assert_eq!(outcome.error, Some(ErrorKind::Timeout));
        // 10s call, 1s backoff, 10s call.
        assert_eq!(start.elapsed(), Duration::from_secs(21));

        let err = executor.account().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        drop(shutdown_tx);
    }

    #[tokio::test]
    async fn failed_append_surfaces_broker_order_id() {
        let mut broker = MockBroker::new();
        broker.expect_submit_order().times(1).returning(filled);
        let mut store = MockStore::new();
        store
            .expect_append()
            .times(1)
            .returning(|_| Err(StorageError::Corrupt { seq: 0, reason: "disk full".into() }));
        let (executor, _shutdown) = executor(Arc::new(broker), Arc::new(store), Mode::Auto);

        let err = executor
            .submit(OrderRequest::market("GOOG", OrderSide::Buy, 1, OrderOrigin::ProgrammaticCall))
            .await
            .unwrap_err();

        let ExecutionError::Persistence { broker_order_id, .. } = &err;
        assert_eq!(broker_order_id.as_deref(), Some("alp-GOOG"));
        assert!(err.to_string().contains("alp-GOOG"));
    }

    #[tokio::test]
    async fn trades_follow_completion_order() {
        let mut broker = MockBroker::new();
        broker.expect_submit_order().returning(|o| {
            if o.symbol.starts_with("BAD") {
                Err(BrokerError::new(ErrorKind::InvalidSymbol, "asset not found"))
            } else {
                filled(o)
            }
        });
        let ledger = Arc::new(TradeLedger::in_memory().await.unwrap());
        let (executor, _shutdown) = executor(Arc::new(broker), ledger.clone(), Mode::Auto);

        let symbols = ["AAPL", "BAD1", "TSLA", "BAD2", "NVDA"];
        for symbol in symbols {
            executor
                .submit(OrderRequest::market(symbol, OrderSide::Buy, 1, OrderOrigin::ProgrammaticCall))
                .await
                .unwrap();
        }

        let trades = ledger.all().await;
        let seen: Vec<&str> = trades.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(seen, symbols);
        assert_eq!(trades.iter().filter(|t| t.accepted).count(), 3);
        assert_eq!(trades.iter().filter(|t| !t.accepted).count(), 2);
    }
}
