use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::actors::{Actor, ActorType, ControlMessage, ShutdownSignal, is_shutdown, wait_for_shutdown};
use common::backoff::ReconnectBackoff;
use common::models::{Signal, StreamState, StreamStatus};

use crate::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use crate::remote::{Frame, decode_frame, ping_frame, subscribe_frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// Websocket client for the upstream signal feed.
///
/// Publishes validated signals on `signal_tx` and every state change on
/// `status_tx`. Reconnects forever with 1s..60s backoff until shutdown.
pub struct SignalGateway {
    id: Uuid,
    url: String,
    client_name: String,
    heartbeat_interval: Duration,
    signal_tx: broadcast::Sender<Arc<Signal>>,
    status_tx: Arc<watch::Sender<StreamStatus>>,
}

#[async_trait]
impl Actor for SignalGateway {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> ActorType {
        ActorType::SignalStream
    }

    async fn run(
        &mut self,
        supervisor_tx: mpsc::Sender<ControlMessage>,
        mut shutdown: ShutdownSignal,
    ) -> anyhow::Result<()> {
        let heartbeat_handle = self.spawn_heartbeat(supervisor_tx.clone());
        let mut backoff = ReconnectBackoff::default();
        let connect_timeout = self.heartbeat_interval * 2;

        while !is_shutdown(&shutdown) {
            self.publish(StreamState::Connecting, backoff.attempts());
            info!("Connecting to: {}", self.url);

            let attempt = tokio::select! {
                res = time::timeout(connect_timeout, tokio_tungstenite::connect_async(self.url.as_str())) => res,
                _ = wait_for_shutdown(&mut shutdown) => break,
            };

            match attempt {
                Ok(Ok((ws_stream, _))) => {
                    backoff.reset();
                    self.publish(StreamState::Connected, 0);
                    info!("Signal stream connected");

                    match self.session(ws_stream, &mut shutdown).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(reason) => {
                            warn!("Signal stream lost: {}", reason);
                        }
                    }
                }
                Ok(Err(e)) => {
                    error!("Connection failed: {}", e);
                    let report = ControlMessage::Error(self.id, format!("Connection failed: {}", e));
                    if supervisor_tx.send(report).await.is_err() {
                        self.publish(StreamState::Stopped, 0);
                        heartbeat_handle.abort();
                        anyhow::bail!("supervisor channel closed");
                    }
                }
                Err(_) => {
                    error!("Connection attempt timed out after {:?}", connect_timeout);
                }
            }

            let delay = backoff.next_delay();
            self.publish(StreamState::Reconnecting, backoff.attempts());
            info!("Reconnecting in {}s...", delay.as_secs());

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        self.publish(StreamState::Stopped, 0);
        info!("Signal stream stopped");
        heartbeat_handle.abort();
        Ok(())
    }
}

impl SignalGateway {
    pub fn new(
        url: &str,
        client_name: &str,
        heartbeat_interval: Duration,
        signal_tx: broadcast::Sender<Arc<Signal>>,
        status_tx: Arc<watch::Sender<StreamStatus>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.to_string(),
            client_name: client_name.to_string(),
            heartbeat_interval,
            signal_tx,
            status_tx,
        }
    }

    fn publish(&self, state: StreamState, reconnect_attempts: u32) {
        self.status_tx.send_modify(|status| {
            if status.state != state {
                status.since = Utc::now();
            }
            status.state = state;
            status.reconnect_attempts = reconnect_attempts;
        });
    }

    async fn session(&self, ws_stream: WsStream, shutdown: &mut ShutdownSignal) -> SessionEnd {
        let (mut write, mut read) = ws_stream.split();

        if let Err(e) = write
            .send(Message::Text(subscribe_frame(&self.client_name).into()))
            .await
        {
            return SessionEnd::Lost(format!("subscribe failed: {}", e));
        }

        let mut monitor = HeartbeatMonitor::new(self.heartbeat_interval, Instant::now());
        let mut ticker = time::interval((self.heartbeat_interval / 4).max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(shutdown) => {
                    debug!("Closing signal stream on shutdown");
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            monitor.on_inbound(Instant::now());
                            self.handle_text(text.as_str());
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            monitor.on_inbound(Instant::now());
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                return SessionEnd::Lost(format!("pong failed: {}", e));
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            return SessionEnd::Lost("closed by server".to_string());
                        }
                        Some(Ok(Message::Binary(payload))) => {
                            monitor.on_inbound(Instant::now());
                            debug!("Ignoring binary frame ({} bytes)", payload.len());
                        }
                        Some(Ok(_)) => {
                            monitor.on_inbound(Instant::now());
                        }
                        Some(Err(e)) => {
                            return SessionEnd::Lost(format!("websocket error: {}", e));
                        }
                        None => {
                            return SessionEnd::Lost("stream ended".to_string());
                        }
                    }
                }

                _ = ticker.tick() => {
                    match monitor.poll(Instant::now()) {
                        HeartbeatAction::Idle => {}
                        HeartbeatAction::SendPing => {
                            debug!("Stream idle, sending liveness ping");
                            if let Err(e) = write.send(Message::Text(ping_frame().into())).await {
                                return SessionEnd::Lost(format!("ping failed: {}", e));
                            }
                        }
                        HeartbeatAction::Dead => {
                            return SessionEnd::Lost(format!(
                                "no response within {:?}",
                                monitor.interval() * 2
                            ));
                        }
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        self.status_tx
            .send_modify(|status| status.last_frame_at = Some(Utc::now()));

        match decode_frame(text) {
            Ok(Frame::Signal(signal)) => {
                info!(
                    "Received signal: {} {} (confidence: {:.2})",
                    signal.symbol, signal.action, signal.confidence
                );
                if self.signal_tx.send(Arc::new(signal)).is_err() {
                    debug!("No signal subscribers, dropping signal");
                }
            }
            Ok(Frame::Pong) | Ok(Frame::Heartbeat) => {
                debug!("Received heartbeat response");
            }
            Ok(Frame::ServerError(message)) => {
                error!("Error from server: {}", message);
            }
            Ok(Frame::Other(kind)) => {
                debug!("Ignoring '{}' frame", kind);
            }
            Err(e) => {
                warn!("Dropping malformed frame: {} ({})", e, text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::actors::shutdown_channel;
    use common::models::SignalAction;
    use tokio::net::TcpListener;

    fn signal_json(symbol: &str, action: &str, confidence: f64) -> String {
        format!(
            r#"{{"type":"signal","symbol":"{}","action":"{}","confidence":{},"timestamp":"2024-03-01T14:30:00Z"}}"#,
            symbol, action, confidence
        )
    }

    struct Harness {
        signal_rx: broadcast::Receiver<Arc<Signal>>,
        status_rx: watch::Receiver<StreamStatus>,
        shutdown_tx: watch::Sender<bool>,
        handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    }

    fn start_gateway(url: String, heartbeat: Duration) -> Harness {
        let (signal_tx, signal_rx) = broadcast::channel(16);
        let (status_tx, status_rx) = watch::channel(StreamStatus::default());
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let (supervisor_tx, mut supervisor_rx) = mpsc::channel(64);
        tokio::spawn(async move { while supervisor_rx.recv().await.is_some() {} });

        let mut gateway = SignalGateway::new(
            &url,
            "test-client",
            heartbeat,
            signal_tx,
            Arc::new(status_tx),
        );
        let handle = tokio::spawn(async move { gateway.run(supervisor_tx, shutdown_rx).await });

        Harness {
            signal_rx,
            status_rx,
            shutdown_tx,
            handle,
        }
    }

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn valid_signals_are_published_and_bad_frames_dropped() {
        let (listener, url) = listener().await;

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let subscribe = ws.next().await.unwrap().unwrap();
            assert!(subscribe.to_text().unwrap().contains("subscribe"));

            ws.send(Message::Binary(vec![0xde, 0xad].into())).await.unwrap();
            for frame in [
                "garbage".to_string(),
                signal_json("TSLA", "BUY", 1.7),
                r#"{"type":"pong"}"#.to_string(),
                signal_json("TSLA", "BUY", 0.91),
                signal_json("AAPL", "SELL", 0.40),
            ] {
                ws.send(Message::Text(frame.into())).await.unwrap();
            }
            // keep the socket open until the client goes away
            while ws.next().await.is_some() {}
        });

        let mut h = start_gateway(url, Duration::from_secs(30));

        let first = h.signal_rx.recv().await.unwrap();
        assert_eq!(first.symbol, "TSLA");
        assert_eq!(first.action, SignalAction::Buy);
        assert_eq!(first.confidence, 0.91);

        let second = h.signal_rx.recv().await.unwrap();
        assert_eq!(second.symbol, "AAPL");
        assert_eq!(h.status_rx.borrow().state, StreamState::Connected);
        assert!(h.status_rx.borrow().last_frame_at.is_some());

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap().unwrap();
        assert_eq!(h.status_rx.borrow().state, StreamState::Stopped);
    }

    #[tokio::test]
    async fn reconnects_after_server_close() {
        let (listener, url) = listener().await;

        tokio::spawn(async move {
            // first session: close straight away
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.close(None).await.unwrap();
            drop(ws);

            // second session: deliver a signal
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _subscribe = ws.next().await;
            ws.send(Message::Text(signal_json("MSFT", "BUY", 0.8).into()))
                .await
                .unwrap();
            while ws.next().await.is_some() {}
        });

        let mut h = start_gateway(url, Duration::from_secs(30));

        let signal = time::timeout(Duration::from_secs(10), h.signal_rx.recv())
            .await
            .expect("no signal after reconnect")
            .unwrap();
        assert_eq!(signal.symbol, "MSFT");
        assert_eq!(h.status_rx.borrow().reconnect_attempts, 0);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn silent_server_is_declared_dead() {
        let (listener, url) = listener().await;

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            // read pings but never answer them
            while ws.next().await.is_some() {}
        });

        let mut h = start_gateway(url, Duration::from_millis(100));

        h.status_rx
            .wait_for(|s| s.state == StreamState::Connected)
            .await
            .unwrap();
        let detected = time::timeout(
            Duration::from_secs(5),
            h.status_rx.wait_for(|s| s.state == StreamState::Reconnecting),
        )
        .await
        .is_ok();
        assert!(detected, "dead connection was not detected");

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unreachable_upstream_keeps_retrying_until_shutdown() {
        let (listener, url) = listener().await;
        drop(listener);

        let mut h = start_gateway(url, Duration::from_secs(30));

        h.status_rx
            .wait_for(|s| s.state == StreamState::Reconnecting && s.reconnect_attempts == 1)
            .await
            .unwrap();

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap().unwrap();
        assert_eq!(h.status_rx.borrow().state, StreamState::Stopped);
    }

    #[tokio::test]
    async fn stops_when_supervisor_is_gone() {
        let (listener, url) = listener().await;
        drop(listener);

        let (signal_tx, _signal_rx) = broadcast::channel(16);
        let (status_tx, status_rx) = watch::channel(StreamStatus::default());
        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let (supervisor_tx, supervisor_rx) = mpsc::channel(64);
        drop(supervisor_rx);

        let mut gateway = SignalGateway::new(
            &url,
            "test-client",
            Duration::from_secs(30),
            signal_tx,
            Arc::new(status_tx),
        );
        let result = time::timeout(Duration::from_secs(5), gateway.run(supervisor_tx, shutdown_rx))
            .await
            .expect("gateway kept running without a supervisor");

        assert!(result.is_err());
        assert_eq!(status_rx.borrow().state, StreamState::Stopped);
    }
}
