//! Persistent authenticated WebSocket client: one connection per
//! environment, login, subscribe-state persistence across reconnects,
//! keep-alive, and orderbook sequence-gap detection with automatic resync.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rsa::RsaPrivateKey;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::messages::{InboundMessage, OrderbookLevelWire, WsEvent};
use crate::core::auth;
use crate::core::domain::{Channel, Environment, MarketTicker, Subscription};
use crate::error::Result;

const PING_INTERVAL: Duration = Duration::from_secs(10);
const PONG_TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT_DELAYS: [Duration; 6] = [
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
    Duration::from_secs(30),
];
const SUBSCRIBE_BATCH_SIZE: usize = 1000;
const INTER_BATCH_PAUSE: Duration = Duration::from_millis(50);

struct Credentials {
    api_key: String,
    private_key: RsaPrivateKey,
}

pub struct KalshiWebSocketClient {
    environment: Environment,
    url: String,
    credentials: RwLock<Option<Credentials>>,
    subscriptions: Mutex<HashSet<Subscription>>,
    ob_seq: Mutex<HashMap<MarketTicker, u64>>,
    msg_id: AtomicU64,
    reconnect_attempts: AtomicU32,
    reconnect_signal: broadcast::Sender<()>,
    running: std::sync::atomic::AtomicBool,
}

impl KalshiWebSocketClient {
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        let (reconnect_signal, _) = broadcast::channel(16);
        Self {
            environment,
            url: environment.ws_url().to_string(),
            credentials: RwLock::new(None),
            subscriptions: Mutex::new(HashSet::new()),
            ob_seq: Mutex::new(HashMap::new()),
            msg_id: AtomicU64::new(1),
            reconnect_attempts: AtomicU32::new(0),
            reconnect_signal,
            running: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Build a client pointed at an arbitrary WebSocket URL instead of
    /// Kalshi's real `live`/`demo` hosts. Only exposed to tests.
    #[cfg(any(test, feature = "testkit"))]
    #[must_use]
    pub fn with_url(environment: Environment, url: String) -> Self {
        let (reconnect_signal, _) = broadcast::channel(16);
        Self {
            environment,
            url,
            credentials: RwLock::new(None),
            subscriptions: Mutex::new(HashSet::new()),
            ob_seq: Mutex::new(HashMap::new()),
            msg_id: AtomicU64::new(1),
            reconnect_attempts: AtomicU32::new(0),
            reconnect_signal,
            running: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn configure(&self, api_key: String, private_key: RsaPrivateKey) {
        *self.credentials.write() = Some(Credentials {
            api_key,
            private_key,
        });
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.credentials.read().is_some()
    }

    /// Subscribe to registration for hooks fired after every successful
    /// re-subscribe (used to trigger state reconciliation).
    #[must_use]
    pub fn subscribe_reconnect_hook(&self) -> broadcast::Receiver<()> {
        self.reconnect_signal.subscribe()
    }

    /// Add tickers to the desired subscription set. Idempotent: tickers
    /// already subscribed on the given channels are skipped.
    pub fn desired_subscribe(&self, channels: &[Channel], tickers: &[MarketTicker]) {
        let mut subs = self.subscriptions.lock();
        for &channel in channels {
            for ticker in tickers {
                subs.insert(Subscription::new(channel, ticker.clone()));
            }
        }
    }

    pub fn desired_unsubscribe(&self, channels: &[Channel], tickers: &[MarketTicker]) {
        let mut subs = self.subscriptions.lock();
        for &channel in channels {
            for ticker in tickers {
                subs.remove(&Subscription::new(channel, ticker.clone()));
            }
        }
    }

    #[must_use]
    pub fn desired_subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    fn next_id(&self) -> u64 {
        self.msg_id.fetch_add(1, Ordering::SeqCst)
    }

    fn backoff_delay(&self) -> Duration {
        let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) as usize;
        RECONNECT_DELAYS[attempt.min(RECONNECT_DELAYS.len() - 1)]
    }

    /// Main reconnect loop. Runs until `stop()` is called. Each iteration
    /// connects, logs in, re-subscribes, and reads until the connection
    /// drops, then backs off before retrying.
    pub async fn run(self: &Arc<Self>, queue: mpsc::Sender<InboundMessage>) {
        self.running.store(true, Ordering::SeqCst);
        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.connect_and_run(&queue).await {
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                let delay = self.backoff_delay();
                warn!(
                    environment = %self.environment,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "websocket disconnected, reconnecting"
                );
                sleep(delay).await;
            }
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn connect_and_run(self: &Arc<Self>, queue: &mpsc::Sender<InboundMessage>) -> Result<()> {
        if !self.is_configured() {
            sleep(Duration::from_secs(5)).await;
            return Ok(());
        }

        debug!(environment = %self.environment, url = %self.url, "connecting websocket");
        let (stream, _) = tokio_tungstenite::connect_async(&self.url).await?;
        let (mut write, mut read) = stream.split();

        self.reconnect_attempts.store(0, Ordering::SeqCst);

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        self.send_login(&outbound_tx)?;
        if self.desired_subscription_count() > 0 {
            self.resubscribe_all(&outbound_tx).await;
        }
        let _ = self.reconnect_signal.send(());

        let last_pong = Arc::new(Mutex::new(Instant::now()));
        let (force_close_tx, mut force_close_rx) = watch::channel(false);
        let ping_task = tokio::spawn(Self::ping_loop(
            outbound_tx.clone(),
            last_pong.clone(),
            force_close_tx,
        ));

        let result = loop {
            tokio::select! {
                _ = force_close_rx.changed() => {
                    break Ok(());
                }
                next = read.next() => {
                    match next {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_raw(&text, &last_pong, queue, &outbound_tx).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Err(e.into()),
                    }
                }
            }
        };

        ping_task.abort();
        drop(outbound_tx);
        let _ = writer.await;
        result
    }

    fn send_login(&self, outbound: &mpsc::UnboundedSender<Message>) -> Result<()> {
        let guard = self.credentials.read();
        let creds = guard.as_ref().expect("checked is_configured before connecting");
        let now_ms = chrono::Utc::now().timestamp_millis();
        let payload = auth::build_ws_login_payload(&creds.api_key, &creds.private_key, 1, now_ms)?;
        let _ = outbound.send(Message::Text(payload.to_string()));
        Ok(())
    }

    /// Re-issue subscribe commands for the full desired set, grouped by
    /// channel, batched at 1000 tickers with a 50ms inter-batch pause. Also
    /// clears sequence tracking since fresh snapshots are expected.
    async fn resubscribe_all(&self, outbound: &mpsc::UnboundedSender<Message>) {
        let grouped: HashMap<Channel, Vec<String>> = {
            let subs = self.subscriptions.lock();
            let mut map: HashMap<Channel, Vec<String>> = HashMap::new();
            for sub in subs.iter() {
                map.entry(sub.channel)
                    .or_default()
                    .push(sub.market_ticker.as_str().to_string());
            }
            map
        };

        for (channel, tickers) in grouped {
            for batch in tickers.chunks(SUBSCRIBE_BATCH_SIZE) {
                let msg = serde_json::json!({
                    "id": self.next_id(),
                    "cmd": "subscribe",
                    "params": { "channels": [channel.as_str()], "market_tickers": batch },
                });
                let _ = outbound.send(Message::Text(msg.to_string()));
                sleep(INTER_BATCH_PAUSE).await;
            }
        }

        self.ob_seq.lock().clear();
    }

    /// Re-request a fresh snapshot for one ticker's orderbook on the live
    /// connection: an `unsubscribe` immediately followed by a `subscribe`
    /// for `(orderbook_delta, ticker)`, matching what the exchange does for
    /// a full reconnect but scoped to a single gapped ticker. The desired
    /// set has already been updated by the caller; this just replays that
    /// change over the wire instead of waiting for the next reconnect.
    fn resync_orderbook(&self, outbound: &mpsc::UnboundedSender<Message>, ticker: &MarketTicker) {
        let unsubscribe = serde_json::json!({
            "id": self.next_id(),
            "cmd": "unsubscribe",
            "params": { "channels": [Channel::OrderbookDelta.as_str()], "market_tickers": [ticker.as_str()] },
        });
        let subscribe = serde_json::json!({
            "id": self.next_id(),
            "cmd": "subscribe",
            "params": { "channels": [Channel::OrderbookDelta.as_str()], "market_tickers": [ticker.as_str()] },
        });
        let _ = outbound.send(Message::Text(unsubscribe.to_string()));
        let _ = outbound.send(Message::Text(subscribe.to_string()));
    }

    async fn ping_loop(
        outbound: mpsc::UnboundedSender<Message>,
        last_pong: Arc<Mutex<Instant>>,
        force_close: watch::Sender<bool>,
    ) {
        loop {
            sleep(PING_INTERVAL).await;
            let sent_at = Instant::now();
            let msg = serde_json::json!({ "id": 99, "cmd": "ping" });
            if outbound.send(Message::Text(msg.to_string())).is_err() {
                return;
            }
            sleep(PONG_TIMEOUT).await;
            let pong_at = *last_pong.lock();
            if pong_at < sent_at {
                let _ = force_close.send(true);
                return;
            }
        }
    }

    async fn handle_raw(
        &self,
        raw: &str,
        last_pong: &Arc<Mutex<Instant>>,
        queue: &mpsc::Sender<InboundMessage>,
        outbound: &mpsc::UnboundedSender<Message>,
    ) {
        let event: WsEvent = match serde_json::from_str(raw) {
            Ok(e) => e,
            Err(_) => {
                warn!(environment = %self.environment, "received non-JSON or unrecognized websocket message");
                return;
            }
        };

        if matches!(event, WsEvent::Pong) {
            *last_pong.lock() = Instant::now();
            return;
        }
        if event.is_control() {
            return;
        }

        if let WsEvent::OrderbookDelta { msg } = &event {
            let ticker = MarketTicker::from(msg.market_ticker.as_str());
            if !self.sequence_ok(&ticker, msg.seq) {
                warn!(
                    environment = %self.environment,
                    ticker = %ticker,
                    seq = msg.seq,
                    "orderbook sequence gap detected, re-subscribing"
                );
                self.desired_unsubscribe(&[Channel::OrderbookDelta], std::slice::from_ref(&ticker));
                self.desired_subscribe(&[Channel::OrderbookDelta], std::slice::from_ref(&ticker));
                self.resync_orderbook(outbound, &ticker);
                return;
            }
        }

        let inbound = InboundMessage {
            environment: self.environment,
            event,
        };
        if queue.send(inbound).await.is_err() {
            warn!(environment = %self.environment, "inbound queue closed, dropping message");
        }
    }

    /// `true` if this sequence extends the tracked sequence (or starts a
    /// fresh one); records the new sequence either way unless it is a gap,
    /// in which case the tracked entry is evicted so the next message for
    /// this ticker is treated as a fresh start.
    fn sequence_ok(&self, ticker: &MarketTicker, seq: u64) -> bool {
        let mut tracked = self.ob_seq.lock();
        match tracked.get(ticker) {
            Some(&prev) if seq != prev + 1 => {
                tracked.remove(ticker);
                false
            }
            _ => {
                tracked.insert(ticker.clone(), seq);
                true
            }
        }
    }
}

#[allow(dead_code)]
fn as_levels(levels: &[OrderbookLevelWire]) -> Vec<(u8, u32)> {
    levels.iter().map(|l| (l.0, l.1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_follows_the_fixed_ladder_and_saturates() {
        let client = KalshiWebSocketClient::new(Environment::Demo);
        let expected = [500, 1000, 2000, 4000, 8000, 30000, 30000, 30000];
        for want_ms in expected {
            let got = client.backoff_delay();
            assert_eq!(got.as_millis() as u64, want_ms);
        }
    }

    #[test]
    fn sequence_ok_accepts_contiguous_and_rejects_gaps() {
        let client = KalshiWebSocketClient::new(Environment::Demo);
        let ticker = MarketTicker::from("BTC-X");
        assert!(client.sequence_ok(&ticker, 10));
        assert!(client.sequence_ok(&ticker, 11));
        assert!(!client.sequence_ok(&ticker, 13));
        // tracked entry was evicted by the gap; the next message starts fresh
        assert!(client.sequence_ok(&ticker, 1));
    }

    #[test]
    fn desired_subscribe_is_idempotent() {
        let client = KalshiWebSocketClient::new(Environment::Demo);
        let ticker = MarketTicker::from("BTC-X");
        client.desired_subscribe(&[Channel::Ticker], &[ticker.clone()]);
        client.desired_subscribe(&[Channel::Ticker], &[ticker]);
        assert_eq!(client.desired_subscription_count(), 1);
    }

    #[test]
    fn unsubscribe_then_resubscribe_preserves_membership() {
        let client = KalshiWebSocketClient::new(Environment::Demo);
        let ticker = MarketTicker::from("BTC-X");
        client.desired_subscribe(&[Channel::OrderbookDelta], &[ticker.clone()]);
        client.desired_unsubscribe(&[Channel::OrderbookDelta], &[ticker.clone()]);
        assert_eq!(client.desired_subscription_count(), 0);
        client.desired_subscribe(&[Channel::OrderbookDelta], &[ticker]);
        assert_eq!(client.desired_subscription_count(), 1);
    }
}
