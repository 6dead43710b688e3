//! Market discovery: the periodic full `/markets` scan that seeds the
//! cache, persists discovered markets, and drives which tickers the
//! WebSocket client is subscribed to. Runs once at startup and then every
//! [`DISCOVERY_INTERVAL`]. Grounded on `market_discovery.py`'s pagination
//! and status-mapping design, carried over rather than redesigned.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::core::cache::MarketCache;
use crate::core::domain::{Channel, Environment, EventTicker, MarketStatus, MarketTicker, SeriesTicker};
use crate::core::kalshi::{KalshiWebSocketClient, RestClient};
use crate::core::persistence::{MarketRecord, PersistenceStore};

const DISCOVERY_INTERVAL: Duration = Duration::from_secs(300);
const PAGE_LIMIT: u32 = 1000;
const PAGE_FAILURE_BACKOFF: Duration = Duration::from_secs(5);

const STATE_ACTIVE: &str = "ACTIVE";
const STATE_WATCHLIST: &str = "WATCHLIST";
const STATE_INACTIVE: &str = "INACTIVE";

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn classify(kalshi_status: &str) -> (&'static str, MarketStatus) {
    match kalshi_status {
        "open" | "active" => (STATE_ACTIVE, MarketStatus::Open),
        "halted" => (STATE_WATCHLIST, MarketStatus::Halted),
        "closed" => (STATE_INACTIVE, MarketStatus::Closed),
        "settled" | "finalized" => (STATE_INACTIVE, MarketStatus::Settled),
        _ => (STATE_INACTIVE, MarketStatus::Closed),
    }
}

/// Scans the full market list for one environment, keeping the cache, the
/// persisted market table, and the WebSocket's desired-subscription set in
/// sync with what Kalshi currently reports.
pub struct MarketDiscovery {
    rest: Arc<RestClient>,
    ws: Arc<KalshiWebSocketClient>,
    cache: Arc<MarketCache>,
    store: Arc<dyn PersistenceStore>,
    environment: Environment,
    subscribed: Mutex<HashSet<MarketTicker>>,
    total_discovered: std::sync::atomic::AtomicUsize,
}

impl MarketDiscovery {
    #[must_use]
    pub fn new(
        rest: Arc<RestClient>,
        ws: Arc<KalshiWebSocketClient>,
        cache: Arc<MarketCache>,
        store: Arc<dyn PersistenceStore>,
        environment: Environment,
    ) -> Self {
        Self {
            rest,
            ws,
            cache,
            store,
            environment,
            subscribed: Mutex::new(HashSet::new()),
            total_discovered: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn total_discovered(&self) -> usize {
        self.total_discovered.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Run one discovery pass immediately, then repeat every
    /// [`DISCOVERY_INTERVAL`] until the task is dropped or aborted.
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.run_once().await {
                error!(environment = %self.environment, error = %e, "market discovery pass failed");
            }
            sleep(DISCOVERY_INTERVAL).await;
        }
    }

    /// A single full paginated scan. Public so callers (the orchestrator's
    /// startup sequence) can run it once, synchronously, before entering
    /// the periodic loop.
    pub async fn run_once(&self) -> crate::error::Result<()> {
        if !self.rest.is_configured() {
            info!(environment = %self.environment, "market discovery skipped, rest client not configured");
            return Ok(());
        }

        info!(environment = %self.environment, "market discovery starting full scan");
        let mut count = 0usize;
        let mut cursor: Option<String> = None;

        loop {
            let page = match self.rest.get_markets(PAGE_LIMIT, cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(environment = %self.environment, error = %e, "rest /markets page failed, retrying");
                    sleep(PAGE_FAILURE_BACKOFF).await;
                    continue;
                }
            };

            if page.markets.is_empty() {
                break;
            }

            for market in &page.markets {
                self.process_market(market).await;
                count += 1;
            }

            // Yield so a very large catalog doesn't starve the agent tasks
            // sharing this runtime.
            tokio::task::yield_now().await;

            cursor = page.cursor;
            if cursor.is_none() {
                break;
            }
        }

        self.total_discovered.store(count, std::sync::atomic::Ordering::SeqCst);
        info!(
            environment = %self.environment,
            total = count,
            subscribed = self.subscribed.lock().len(),
            "market discovery complete"
        );
        Ok(())
    }

    async fn process_market(&self, market: &serde_json::Value) {
        let Some(ticker_str) = market.get("ticker").and_then(|v| v.as_str()) else {
            return;
        };
        let ticker = MarketTicker::from(ticker_str);
        let event_ticker = market.get("event_ticker").and_then(|v| v.as_str()).unwrap_or("");
        let series_ticker = market.get("series_ticker").and_then(|v| v.as_str()).unwrap_or("");
        let kalshi_status = market
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_lowercase();
        let (internal_state, cache_status) = classify(&kalshi_status);

        self.cache.upsert_from_discovery(ticker_str, event_ticker, series_ticker, cache_status, now_ms());

        let record = MarketRecord {
            market_ticker: ticker.clone(),
            event_ticker: EventTicker::from(event_ticker),
            series_ticker: SeriesTicker::from(series_ticker),
            title: market.get("title").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            subtitle: market.get("subtitle").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            status: cache_status,
            internal_state: internal_state.to_string(),
            discovery_time_ms: now_ms(),
            last_sync_time_ms: now_ms(),
        };
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.upsert_market(&record).await {
                warn!(error = %e, "failed to persist discovered market");
            }
        });

        if internal_state == STATE_ACTIVE || internal_state == STATE_WATCHLIST {
            self.ensure_subscribed(&ticker);
        } else if self.subscribed.lock().remove(&ticker) {
            self.ws
                .desired_unsubscribe(&Channel::discovery_default(), std::slice::from_ref(&ticker));
        }
    }

    fn ensure_subscribed(&self, ticker: &MarketTicker) {
        let mut subscribed = self.subscribed.lock();
        if subscribed.contains(ticker) {
            return;
        }
        subscribed.insert(ticker.clone());
        drop(subscribed);
        self.ws
            .desired_subscribe(&Channel::discovery_default(), std::slice::from_ref(ticker));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_open_and_active_to_the_active_state() {
        assert_eq!(classify("open").0, STATE_ACTIVE);
        assert_eq!(classify("active").0, STATE_ACTIVE);
    }

    #[test]
    fn classify_maps_halted_to_watchlist() {
        assert_eq!(classify("halted").0, STATE_WATCHLIST);
        assert_eq!(classify("halted").1, MarketStatus::Halted);
    }

    #[test]
    fn classify_maps_closed_settled_and_finalized_to_inactive() {
        assert_eq!(classify("closed").0, STATE_INACTIVE);
        assert_eq!(classify("settled").0, STATE_INACTIVE);
        assert_eq!(classify("finalized").0, STATE_INACTIVE);
    }

    #[test]
    fn classify_falls_back_to_inactive_for_unknown_status() {
        assert_eq!(classify("something_new").0, STATE_INACTIVE);
    }

    #[tokio::test]
    async fn process_market_with_no_ticker_is_a_no_op() {
        let discovery = MarketDiscovery::new(
            Arc::new(RestClient::new(Environment::Demo)),
            Arc::new(KalshiWebSocketClient::new(Environment::Demo)),
            MarketCache::as_shared(),
            Arc::new(crate::core::persistence::NullStore::new()),
            Environment::Demo,
        );
        discovery.process_market(&serde_json::json!({"status": "open"})).await;
        assert_eq!(discovery.cache.size(), 0);
    }

    #[tokio::test]
    async fn process_market_subscribes_active_markets_exactly_once() {
        let ws = Arc::new(KalshiWebSocketClient::new(Environment::Demo));
        let discovery = MarketDiscovery::new(
            Arc::new(RestClient::new(Environment::Demo)),
            ws.clone(),
            MarketCache::as_shared(),
            Arc::new(crate::core::persistence::NullStore::new()),
            Environment::Demo,
        );
        let market = serde_json::json!({
            "ticker": "BTC-X",
            "event_ticker": "EV",
            "series_ticker": "SR",
            "status": "open",
        });
        discovery.process_market(&market).await;
        discovery.process_market(&market).await;
        assert_eq!(ws.desired_subscription_count(), Channel::discovery_default().len());
    }

    #[tokio::test]
    async fn process_market_unsubscribes_once_a_market_goes_inactive() {
        let ws = Arc::new(KalshiWebSocketClient::new(Environment::Demo));
        let discovery = MarketDiscovery::new(
            Arc::new(RestClient::new(Environment::Demo)),
            ws.clone(),
            MarketCache::as_shared(),
            Arc::new(crate::core::persistence::NullStore::new()),
            Environment::Demo,
        );
        discovery
            .process_market(&serde_json::json!({"ticker": "BTC-X", "status": "open"}))
            .await;
        discovery
            .process_market(&serde_json::json!({"ticker": "BTC-X", "status": "closed"}))
            .await;
        assert_eq!(ws.desired_subscription_count(), 0);
    }
}
