//! AgentPrime: majority trade-volume direction.
//!
//! Buckets public trade volume per market into a rolling 60-second window,
//! buy-volume (`taker_side == yes`) against sell-volume (`taker_side ==
//! no`), and at the end of every window submits a limit order aligned with
//! whichever side cleared a 55% majority on each of the window's five
//! highest-volume markets. Carried from `agents/prime.py`'s majority-signal
//! design, not reworked.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::agent::{AgentContext, Strategy};
use crate::core::domain::{Action, MarketStatus, OrderType, Side, TradeIntent};

const WINDOW_SECONDS: i64 = 60;
const TOP_N_MARKETS: usize = 5;
const DEFAULT_COUNT: u32 = 1;
const MIN_CONFIDENCE: f64 = 0.55;

#[derive(Default, Clone, Copy)]
struct WindowVolume {
    yes_vol: u64,
    no_vol: u64,
}

struct WindowState {
    window_start_ms: i64,
    volume: HashMap<String, WindowVolume>,
    last_trade_ms: HashMap<String, i64>,
}

/// Majority-signal volume direction agent. All mutable window state lives
/// behind a `Mutex` since `on_market_update` is only ever driven by this
/// agent's own single-task run loop, but `Strategy` requires `Sync`.
pub struct AgentPrime {
    window: Mutex<WindowState>,
}

impl AgentPrime {
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            window: Mutex::new(WindowState {
                window_start_ms: now_ms,
                volume: HashMap::new(),
                last_trade_ms: HashMap::new(),
            }),
        }
    }
}

impl Default for AgentPrime {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait::async_trait]
impl Strategy for AgentPrime {
    async fn on_market_update(&self, ctx: &AgentContext) {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let markets = ctx.cache.get_all();

        let ranked = {
            let mut window = self.window.lock();
            accumulate_trades(&mut window, &markets, now_ms);

            if now_ms - window.window_start_ms < WINDOW_SECONDS * 1000 {
                return;
            }

            let mut ranked: Vec<(String, WindowVolume)> = window
                .volume
                .iter()
                .filter(|(_, v)| v.yes_vol + v.no_vol > 0)
                .map(|(ticker, v)| (ticker.clone(), *v))
                .collect();
            ranked.sort_by(|a, b| (b.1.yes_vol + b.1.no_vol).cmp(&(a.1.yes_vol + a.1.no_vol)));
            ranked.truncate(TOP_N_MARKETS);

            window.window_start_ms = now_ms;
            window.volume.clear();
            ranked
        };

        for (ticker, volume) in ranked {
            let Some(state) = markets.iter().find(|m| m.market_ticker().as_str() == ticker) else {
                continue;
            };
            if state.status() != MarketStatus::Open {
                continue;
            }

            let total = volume.yes_vol + volume.no_vol;
            if total == 0 {
                continue;
            }
            let yes_frac = volume.yes_vol as f64 / total as f64;
            let no_frac = volume.no_vol as f64 / total as f64;

            let (side, price, confidence) = if yes_frac >= MIN_CONFIDENCE {
                (Side::Yes, clamp_price(state.yes_bid()), yes_frac)
            } else if no_frac >= MIN_CONFIDENCE {
                (Side::No, clamp_price(state.no_bid()), no_frac)
            } else {
                continue;
            };

            let side_label = if side == Side::Yes { "yes" } else { "no" };
            ctx.broadcast_decision(state.market_ticker(), side_label, price, confidence);

            let intent = TradeIntent::new(
                ctx.agent_id,
                state.market_ticker().clone(),
                Action::Buy,
                side,
                OrderType::Limit,
                price,
                DEFAULT_COUNT,
                confidence,
                now_ms,
            );
            ctx.submit(intent).await;
        }
    }
}

fn accumulate_trades(
    window: &mut WindowState,
    markets: &[crate::core::domain::MarketState],
    now_ms: i64,
) {
    let cutoff_ms = now_ms - WINDOW_SECONDS * 1000;
    for state in markets {
        if state.status() != MarketStatus::Open {
            continue;
        }
        let ticker = state.market_ticker().as_str().to_string();
        let last_seen = *window.last_trade_ms.get(&ticker).unwrap_or(&0);
        let mut max_ts = last_seen;
        for trade in state.recent_trades() {
            if trade.timestamp_ms <= last_seen || trade.timestamp_ms < cutoff_ms {
                continue;
            }
            let entry = window.volume.entry(ticker.clone()).or_default();
            if trade.taker_side_yes {
                entry.yes_vol += u64::from(trade.count);
            } else {
                entry.no_vol += u64::from(trade.count);
            }
            max_ts = max_ts.max(trade.timestamp_ms);
        }
        if max_ts > last_seen {
            window.last_trade_ms.insert(ticker, max_ts);
        }
    }
}

fn clamp_price(bid: u8) -> u8 {
    let raised = if bid < 98 { bid + 1 } else { bid };
    raised.clamp(1, 99)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_price_raises_by_one_cent_unless_near_the_top() {
        assert_eq!(clamp_price(40), 41);
        assert_eq!(clamp_price(98), 98);
        assert_eq!(clamp_price(0), 1);
    }

    #[test]
    fn accumulate_trades_ignores_trades_outside_the_window() {
        let mut window = WindowState {
            window_start_ms: 0,
            volume: HashMap::new(),
            last_trade_ms: HashMap::new(),
        };
        let mut state = crate::core::domain::MarketState::new(
            crate::core::domain::MarketTicker::from("BTC-X"),
            crate::core::domain::EventTicker::from(""),
            crate::core::domain::SeriesTicker::from(""),
            MarketStatus::Open,
            0,
        );
        state.append_trade(
            crate::core::domain::RecentTrade {
                price: 40,
                count: 10,
                taker_side_yes: true,
                timestamp_ms: 0,
            },
            0,
        );
        accumulate_trades(&mut window, std::slice::from_ref(&state), 120_000);
        assert!(window.volume.is_empty());
    }

    #[test]
    fn accumulate_trades_buckets_by_taker_side() {
        let mut window = WindowState {
            window_start_ms: 0,
            volume: HashMap::new(),
            last_trade_ms: HashMap::new(),
        };
        let mut state = crate::core::domain::MarketState::new(
            crate::core::domain::MarketTicker::from("BTC-X"),
            crate::core::domain::EventTicker::from(""),
            crate::core::domain::SeriesTicker::from(""),
            MarketStatus::Open,
            0,
        );
        state.append_trade(
            crate::core::domain::RecentTrade {
                price: 40,
                count: 10,
                taker_side_yes: true,
                timestamp_ms: 1_000,
            },
            1_000,
        );
        state.append_trade(
            crate::core::domain::RecentTrade {
                price: 55,
                count: 3,
                taker_side_yes: false,
                timestamp_ms: 2_000,
            },
            2_000,
        );
        accumulate_trades(&mut window, std::slice::from_ref(&state), 10_000);
        let volume = window.volume.get("BTC-X").expect("ticker bucketed");
        assert_eq!(volume.yes_vol, 10);
        assert_eq!(volume.no_vol, 3);
    }
}
