//! Agent runtime: the cooperative scheduler every trading strategy runs
//! under. A single supervisor task owns the one call to
//! [`MarketCache::notified`] the cache's `Notify` design demands; it
//! rebroadcasts each wake (or 60-second heartbeat) to every registered
//! agent over a coalescing `watch` channel, so an agent that is slow to
//! drain one tick simply sees the latest state on its next poll rather
//! than queuing stale ones. Each agent still runs as its own task, so one
//! agent's panic or stuck strategy never blocks another's.

pub mod peritia;
pub mod prime;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{error, info, warn};

use crate::core::broadcast::{Event, EventBroadcaster};
use crate::core::cache::MarketCache;
use crate::core::domain::{
    AgentId, AgentLifecycleState, AgentMode, AgentRecord, Environment, MarketTicker, TradeIntent,
};
use crate::core::execution::ExecutionEngine;
use crate::core::permission::PermissionLayer;

const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// One cache wake, as rebroadcast by [`AgentSupervisor`] to every agent.
/// `Heartbeat` carries no new data; it exists only so an idle agent
/// re-evaluates its own pause/enabled state at least once a minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    Update,
    Heartbeat,
}

/// The single task in the process allowed to call `MarketCache::notified`.
/// Everything downstream subscribes to its `watch::Receiver` instead.
pub struct AgentSupervisor {
    cache: Arc<MarketCache>,
    tick_tx: watch::Sender<Wake>,
}

impl AgentSupervisor {
    #[must_use]
    pub fn new(cache: Arc<MarketCache>) -> Self {
        let (tick_tx, _) = watch::channel(Wake::Heartbeat);
        Self { cache, tick_tx }
    }

    /// A coalescing view of the cache's wakeups. Cloning this receiver is
    /// how each [`AgentRuntime`] gets its own independent read cursor
    /// without adding a second waiter on the underlying `Notify`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Wake> {
        self.tick_tx.subscribe()
    }

    /// Run forever, translating `cache.notified()` into `watch` sends.
    /// Intended to be spawned once for the life of the process.
    pub async fn run(self) {
        loop {
            let wake = match timeout(HEARTBEAT_TIMEOUT, self.cache.notified()).await {
                Ok(()) => Wake::Update,
                Err(_) => Wake::Heartbeat,
            };
            if self.tick_tx.send(wake).is_err() {
                // No agents left subscribed; nothing left to drive.
                return;
            }
        }
    }
}

/// Per-strategy decision logic. Implementors read the cache and submit
/// `TradeIntent`s through the context; they never touch the execution
/// engine or permission layer directly.
#[async_trait::async_trait]
pub trait Strategy: Send + Sync {
    async fn on_market_update(&self, ctx: &AgentContext);
}

/// What a [`Strategy`] is handed on every wake: read access to the cache,
/// and the only path by which it may submit an intent or announce a
/// decision.
pub struct AgentContext {
    pub agent_id: AgentId,
    pub agent_name: &'static str,
    pub cache: Arc<MarketCache>,
    permission: Arc<PermissionLayer>,
    broadcaster: EventBroadcaster,
    execution_engines: HashMap<Environment, Arc<ExecutionEngine>>,
}

impl AgentContext {
    /// Route a generated intent through the permission layer and, if
    /// approved, the execution engine for the approved environment. Drops
    /// silently if the gates reject it or no engine is registered for that
    /// environment — the strategy never learns the outcome of its own
    /// submission.
    pub async fn submit(&self, intent: TradeIntent) {
        let Some(environment) = self.permission.evaluate(&intent) else {
            return;
        };
        let Some(engine) = self.execution_engines.get(&environment) else {
            warn!(%environment, "permission approved an environment with no execution engine wired");
            return;
        };
        engine.execute(intent).await;
    }

    pub fn broadcast_decision(
        &self,
        market_ticker: &MarketTicker,
        side: &'static str,
        price: u8,
        confidence: f64,
    ) {
        self.broadcaster.broadcast(Event::AgentDecision {
            agent_id: self.agent_id,
            agent_name: self.agent_name.to_string(),
            market_ticker: market_ticker.clone(),
            side,
            price,
            confidence,
        });
    }
}

/// Lifecycle wrapper around one [`Strategy`]: tracks `AgentLifecycleState`,
/// the enabled flag and pause gate, and isolates the strategy's own panics
/// so one broken agent cannot take down the others.
pub struct AgentRuntime {
    agent_id: AgentId,
    agent_name: &'static str,
    strategy: Arc<dyn Strategy>,
    ctx: Arc<AgentContext>,
    state: RwLock<AgentLifecycleState>,
    enabled: AtomicBool,
    mode: RwLock<AgentMode>,
    permission: Arc<PermissionLayer>,
    broadcaster: EventBroadcaster,
    pause_tx: watch::Sender<bool>,
    pause_rx: watch::Receiver<bool>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl AgentRuntime {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: AgentId,
        agent_name: &'static str,
        strategy: Arc<dyn Strategy>,
        cache: Arc<MarketCache>,
        permission: Arc<PermissionLayer>,
        broadcaster: EventBroadcaster,
        execution_engines: HashMap<Environment, Arc<ExecutionEngine>>,
    ) -> Self {
        let (pause_tx, pause_rx) = watch::channel(false);
        let ctx = Arc::new(AgentContext {
            agent_id,
            agent_name,
            cache,
            permission: permission.clone(),
            broadcaster: broadcaster.clone(),
            execution_engines,
        });
        Self {
            agent_id,
            agent_name,
            strategy,
            ctx,
            state: RwLock::new(AgentLifecycleState::Initializing),
            enabled: AtomicBool::new(false),
            mode: RwLock::new(AgentMode::FullStop),
            permission,
            broadcaster,
            pause_tx,
            pause_rx,
            task: parking_lot::Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    #[must_use]
    pub fn state(&self) -> AgentLifecycleState {
        *self.state.read()
    }

    pub fn set_mode(&self, mode: AgentMode) {
        *self.mode.write() = mode;
        self.permission.set_agent_mode(self.agent_id, mode);
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.set_state(AgentLifecycleState::Paused);
        let _ = self.pause_tx.send(true);
        info!(agent = self.agent_name, "agent paused");
    }

    pub fn resume(&self) {
        self.set_state(AgentLifecycleState::Active);
        let _ = self.pause_tx.send(false);
        info!(agent = self.agent_name, "agent resumed");
    }

    #[must_use]
    pub fn record(&self) -> AgentRecord {
        let mut record = AgentRecord::new(
            self.agent_id,
            self.agent_name.to_string(),
            self.enabled.load(Ordering::SeqCst),
            *self.mode.read(),
        );
        record.set_lifecycle_state(self.state());
        record
    }

    fn set_state(&self, state: AgentLifecycleState) {
        *self.state.write() = state;
    }

    async fn broadcast_state(&self) {
        self.broadcaster.broadcast(Event::AgentStateChanged {
            agent_id: self.agent_id,
            agent_name: self.agent_name.to_string(),
            lifecycle_state: self.state(),
        });
    }

    /// Launch the agent's run loop as its own task. A repeat call while
    /// already running is a no-op.
    pub fn start(self: &Arc<Self>, mut ticks: watch::Receiver<Wake>) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        self.set_state(AgentLifecycleState::Initializing);
        let this = self.clone();
        *task = Some(tokio::spawn(async move {
            this.set_state(AgentLifecycleState::Active);
            this.broadcast_state().await;
            this.run(&mut ticks).await;
        }));
        info!(agent = self.agent_name, "agent started");
    }

    /// Stop the agent. Aborts the run-loop task unconditionally rather
    /// than waiting for it to notice a flag, since a wedged strategy must
    /// not prevent shutdown.
    pub async fn stop(&self) {
        self.set_state(AgentLifecycleState::Stopped);
        let _ = self.pause_tx.send(false);
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        info!(agent = self.agent_name, "agent stopped");
    }

    async fn run(self: Arc<Self>, ticks: &mut watch::Receiver<Wake>) {
        loop {
            if self.state() == AgentLifecycleState::Stopped {
                return;
            }
            if ticks.changed().await.is_err() {
                return;
            }
            let wake = *ticks.borrow_and_update();

            if wake == Wake::Heartbeat {
                if self.state() != AgentLifecycleState::Paused {
                    self.set_state(AgentLifecycleState::Idle);
                }
                continue;
            }

            // Respect an in-flight pause: block here, not in the shared
            // supervisor loop, so other agents keep receiving ticks.
            let mut pause_rx = self.pause_rx.clone();
            while *pause_rx.borrow() {
                if pause_rx.changed().await.is_err() {
                    return;
                }
            }

            if !self.enabled.load(Ordering::SeqCst) {
                self.set_state(AgentLifecycleState::Idle);
                continue;
            }

            self.set_state(AgentLifecycleState::Active);

            let strategy = self.strategy.clone();
            let ctx = self.ctx.clone();
            let outcome = AssertUnwindSafe(strategy.on_market_update(&ctx))
                .catch_unwind()
                .await;

            if let Err(panic) = outcome {
                let message = panic_message(&panic);
                error!(agent = self.agent_name, error = %message, "agent strategy panicked");
                self.set_state(AgentLifecycleState::Error);
                self.broadcast_state().await;
                sleep(ERROR_BACKOFF).await;
                self.set_state(AgentLifecycleState::Active);
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persistence::NullStore;

    struct CountingStrategy {
        hits: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Strategy for CountingStrategy {
        async fn on_market_update(&self, _ctx: &AgentContext) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingStrategy;

    #[async_trait::async_trait]
    impl Strategy for PanickingStrategy {
        async fn on_market_update(&self, _ctx: &AgentContext) {
            panic!("strategy exploded");
        }
    }

    fn runtime(strategy: Arc<dyn Strategy>) -> Arc<AgentRuntime> {
        let cache = MarketCache::as_shared();
        let permission = Arc::new(PermissionLayer::new());
        let broadcaster = EventBroadcaster::new();
        let engines = HashMap::new();
        Arc::new(AgentRuntime::new(
            AgentId::generate(),
            "test-agent",
            strategy,
            cache,
            permission,
            broadcaster,
            engines,
        ))
    }

    #[tokio::test]
    async fn heartbeat_without_enable_keeps_agent_idle_and_never_invokes_strategy() {
        let strategy = Arc::new(CountingStrategy {
            hits: std::sync::atomic::AtomicUsize::new(0),
        });
        let supervisor = AgentSupervisor::new(MarketCache::as_shared());
        let rx = supervisor.subscribe();
        let agent = runtime(strategy.clone());
        agent.start(rx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        agent.stop().await;
        assert_eq!(strategy.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enabled_agent_runs_strategy_on_update_wake() {
        let cache = MarketCache::as_shared();
        let supervisor = AgentSupervisor::new(cache.clone());
        let rx = supervisor.subscribe();
        tokio::spawn(supervisor.run());

        let strategy = Arc::new(CountingStrategy {
            hits: std::sync::atomic::AtomicUsize::new(0),
        });
        let agent = runtime(strategy.clone());
        agent.enable();
        agent.set_mode(AgentMode::Auto);
        agent.start(rx);

        cache.upsert_from_ticker(&crate::core::kalshi::messages::TickerMsg {
            market_ticker: "BTC-X".into(),
            yes_bid: 40,
            no_bid: 55,
            price: 40,
            volume: 0,
            open_interest: 0,
            ts: 1,
        });

        tokio::time::timeout(Duration::from_secs(2), async {
            while strategy.hits.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("strategy ran within timeout");

        agent.stop().await;
    }

    #[tokio::test]
    async fn a_panicking_strategy_transitions_to_error_then_recovers() {
        let cache = MarketCache::as_shared();
        let supervisor = AgentSupervisor::new(cache.clone());
        let rx = supervisor.subscribe();
        tokio::spawn(supervisor.run());

        let agent = runtime(Arc::new(PanickingStrategy));
        agent.enable();
        agent.set_mode(AgentMode::Auto);
        agent.start(rx);

        cache.upsert_from_ticker(&crate::core::kalshi::messages::TickerMsg {
            market_ticker: "BTC-X".into(),
            yes_bid: 40,
            no_bid: 55,
            price: 40,
            volume: 0,
            open_interest: 0,
            ts: 1,
        });

        tokio::time::timeout(Duration::from_secs(2), async {
            while agent.state() != AgentLifecycleState::Error {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("agent observed in Error state after panic");

        agent.stop().await;
    }

    #[test]
    fn record_reflects_mode_and_enabled_flag() {
        let agent = runtime(Arc::new(CountingStrategy {
            hits: std::sync::atomic::AtomicUsize::new(0),
        }));
        agent.enable();
        agent.set_mode(AgentMode::SemiAuto);
        let record = agent.record();
        assert!(record.enabled());
        assert_eq!(record.mode(), AgentMode::SemiAuto);
    }

    #[allow(dead_code)]
    fn unused_store_reference_keeps_import_alive() -> Arc<dyn crate::core::persistence::PersistenceStore> {
        Arc::new(NullStore::new())
    }
}
