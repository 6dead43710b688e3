//! Application orchestration: boots every subsystem in dependency order,
//! runs until a shutdown signal, then tears down in reverse order. Mirrors
//! the teacher's `app::orchestrator::Orchestrator::run_with_shutdown` shape
//! — one long async function building up shared state and spawning tasks,
//! selecting on a shutdown channel in its main loop.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::core::agent::peritia::AgentPeritia;
use crate::core::agent::prime::AgentPrime;
use crate::core::agent::{AgentRuntime, AgentSupervisor, Strategy};
use crate::core::auth;
use crate::core::broadcast::EventBroadcaster;
use crate::core::cache::MarketCache;
use crate::core::discovery::MarketDiscovery;
use crate::core::dispatcher::MessageDispatcher;
use crate::core::domain::{AgentId, AgentMode, Environment};
use crate::core::execution::ExecutionEngine;
use crate::core::kalshi::{InboundMessage, KalshiWebSocketClient, RestClient};
use crate::core::permission::PermissionLayer;
use crate::core::persistence::{NullStore, PersistenceStore, SqliteStore};
use crate::core::reconciliation::StateReconciliation;
use crate::error::Result;

const ENVIRONMENTS: [Environment; 2] = [Environment::Live, Environment::Demo];

// Fixed so persisted agent_state rows (keyed by agent_id) survive restarts.
const AGENT_PRIME_ID: &str = "b9d6f6b2-6b0b-4d2e-8e8c-2e6f8e8c9a01";
const AGENT_PERITIA_ID: &str = "b9d6f6b2-6b0b-4d2e-8e8c-2e6f8e8c9a02";

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Handles for every background task the orchestrator spawned, kept around
/// purely so shutdown can abort them in reverse order.
struct RunningSystem {
    agents: Vec<Arc<AgentRuntime>>,
    supervisor: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
    ws_clients: Vec<JoinHandle<()>>,
    discovery: Vec<JoinHandle<()>>,
    reconciliation: Vec<JoinHandle<()>>,
}

/// Boot the whole system and run until `shutdown` reports `true`.
pub async fn run(config: Config, shutdown: watch::Receiver<bool>) -> Result<()> {
    info!(
        active_environment = %config.active_environment,
        global_trading_enabled = config.global_trading_enabled,
        "kalshid starting"
    );

    let store: Arc<dyn PersistenceStore> = match &config.database_path {
        Some(path) => {
            let pool = crate::core::persistence::create_pool(&format!("sqlite://{path}"))?;
            info!(database_path = %path, "persistence backed by sqlite");
            Arc::new(SqliteStore::new(pool))
        }
        None => {
            info!("DATABASE_PATH not set, running without durable persistence");
            Arc::new(NullStore::new())
        }
    };

    let cache = MarketCache::as_shared();
    let broadcaster = EventBroadcaster::new();
    let permission = Arc::new(PermissionLayer::new());
    permission.set_global_trading(config.global_trading_enabled);
    permission.set_environment(config.active_environment);

    let mut rest_clients = HashMap::new();
    let mut ws_clients = HashMap::new();
    let mut execution_engines: HashMap<Environment, Arc<ExecutionEngine>> = HashMap::new();

    for environment in ENVIRONMENTS {
        let rest = Arc::new(RestClient::new(environment));
        let ws = Arc::new(KalshiWebSocketClient::new(environment));

        let configured = if let Some(creds) = config.credentials_for(environment) {
            match auth::load_private_key(&creds.private_key_path) {
                Ok(private_key) => {
                    rest.configure(creds.api_key.clone(), private_key.clone());
                    ws.configure(creds.api_key.clone(), private_key);
                    true
                }
                Err(e) => {
                    error!(%environment, error = %e, "failed to load private key, environment left unconfigured");
                    false
                }
            }
        } else {
            false
        };
        permission.set_keys_loaded(environment, configured);
        info!(%environment, configured, "environment credentials resolved");

        let engine = Arc::new(ExecutionEngine::new(
            rest.clone(),
            store.clone(),
            broadcaster.clone(),
            environment,
        ));
        engine.load_state_from_db().await?;

        rest_clients.insert(environment, rest);
        ws_clients.insert(environment, ws);
        execution_engines.insert(environment, engine);
    }

    let dispatcher = Arc::new(MessageDispatcher::new(
        cache.clone(),
        broadcaster.clone(),
        execution_engines.clone(),
    ));
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(4096);
    let dispatcher_handle = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(inbound_rx).await })
    };

    let mut ws_handles = Vec::new();
    let mut discovery_handles = Vec::new();
    let mut reconciliation_handles = Vec::new();

    for environment in ENVIRONMENTS {
        let ws = ws_clients[&environment].clone();
        let tx = inbound_tx.clone();
        ws_handles.push(tokio::spawn(async move { ws.run(tx).await }));

        let discovery = Arc::new(MarketDiscovery::new(
            rest_clients[&environment].clone(),
            ws_clients[&environment].clone(),
            cache.clone(),
            store.clone(),
            environment,
        ));
        if let Err(e) = discovery.run_once().await {
            warn!(%environment, error = %e, "initial market discovery pass failed");
        }
        discovery_handles.push(tokio::spawn(async move { discovery.run().await }));

        let reconciliation = Arc::new(StateReconciliation::new(
            rest_clients[&environment].clone(),
            store.clone(),
            broadcaster.clone(),
            environment,
        ));
        if let Err(e) = reconciliation.run_once().await {
            warn!(%environment, error = %e, "initial state reconciliation pass failed");
        }
        reconciliation_handles.push(tokio::spawn(async move { reconciliation.run().await }));
    }
    drop(inbound_tx);

    let persisted_agents = store.load_agent_states().await?;
    let supervisor = AgentSupervisor::new(cache.clone());
    let mut agents = Vec::new();

    let prime_id = AgentId::new(Uuid::parse_str(AGENT_PRIME_ID).expect("fixed uuid is valid"));
    let prime: Arc<dyn Strategy> = Arc::new(AgentPrime::new(now_ms()));
    agents.push(spawn_agent(
        prime_id,
        "prime",
        prime,
        &cache,
        &permission,
        &broadcaster,
        &execution_engines,
        &supervisor,
        &persisted_agents,
    ));

    let peritia_id = AgentId::new(Uuid::parse_str(AGENT_PERITIA_ID).expect("fixed uuid is valid"));
    let peritia: Arc<dyn Strategy> = Arc::new(AgentPeritia::new());
    agents.push(spawn_agent(
        peritia_id,
        "peritia",
        peritia,
        &cache,
        &permission,
        &broadcaster,
        &execution_engines,
        &supervisor,
        &persisted_agents,
    ));

    let supervisor_handle = tokio::spawn(supervisor.run());

    let system = RunningSystem {
        agents,
        supervisor: supervisor_handle,
        dispatcher: dispatcher_handle,
        ws_clients: ws_handles,
        discovery: discovery_handles,
        reconciliation: reconciliation_handles,
    };

    info!("kalshid running");
    wait_for_shutdown(shutdown).await;
    info!("shutdown signal received, tearing down");

    shutdown_system(system, &store).await;
    info!("kalshid stopped");
    Ok(())
}

/// Build one agent's runtime, restoring its persisted enabled/mode if a
/// prior run recorded one, and start it against the supervisor's tick
/// stream. New agents default to disabled + `FullStop`: an operator has to
/// explicitly opt an agent into `Auto` mode before it can trade.
#[allow(clippy::too_many_arguments)]
fn spawn_agent(
    agent_id: AgentId,
    name: &'static str,
    strategy: Arc<dyn Strategy>,
    cache: &Arc<MarketCache>,
    permission: &Arc<PermissionLayer>,
    broadcaster: &EventBroadcaster,
    execution_engines: &HashMap<Environment, Arc<ExecutionEngine>>,
    supervisor: &AgentSupervisor,
    persisted_agents: &[crate::core::domain::AgentRecord],
) -> Arc<AgentRuntime> {
    let existing = persisted_agents.iter().find(|r| r.agent_id() == agent_id);
    let (enabled, mode) = existing.map_or((false, AgentMode::FullStop), |r| (r.enabled(), r.mode()));

    let runtime = Arc::new(AgentRuntime::new(
        agent_id,
        name,
        strategy,
        cache.clone(),
        permission.clone(),
        broadcaster.clone(),
        execution_engines.clone(),
    ));
    runtime.set_mode(mode);
    if enabled {
        runtime.enable();
    }
    runtime.start(supervisor.subscribe());
    info!(agent = name, %agent_id, enabled, ?mode, "agent spawned");
    runtime
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn shutdown_system(system: RunningSystem, store: &Arc<dyn PersistenceStore>) {
    for agent in &system.agents {
        agent.stop().await;
        let record = agent.record();
        if let Err(e) = store.upsert_agent_state(&record, now_ms()).await {
            warn!(error = %e, "failed to persist agent state on shutdown");
        }
    }
    system.supervisor.abort();
    for handle in &system.discovery {
        handle.abort();
    }
    for handle in &system.reconciliation {
        handle.abort();
    }
    for handle in &system.ws_clients {
        handle.abort();
    }
    system.dispatcher.abort();
}
