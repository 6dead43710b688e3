//! Permission layer: the gate between the agent runtime and the execution
//! engine. Every `TradeIntent` passes three checks before it is forwarded;
//! failing any one silently drops the intent — agents never see a
//! rejection, they just never get executed.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::core::domain::{AgentId, AgentMode, Environment, TradeIntent};

/// Gate state, mutated by the control surface (global kill switch,
/// per-environment key status, per-agent mode) and read on every submit.
pub struct PermissionLayer {
    global_trading_enabled: RwLock<bool>,
    active_environment: RwLock<Environment>,
    keys_loaded: RwLock<HashMap<Environment, bool>>,
    agent_modes: RwLock<HashMap<AgentId, AgentMode>>,
}

impl PermissionLayer {
    #[must_use]
    pub fn new() -> Self {
        let mut keys_loaded = HashMap::new();
        keys_loaded.insert(Environment::Live, false);
        keys_loaded.insert(Environment::Demo, false);
        Self {
            global_trading_enabled: RwLock::new(false),
            active_environment: RwLock::new(Environment::Demo),
            keys_loaded: RwLock::new(keys_loaded),
            agent_modes: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_global_trading(&self, enabled: bool) {
        *self.global_trading_enabled.write() = enabled;
        debug!(enabled, "global trading toggled");
    }

    #[must_use]
    pub fn is_global_trading_enabled(&self) -> bool {
        *self.global_trading_enabled.read()
    }

    pub fn set_environment(&self, environment: Environment) {
        *self.active_environment.write() = environment;
    }

    #[must_use]
    pub fn active_environment(&self) -> Environment {
        *self.active_environment.read()
    }

    pub fn set_keys_loaded(&self, environment: Environment, loaded: bool) {
        self.keys_loaded.write().insert(environment, loaded);
    }

    pub fn set_agent_mode(&self, agent_id: AgentId, mode: AgentMode) {
        self.agent_modes.write().insert(agent_id, mode);
    }

    /// Evaluate a `TradeIntent` against the three gates. Returns the
    /// approved environment if the intent should be forwarded to the
    /// execution engine, or `None` if it was silently dropped.
    #[must_use]
    pub fn evaluate(&self, intent: &TradeIntent) -> Option<Environment> {
        if !self.is_global_trading_enabled() {
            return None;
        }

        let env = self.active_environment();
        if !*self.keys_loaded.read().get(&env).unwrap_or(&false) {
            return None;
        }

        let mode = self
            .agent_modes
            .read()
            .get(&intent.agent_id())
            .copied()
            .unwrap_or(AgentMode::FullStop);
        if mode != AgentMode::Auto {
            return None;
        }

        Some(env)
    }
}

impl Default for PermissionLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Action, MarketTicker, OrderType, Side};

    fn intent(agent_id: AgentId) -> TradeIntent {
        TradeIntent::new(
            agent_id,
            MarketTicker::from("BTC-X"),
            Action::Buy,
            Side::Yes,
            OrderType::Limit,
            50,
            1,
            0.8,
            0,
        )
    }

    #[test]
    fn drops_silently_when_global_trading_disabled() {
        let layer = PermissionLayer::new();
        let agent = AgentId::generate();
        layer.set_keys_loaded(Environment::Demo, true);
        layer.set_agent_mode(agent, AgentMode::Auto);
        assert_eq!(layer.evaluate(&intent(agent)), None);
    }

    #[test]
    fn drops_silently_when_environment_keys_not_loaded() {
        let layer = PermissionLayer::new();
        let agent = AgentId::generate();
        layer.set_global_trading(true);
        layer.set_agent_mode(agent, AgentMode::Auto);
        assert_eq!(layer.evaluate(&intent(agent)), None);
    }

    #[test]
    fn drops_silently_when_agent_not_in_auto_mode() {
        let layer = PermissionLayer::new();
        let agent = AgentId::generate();
        layer.set_global_trading(true);
        layer.set_keys_loaded(Environment::Demo, true);
        layer.set_agent_mode(agent, AgentMode::SemiAuto);
        assert_eq!(layer.evaluate(&intent(agent)), None);
    }

    #[test]
    fn passes_when_all_three_gates_are_open() {
        let layer = PermissionLayer::new();
        let agent = AgentId::generate();
        layer.set_global_trading(true);
        layer.set_keys_loaded(Environment::Demo, true);
        layer.set_agent_mode(agent, AgentMode::Auto);
        assert_eq!(layer.evaluate(&intent(agent)), Some(Environment::Demo));
    }

    #[test]
    fn unregistered_agent_defaults_to_full_stop_and_is_dropped() {
        let layer = PermissionLayer::new();
        layer.set_global_trading(true);
        layer.set_keys_loaded(Environment::Demo, true);
        assert_eq!(layer.evaluate(&intent(AgentId::generate())), None);
    }
}
