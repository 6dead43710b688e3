//! Agent identity, mode and lifecycle records.

use super::id::AgentId;

/// Submission policy: only `Auto` causes trade intents to reach the
/// execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum AgentMode {
    Auto,
    SemiAuto,
    FullStop,
}

/// Lifecycle states driven by the agent run loop (see `core::agent::base`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentLifecycleState {
    Initializing,
    Active,
    Idle,
    Paused,
    Error,
    Stopped,
}

/// Durable record of an agent's identity and last-known state, persisted so
/// mode/enablement survive process restarts.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    agent_id: AgentId,
    name: String,
    enabled: bool,
    mode: AgentMode,
    lifecycle_state: AgentLifecycleState,
}

impl AgentRecord {
    #[must_use]
    pub const fn new(agent_id: AgentId, name: String, enabled: bool, mode: AgentMode) -> Self {
        Self {
            agent_id,
            name,
            enabled,
            mode,
            lifecycle_state: AgentLifecycleState::Stopped,
        }
    }

    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub const fn mode(&self) -> AgentMode {
        self.mode
    }

    #[must_use]
    pub const fn lifecycle_state(&self) -> AgentLifecycleState {
        self.lifecycle_state
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_mode(&mut self, mode: AgentMode) {
        self.mode = mode;
    }

    pub fn set_lifecycle_state(&mut self, state: AgentLifecycleState) {
        self.lifecycle_state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_stopped() {
        let r = AgentRecord::new(AgentId::generate(), "prime".into(), false, AgentMode::FullStop);
        assert_eq!(r.lifecycle_state(), AgentLifecycleState::Stopped);
        assert!(!r.enabled());
    }

    #[test]
    fn mode_and_lifecycle_are_mutable() {
        let mut r = AgentRecord::new(AgentId::generate(), "prime".into(), true, AgentMode::FullStop);
        r.set_mode(AgentMode::Auto);
        r.set_lifecycle_state(AgentLifecycleState::Active);
        assert_eq!(r.mode(), AgentMode::Auto);
        assert_eq!(r.lifecycle_state(), AgentLifecycleState::Active);
    }
}
