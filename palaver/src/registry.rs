//! Static registry of agent behavior profiles.
//!
//! Built once from component registrations at process init, then treated as
//! immutable for the lifetime of the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::llm::ChatModel;

/// One labeled behavior profile: which model answers, which tools it may
/// call, and how the router should describe it.
#[derive(Clone)]
pub struct AgentProfile {
    /// Shown to the activity selector when routing.
    pub routing_description: String,
    /// Shown in memory digests describing what this agent can do.
    pub memory_description: String,
    /// Extra system prompt appended for this profile.
    pub prompt: Option<String>,
    pub model: Arc<dyn ChatModel>,
    /// Names of the tools bound to this profile.
    pub tools: Vec<String>,
    /// Offered as a routing choice; the default stays reachable even when
    /// not listed.
    pub include: bool,
}

/// Immutable name → profile map with a guaranteed default.
#[derive(Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentProfile>,
    default_agent: String,
}

impl AgentRegistry {
    /// Builds the registry; the default agent must be registered.
    pub fn new(
        agents: BTreeMap<String, AgentProfile>,
        default_agent: impl Into<String>,
    ) -> Result<Self, RuntimeError> {
        let default_agent = default_agent.into();
        if !agents.contains_key(&default_agent) {
            return Err(RuntimeError::UnknownActivity(default_agent));
        }
        Ok(Self {
            agents,
            default_agent,
        })
    }

    pub fn get(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn default_name(&self) -> &str {
        &self.default_agent
    }

    pub fn default_profile(&self) -> &AgentProfile {
        &self.agents[&self.default_agent]
    }

    /// The profile for an activity, falling back to the default when the
    /// name is unknown.
    pub fn resolve(&self, name: &str) -> &AgentProfile {
        self.agents.get(name).unwrap_or_else(|| self.default_profile())
    }

    /// One routing line per includable agent.
    pub fn routing_choices(&self) -> String {
        self.agents
            .iter()
            .filter(|(_, profile)| profile.include)
            .map(|(name, profile)| format!("{name}: {}", profile.routing_description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
