//! The set of agents offered by the service, plus which one is selected.

use crate::client::AgentClient;
use crate::error::{Error, Result};
use crate::types::AgentInfo;

/// Agents known to the front-end, sorted by name, with an optional selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentCatalog {
    agents: Vec<AgentInfo>,
    selected: Option<usize>,
}

impl AgentCatalog {
    /// Build a catalog from a list of agents.  Nothing is selected.
    pub fn new(mut agents: Vec<AgentInfo>) -> Self {
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents.dedup_by(|a, b| a.name == b.name);
        Self {
            agents,
            selected: None,
        }
    }

    /// Fetch the catalog from the service.
    pub async fn load(client: &AgentClient) -> Result<Self> {
        Ok(Self::new(client.list_agents().await?))
    }

    /// All agents, sorted by name.
    pub fn agents(&self) -> &[AgentInfo] {
        &self.agents
    }

    /// Returns true if the service offers no agents.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Look up an agent by name.
    pub fn get(&self, name: &str) -> Option<&AgentInfo> {
        self.position(name).map(|idx| &self.agents[idx])
    }

    /// Select an agent by name.
    pub fn select(&mut self, name: &str) -> Result<&AgentInfo> {
        let Some(idx) = self.position(name) else {
            return Err(Error::not_found(
                format!("no agent named '{name}' in the catalog"),
                Some(name.to_string()),
            ));
        };
        self.selected = Some(idx);
        Ok(&self.agents[idx])
    }

    /// The selected agent.
    pub fn selected(&self) -> Option<&AgentInfo> {
        self.selected.map(|idx| &self.agents[idx])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.agents
            .binary_search_by(|agent| agent.name.as_str().cmp(name))
            .ok()
    }
}
