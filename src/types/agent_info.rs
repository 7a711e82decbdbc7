use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An agent as described by the agent service.
///
/// `name` is the key used in API paths; `display_name` is the human-facing label, when the
/// service provides one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    /// Key used to address the agent.
    pub name: String,

    /// Human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Short description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// System instructions the agent runs with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Model provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Model identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

impl AgentInfo {
    /// Create an agent record with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            instructions: None,
            provider: None,
            model_id: None,
        }
    }

    /// The label to show to a person: the display name, or the key split on camel case.
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(display_name) => display_name.clone(),
            None => split_camel_case(&self.name),
        }
    }
}

/// One entry of the agent listing, as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    /// Human-readable name.
    #[serde(default)]
    pub name: Option<String>,

    /// Short description.
    #[serde(default)]
    pub description: Option<String>,

    /// System instructions.
    #[serde(default)]
    pub instructions: Option<String>,

    /// Model provider.
    #[serde(default)]
    pub provider: Option<String>,

    /// Model identifier.
    #[serde(default)]
    pub model_id: Option<String>,
}

impl AgentRecord {
    /// Attach the addressing key to this record.
    pub fn into_agent(self, key: impl Into<String>) -> AgentInfo {
        AgentInfo {
            name: key.into(),
            display_name: self.name,
            description: self.description,
            instructions: self.instructions,
            provider: self.provider,
            model_id: self.model_id,
        }
    }
}

/// Response of the agent listing endpoint: a map keyed by agent name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentListResponse(pub BTreeMap<String, AgentRecord>);

impl AgentListResponse {
    /// Flatten the listing into agents sorted by key.
    pub fn into_agents(self) -> Vec<AgentInfo> {
        self.0
            .into_iter()
            .map(|(key, record)| record.into_agent(key))
            .collect()
    }
}

/// Response of the one-shot generate endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Generated text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

fn split_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (idx, c) in name.chars().enumerate() {
        if idx == 0 {
            out.extend(c.to_uppercase());
        } else if c.is_uppercase() {
            out.push(' ');
            out.push(c);
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_deserialization() {
        let json = serde_json::json!({
            "weatherAgent": {"name": "Weather Agent", "instructions": "Report weather."},
            "researchAgent": {"name": "Research Agent", "modelId": "gpt-4o", "tools": {}}
        });
        let listing: AgentListResponse = serde_json::from_value(json).unwrap();
        let agents = listing.into_agents();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name, "researchAgent");
        assert_eq!(agents[0].display_name.as_deref(), Some("Research Agent"));
        assert_eq!(agents[0].model_id.as_deref(), Some("gpt-4o"));
        assert_eq!(agents[1].name, "weatherAgent");
        assert_eq!(agents[1].instructions.as_deref(), Some("Report weather."));
    }

    #[test]
    fn label_falls_back_to_key() {
        assert_eq!(AgentInfo::new("streamingResearchAgent").label(), "Streaming Research Agent");
        let mut agent = AgentInfo::new("x");
        agent.display_name = Some("Explicit".to_string());
        assert_eq!(agent.label(), "Explicit");
    }

    #[test]
    fn generate_response_without_text() {
        let response: AgentResponse = serde_json::from_str("{}").unwrap();
        assert!(response.text.is_none());
    }
}
