use std::fmt;

use serde::Serialize;

/// Coarse stage of an agent's work, inferred from markers in its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// Before any marker has been seen.
    Initializing,
    /// Breaking the request down.
    Planning,
    /// Running searches.
    Searching,
    /// Evaluating what was found.
    Analyzing,
    /// Writing the answer.
    Synthesizing,
}

impl Phase {
    /// What the agent is doing in this phase.
    pub fn action(self) -> &'static str {
        match self {
            Phase::Initializing => "Starting research...",
            Phase::Planning => "Analyzing request and planning research strategy",
            Phase::Searching => "Executing web searches",
            Phase::Analyzing => "Evaluating search results",
            Phase::Synthesizing => "Compiling comprehensive response",
        }
    }

    /// What the agent is thinking about in this phase.
    pub fn thinking(self) -> &'static str {
        match self {
            Phase::Initializing => "Preparing to analyze your request",
            Phase::Planning => "Breaking down the topic and determining search approach",
            Phase::Searching => "Finding relevant information sources",
            Phase::Analyzing => "Processing and analyzing found information",
            Phase::Synthesizing => "Organizing findings into coherent insights",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Initializing => "Initializing",
            Phase::Planning => "Planning",
            Phase::Searching => "Searching",
            Phase::Analyzing => "Analyzing",
            Phase::Synthesizing => "Synthesizing",
        };
        write!(f, "{label}")
    }
}

/// Progress shown while a response streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Current phase.
    pub phase: Phase,
    /// Short description of the current action.
    pub action: &'static str,
    /// Short description of the current line of thought.
    pub thinking: &'static str,
}

impl Progress {
    /// The fixed progress triple for a phase.
    pub fn for_phase(phase: Phase) -> Self {
        Self {
            phase,
            action: phase.action(),
            thinking: phase.thinking(),
        }
    }

    /// Progress before any marker has been seen.
    pub fn initializing() -> Self {
        Self::for_phase(Phase::Initializing)
    }
}
