//! Configuration types for the chat front-end.
//!
//! Settings are layered: command-line arguments win over a YAML configuration file, which wins
//! over the environment (`AGENTCHAT_BASE_URL`) and the built-in defaults.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::client::{AgentClient, BASE_URL_ENV, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::transport::DEFAULT_QUIESCENCE;

/// Command-line arguments for the agentchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the agent service.
    #[arrrg(optional, "Agent service URL (default: http://localhost:4112)", "URL")]
    pub base_url: Option<String>,

    /// Agent to start chatting with.
    #[arrrg(optional, "Agent to chat with (default: first listed)", "AGENT")]
    pub agent: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "YAML configuration file", "FILE")]
    pub config: Option<String>,

    /// Seconds to wait for response headers.
    #[arrrg(optional, "Request timeout in seconds (default: 30)", "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// Milliseconds of stream silence before a response is treated as complete.
    #[arrrg(optional, "Quiescence timeout in ms, 0 disables (default: 30000)", "MS")]
    pub quiescence_ms: Option<u64>,

    /// File that receives a JSON-lines log of requests, stream parts, and turns.
    #[arrrg(optional, "Write a JSON-lines traffic log to FILE", "FILE")]
    pub log: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// The YAML configuration file.  Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatFileConfig {
    /// Base URL of the agent service.
    pub base_url: Option<String>,
    /// Agent to start chatting with.
    pub agent: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Quiescence timeout in milliseconds; 0 disables.
    pub quiescence_ms: Option<u64>,
    /// Traffic log file.
    pub log: Option<PathBuf>,
    /// Whether to use ANSI colors.
    pub color: Option<bool>,
}

impl ChatFileConfig {
    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::io(
                format!("cannot read config file {}", path.display()),
                e,
            )
        })?;
        Self::parse(&contents)
    }

    /// Parse a configuration document.
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }
}

/// Resolved configuration of a chat front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Base URL of the agent service.
    pub base_url: String,

    /// Agent to start with; `None` picks the first agent the service lists.
    pub agent: Option<String>,

    /// Time allowed for response headers.
    pub timeout: Duration,

    /// Stream silence after which a response is treated as complete; `None` disables the
    /// fallback.
    pub quiescence: Option<Duration>,

    /// Traffic log file.
    pub log_path: Option<PathBuf>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// The base URL comes from `AGENTCHAT_BASE_URL` when set.
    pub fn new() -> Self {
        Self {
            base_url: env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            agent: None,
            timeout: DEFAULT_TIMEOUT,
            quiescence: Some(DEFAULT_QUIESCENCE),
            log_path: None,
            use_color: true,
        }
    }

    /// Resolve arguments, loading the configuration file they name.
    pub fn from_args(args: ChatArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => ChatFileConfig::load(path)?,
            None => ChatFileConfig::default(),
        };
        Ok(Self::new().with_file(file).with_args(args))
    }

    /// Overlay settings from a configuration file.
    pub fn with_file(mut self, file: ChatFileConfig) -> Self {
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if file.agent.is_some() {
            self.agent = file.agent;
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = file.quiescence_ms {
            self.quiescence = quiescence_from_ms(ms);
        }
        if file.log.is_some() {
            self.log_path = file.log;
        }
        if let Some(color) = file.color {
            self.use_color = color;
        }
        self
    }

    /// Overlay settings from the command line.
    pub fn with_args(mut self, args: ChatArgs) -> Self {
        if let Some(base_url) = args.base_url {
            self.base_url = base_url;
        }
        if args.agent.is_some() {
            self.agent = args.agent;
        }
        if let Some(secs) = args.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = args.quiescence_ms {
            self.quiescence = quiescence_from_ms(ms);
        }
        if let Some(log) = args.log {
            self.log_path = Some(PathBuf::from(log));
        }
        if args.no_color {
            self.use_color = false;
        }
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the starting agent.
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the quiescence timeout.  `None` disables it.
    pub fn with_quiescence(mut self, quiescence: Option<Duration>) -> Self {
        self.quiescence = quiescence;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Build a client for the configured service.
    pub fn client(&self) -> Result<AgentClient> {
        AgentClient::with_options(Some(self.base_url.clone()), Some(self.timeout))
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn quiescence_from_ms(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}
