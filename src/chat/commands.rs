//! Slash command parsing for the chat front-end.
//!
//! Input that starts with `/` controls the session instead of being sent to the agent.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Clear the conversation and start over with the same agent.
    Clear,

    /// Switch to another agent, starting a new session.
    Agent(String),

    /// List the agents the service offers.
    Agents,

    /// Ask the current agent a one-off question without streaming or recording it.
    Ask(String),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Display session statistics.
    Stats,

    /// Show the current configuration.
    ShowConfig,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be sent to the
/// agent.
///
/// # Examples
///
/// ```
/// # use agentchat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/agent weatherAgent").is_some());
/// assert!(parse_command("What is quantum computing?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" | "new" => ChatCommand::Clear,
        "agent" => match argument {
            Some(name) => ChatCommand::Agent(name.to_string()),
            None => ChatCommand::Invalid("/agent requires an agent name".to_string()),
        },
        "agents" => ChatCommand::Agents,
        "ask" => match argument {
            Some(question) => ChatCommand::Ask(question.to_string()),
            None => ChatCommand::Invalid("/ask requires a question".to_string()),
        },
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => ChatCommand::Stats,
        "config" => ChatCommand::ShowConfig,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /agents                List the agents the service offers
  /agent <name>          Switch agents (starts a new session)
  /clear                 Clear the conversation (alias: /new)
  /ask <question>        One-off question, answered without streaming
  /stats                 Show session statistics
  /config                Show current configuration
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl-C while a response streams to abandon it."#
}
