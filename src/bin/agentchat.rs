//! Interactive chat with the agents of an agent service.
//!
//! # Usage
//!
//! ```bash
//! # Chat with the first agent a local service offers
//! agentchat
//!
//! # Pick the service and the agent
//! agentchat --base-url http://localhost:4112 --agent researchAgent
//!
//! # Keep a JSON-lines log of all traffic
//! agentchat --log traffic.jsonl
//! ```
//!
//! # Commands
//!
//! - `/agents` - List the agents the service offers
//! - `/agent <name>` - Switch agents
//! - `/ask <question>` - One-shot answer outside the conversation
//! - `/clear` - Clear the conversation
//! - `/stats` - Show session statistics
//! - `/config` - Show the resolved configuration
//! - `/quit` - Exit the application

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use agentchat::chat::{
    ChatArgs, ChatCommand, ChatConfig, PlainTextRenderer, Renderer, TurnView, help_text,
    parse_command,
};
use agentchat::{
    AgentCatalog, AgentClient, ChatController, ChatLogger, ChatRequest, JsonLinesLogger,
    MessageRole, TurnOutcome,
};

/// How often the screen is refreshed while waiting for stream events.
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Main entry point for the agentchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("agentchat [OPTIONS]");
    let config = ChatConfig::from_args(args)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let mut renderer =
        PlainTextRenderer::with_color(config.use_color).with_interrupt(Arc::clone(&interrupted));

    let mut client = config.client()?;
    let logger: Option<Arc<dyn ChatLogger>> = match &config.log_path {
        Some(path) => Some(Arc::new(JsonLinesLogger::create(path)?)),
        None => None,
    };
    if let Some(logger) = &logger {
        client = client.with_logger(Arc::clone(logger));
    }

    let mut catalog = match AgentCatalog::load(&client).await {
        Ok(catalog) => catalog,
        Err(err) => {
            renderer.print_error(&format!("could not list agents: {err}"));
            AgentCatalog::default()
        }
    };

    let mut controller = ChatController::new(Arc::new(client.clone()), config.quiescence);
    if let Some(logger) = logger {
        controller = controller.with_logger(logger);
    }

    let initial_agent = config
        .agent
        .clone()
        .or_else(|| catalog.agents().first().map(|a| a.name.clone()));
    match initial_agent {
        Some(agent) => {
            if !catalog.is_empty() && catalog.select(&agent).is_err() {
                renderer.print_error(&format!("the service does not list an agent named {agent}"));
            }
            controller.start_new_session(&agent)?;
        }
        None => renderer.print_info("No agents available; use /agent <name> to pick one."),
    }

    let interrupted_clone = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    let mut rl = DefaultEditor::new()?;
    println!("Agent Chat ({})", client.base_url());
    if let Some(agent) = controller.state().agent_name() {
        println!("Talking to {}", agent_label(&catalog, agent));
    }
    println!("Type /help for commands, /quit to exit\n");

    loop {
        interrupted.store(false, Ordering::Relaxed);

        match rl.readline("You: ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            controller.clear_messages();
                            renderer.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::Agent(name) => {
                            if !catalog.is_empty()
                                && let Err(err) = catalog.select(&name)
                            {
                                renderer.print_error(&err.to_string());
                                continue;
                            }
                            match controller.start_new_session(&name) {
                                Ok(_) => renderer.print_info(&format!(
                                    "Now talking to {}.",
                                    agent_label(&catalog, &name)
                                )),
                                Err(err) => renderer.print_error(&err.to_string()),
                            }
                        }
                        ChatCommand::Agents => {
                            if catalog.is_empty() {
                                match AgentCatalog::load(&client).await {
                                    Ok(loaded) => catalog = loaded,
                                    Err(err) => {
                                        renderer.print_error(&err.to_string());
                                        continue;
                                    }
                                }
                            }
                            print_agents(&catalog, controller.state().agent_name());
                        }
                        ChatCommand::Ask(question) => {
                            ask(&client, &controller, &question, &mut renderer).await;
                        }
                        ChatCommand::Stats => print_stats(&controller, &catalog),
                        ChatCommand::ShowConfig => print_config(&config),
                        ChatCommand::Invalid(message) => renderer.print_error(&message),
                    }
                    continue;
                }

                let label = controller
                    .state()
                    .agent_name()
                    .map(|agent| agent_label(&catalog, agent))
                    .unwrap_or_else(|| "Agent".to_string());
                stream_turn(&mut controller, line, &label, &mut renderer).await;
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    controller.dispose();
    Ok(())
}

/// Send one message and render the response until the turn ends or the user interrupts it.
async fn stream_turn(
    controller: &mut ChatController<AgentClient>,
    content: &str,
    label: &str,
    renderer: &mut PlainTextRenderer,
) {
    let message_id = match controller.send_message(content).await {
        Ok(id) => id,
        Err(err) => {
            renderer.print_error(&err.to_string());
            return;
        }
    };

    renderer.start_response(label);
    let mut view = TurnView::new(message_id);
    view.render(&controller.state(), renderer);
    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);

    while controller.is_busy() {
        if renderer.should_interrupt() {
            controller.clear_messages();
            renderer.print_interrupted();
            renderer.print_info("Conversation cleared.");
            return;
        }
        tokio::select! {
            outcome = controller.process_next_event() => {
                if outcome.is_none() {
                    break;
                }
            }
            _ = refresh.tick() => {}
        }
        view.render(&controller.state(), renderer);
    }

    if let Some(TurnOutcome::Failed { error, .. }) = controller.last_outcome() {
        renderer.print_error(error);
    }
    renderer.finish_response();
}

async fn ask(
    client: &AgentClient,
    controller: &ChatController<AgentClient>,
    question: &str,
    renderer: &mut PlainTextRenderer,
) {
    let state = controller.state();
    let Some(agent) = state.agent_name() else {
        renderer.print_error("no agent selected");
        return;
    };
    let request = match ChatRequest::new(agent, question, None) {
        Ok(request) => request,
        Err(err) => {
            renderer.print_error(&err.to_string());
            return;
        }
    };
    match client.generate(&request).await {
        Ok(response) => match response.text {
            Some(text) => renderer.print_info(&text),
            None => renderer.print_info("(no text in response)"),
        },
        Err(err) => renderer.print_error(&err.to_string()),
    }
}

fn agent_label(catalog: &AgentCatalog, agent: &str) -> String {
    match catalog.get(agent) {
        Some(info) => info.label(),
        None => agent.to_string(),
    }
}

fn print_agents(catalog: &AgentCatalog, current: Option<&str>) {
    if catalog.is_empty() {
        println!("    No agents available.");
        return;
    }
    println!("    Agents:");
    for agent in catalog.agents() {
        let marker = if Some(agent.name.as_str()) == current {
            "*"
        } else {
            " "
        };
        match &agent.description {
            Some(description) => {
                println!("    {marker} {} ({}): {description}", agent.name, agent.label())
            }
            None => println!("    {marker} {} ({})", agent.name, agent.label()),
        }
    }
}

fn print_stats(controller: &ChatController<AgentClient>, catalog: &AgentCatalog) {
    let state = controller.state();
    let user = state
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .count();
    let assistant = state.messages.len() - user;
    let tokens: u64 = state
        .messages
        .iter()
        .filter_map(|m| m.metadata.as_ref().and_then(|md| md.tokens))
        .map(u64::from)
        .sum();

    println!("    Session Statistics:");
    match &state.session {
        Some(session) => {
            println!(
                "      Agent: {}",
                agent_label(catalog, &session.agent_name)
            );
            println!("      Session status: {:?}", session.status);
        }
        None => println!("      Agent: (none)"),
    }
    println!("      Conversation: {}", state.conversation_id);
    println!(
        "      Messages: {} ({user} from you, {assistant} from the agent)",
        state.messages.len()
    );
    println!("      Completion tokens: {tokens}");
    match &state.error {
        Some(error) => println!("      Last error: {error}"),
        None => println!("      Last error: (none)"),
    }
}

fn print_config(config: &ChatConfig) {
    println!("    Current Configuration:");
    println!("      Base URL: {}", config.base_url);
    println!(
        "      Agent: {}",
        config.agent.as_deref().unwrap_or("(first listed)")
    );
    println!("      Request timeout: {}s", config.timeout.as_secs());
    match config.quiescence {
        Some(quiescence) => println!("      Quiescence timeout: {}ms", quiescence.as_millis()),
        None => println!("      Quiescence timeout: (disabled)"),
    }
    match &config.log_path {
        Some(path) => println!("      Traffic log: {}", path.display()),
        None => println!("      Traffic log: (disabled)"),
    }
    println!(
        "      Color: {}",
        if config.use_color { "on" } else { "off" }
    );
}
