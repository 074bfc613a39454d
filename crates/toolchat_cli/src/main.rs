use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use toolchat_core::{AppConfig, ProviderKind, Turn};
use toolchat_mcp::McpManager;
use toolchat_reasoning::{create_adapter, ChatSession};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "toolchat.toml")]
    config: String,

    /// Provider override: anthropic, openai or ollama
    #[arg(short, long, env = "TOOLCHAT_PROVIDER")]
    provider: Option<ProviderKind>,

    /// Model override
    #[arg(short, long)]
    model: Option<String>,
}

#[derive(Debug, PartialEq)]
enum ReplCommand {
    Quit,
    Reset,
    Tools,
    Refresh,
    History,
    Help,
    Empty,
    Unknown(String),
    Message(String),
}

fn parse_command(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    match trimmed {
        "" => ReplCommand::Empty,
        "/quit" | "/exit" => ReplCommand::Quit,
        "/reset" => ReplCommand::Reset,
        "/tools" => ReplCommand::Tools,
        "/refresh" => ReplCommand::Refresh,
        "/history" => ReplCommand::History,
        "/help" => ReplCommand::Help,
        cmd if cmd.starts_with('/') => ReplCommand::Unknown(cmd.to_string()),
        text => ReplCommand::Message(text.to_string()),
    }
}

fn format_turn(turn: &Turn) -> String {
    match turn {
        Turn::User { text } => format!("you: {text}"),
        Turn::Assistant { text, tool_calls } => {
            let mut out = format!("assistant: {text}");
            for call in tool_calls {
                out.push_str(&format!(
                    "\n  -> {}({})",
                    call.name,
                    serde_json::Value::Object(call.arguments.clone())
                ));
            }
            out
        }
        Turn::ToolResult {
            tool_name, outcome, ..
        } => {
            let status = if outcome.success { "ok" } else { "failed" };
            format!("  <- {tool_name} [{status}]: {}", outcome.render_for_model())
        }
    }
}

/// File, then environment, then command-line flags. Flags are fed through the
/// same lookup as the environment so provider-specific keys follow the final provider.
fn load_config(args: &Args) -> anyhow::Result<AppConfig> {
    let lookup = |key: &str| match (key, args.provider, &args.model) {
        ("LLM_PROVIDER", Some(provider), _) => Some(provider.to_string()),
        ("LLM_MODEL", _, Some(model)) => Some(model.clone()),
        _ => std::env::var(key).ok(),
    };

    if Path::new(&args.config).exists() {
        return AppConfig::load_with(&args.config, lookup);
    }
    info!("No config at {}, using defaults", args.config);
    let mut config = AppConfig::default();
    config.apply_overrides_from(lookup);
    Ok(config)
}

const HELP: &str = "Commands: /reset /tools /refresh /history /help /quit";

fn prompt() -> io::Result<()> {
    print!("> ");
    io::stdout().flush()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let config = load_config(&args)?;

    let mut manager = McpManager::new(config.mcp_servers.clone());
    let gateway = Arc::new(manager.connect_all().await);
    info!(
        "Connected {} MCP server(s), {} tool(s)",
        manager.connected_count(),
        gateway.initial_tools().len()
    );

    let adapter = create_adapter(&config.llm, gateway.initial_tools().to_vec(), gateway.clone())
        .context("Failed to configure the model provider")?;
    let mut session = ChatSession::with_adapter(adapter);

    println!(
        "toolchat: {} / {}. {}",
        config.llm.provider,
        config.llm.model_name(),
        HELP
    );
    prompt()?;

    let stdin = io::stdin();
    let mut input = String::new();
    loop {
        input.clear();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        match parse_command(&input) {
            ReplCommand::Quit => break,
            ReplCommand::Empty => {}
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Unknown(cmd) => println!("Unknown command {cmd}. {HELP}"),
            ReplCommand::Reset => {
                session.reset();
                println!("History cleared.");
            }
            ReplCommand::Tools => {
                let names = session.tool_names();
                if names.is_empty() {
                    println!("No tools available.");
                } else {
                    println!("{}", names.join(", "));
                }
            }
            ReplCommand::Refresh => match session.refresh_tools(gateway.as_ref()).await {
                Ok(count) => println!("{count} tool(s) available."),
                Err(e) => println!("[error] {e:#}"),
            },
            ReplCommand::History => {
                for turn in session.history() {
                    println!("{}", format_turn(&turn));
                }
            }
            ReplCommand::Message(text) => match session.send(&text).await {
                Ok(reply) => println!("\n{reply}\n"),
                Err(e) => println!("[error] {e}"),
            },
        }
        prompt()?;
    }

    manager.disconnect_all().await;
    Ok(())
}
