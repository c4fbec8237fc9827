// Wireview - Main Entry Point
//
// Command line front end for the MCP session client:
// - one-shot subcommands for each protocol command
// - an interactive REPL that keeps one session alive
// - settings file + flag overrides for URL and headers
//
// Exchange records go to stdout, logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use wireview::config::{self, Settings};
use wireview::exchange::{self, Exchange, SessionStatus};
use wireview::mcp::Session;

/// Wireview: inspect MCP servers over HTTP
#[derive(Parser, Debug)]
#[command(name = "wireview")]
#[command(version)]
#[command(about = "Send MCP requests over HTTP and inspect every message exchanged", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// MCP server URL (overrides the settings file)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Extra header sent with every message, as KEY=VALUE (repeatable)
    #[arg(long = "header", value_name = "KEY=VALUE", value_parser = parse_header, global = true)]
    headers: Vec<(String, String)>,

    /// Settings file (default: ~/.config/wireview/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send the initialize request (and the initialized notification)
    Initialize,
    /// List the server's tools
    ToolsList {
        /// Run the initialize handshake first
        #[arg(long)]
        initialize: bool,
    },
    /// List the server's prompts
    PromptsList {
        /// Run the initialize handshake first
        #[arg(long)]
        initialize: bool,
    },
    /// List the server's resources
    ResourcesList {
        /// Run the initialize handshake first
        #[arg(long)]
        initialize: bool,
    },
    /// Call a tool
    CallTool {
        /// Tool name
        name: String,

        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,

        /// Run the initialize handshake first
        #[arg(long)]
        initialize: bool,
    },
    /// Send a hand-written JSON-RPC request
    Custom {
        /// Request JSON; missing `jsonrpc` and `id` are filled in
        json: String,

        /// Run the initialize handshake first
        #[arg(long)]
        initialize: bool,
    },
    /// Start an interactive session
    Repl,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty header name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Settings pick the log level, so loading them logs through a
    // bootstrap subscriber
    let settings_path = args.config.clone().unwrap_or_else(Settings::config_path);
    let settings = tracing::subscriber::with_default(bootstrap_subscriber(args.verbose), || {
        match &args.config {
            Some(path) => Settings::load_from_path(path),
            None => Settings::load(),
        }
    })
    .with_context(|| format!("Failed to load settings from {:?}", settings_path))?;

    init_tracing(args.verbose, &settings)?;
    info!("wireview v{} starting...", env!("CARGO_PKG_VERSION"));

    let http = reqwest::Client::builder()
        .user_agent(concat!("wireview/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let mut session = Session::with_client(http);
    settings.apply(&mut session);
    if let Some(url) = &args.url {
        config::validate_url(url)?;
        session.connect(url.as_str());
    }
    if !args.headers.is_empty() {
        let mut headers = session.custom_headers().clone();
        headers.extend(args.headers.iter().cloned());
        session.set_custom_headers(headers);
    }

    match args.command {
        Some(Commands::Initialize) => {
            report(exchange::initialize(&mut session).await)?;
        }
        Some(Commands::ToolsList { initialize }) => {
            handshake_if(initialize, &mut session).await?;
            report(exchange::list_tools(&mut session).await)?;
        }
        Some(Commands::PromptsList { initialize }) => {
            handshake_if(initialize, &mut session).await?;
            report(exchange::list_prompts(&mut session).await)?;
        }
        Some(Commands::ResourcesList { initialize }) => {
            handshake_if(initialize, &mut session).await?;
            report(exchange::list_resources(&mut session).await)?;
        }
        Some(Commands::CallTool {
            name,
            args,
            initialize,
        }) => {
            handshake_if(initialize, &mut session).await?;
            report(exchange::call_tool(&mut session, &name, args.as_deref()).await)?;
        }
        Some(Commands::Custom { json, initialize }) => {
            handshake_if(initialize, &mut session).await?;
            report(exchange::custom(&session, &json).await)?;
        }
        Some(Commands::Repl) => {
            info!("Starting interactive session...");
            repl(session, settings, settings_path).await?;
        }
        None => {
            info!("No command specified. Use \"wireview --help\" for usage.");
        }
    }

    Ok(())
}

fn bootstrap_subscriber(verbose: bool) -> impl tracing::Subscriber + Send + Sync {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish()
}

fn init_tracing(verbose: bool, settings: &Settings) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        settings.log_level()?
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match settings.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
    Ok(())
}

/// Print an exchange; a failed one becomes the process error
fn report(exchange: Exchange) -> Result<()> {
    print!("{}", exchange.render());
    match exchange.error {
        Some(error) => Err(anyhow::anyhow!(error)),
        None => Ok(()),
    }
}

async fn handshake_if(enabled: bool, session: &mut Session) -> Result<()> {
    if enabled {
        report(exchange::initialize(session).await)?;
        println!();
    }
    Ok(())
}

/// One line of REPL input
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Help,
    Quit,
    Status,
    Url(Option<String>),
    Headers(Option<String>),
    Initialize,
    Uninitialize,
    Tools,
    Prompts,
    Resources,
    Call { name: String, args: Option<String> },
    Custom(String),
    Empty,
}

impl ReplCommand {
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let rest = (!rest.is_empty()).then(|| rest.to_string());

        let command = match word.to_lowercase().as_str() {
            "" => Self::Empty,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "bye" => Self::Quit,
            "status" => Self::Status,
            "url" => Self::Url(rest),
            "headers" => Self::Headers(rest),
            "initialize" | "init" => Self::Initialize,
            "uninitialize" => Self::Uninitialize,
            "tools" | "tools-list" => Self::Tools,
            "prompts" | "prompts-list" => Self::Prompts,
            "resources" | "resources-list" => Self::Resources,
            "call" | "call-tool" => {
                let rest = rest.ok_or("usage: call <name> [json arguments]")?;
                let (name, args) = match rest.split_once(char::is_whitespace) {
                    Some((name, args)) => (name.to_string(), Some(args.trim().to_string())),
                    None => (rest, None),
                };
                Self::Call { name, args }
            }
            "custom" => Self::Custom(rest.ok_or("usage: custom <json>")?),
            other => return Err(format!("Unknown command: {}. Type 'help'.", other)),
        };
        Ok(command)
    }
}

fn print_help() {
    println!("\nAvailable commands:");
    println!("  url [URL]               - Show or set the server URL");
    println!("  headers [JSON|clear]    - Show, set or clear custom headers");
    println!("  initialize              - Send the initialize request");
    println!("  uninitialize            - Forget the negotiated session");
    println!("  tools                   - List tools");
    println!("  prompts                 - List prompts");
    println!("  resources               - List resources");
    println!("  call <name> [json]      - Call a tool");
    println!("  custom <json>           - Send a hand-written JSON-RPC request");
    println!("  status                  - Show session status");
    println!("  help                    - Show this help message");
    println!("  quit                    - Exit");
    println!();
}

/// Interactive session; a failed command never ends the loop
async fn repl(mut session: Session, mut settings: Settings, settings_path: PathBuf) -> Result<()> {
    println!("\n==========================================");
    println!("wireview interactive session");
    println!("==========================================");
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!("{}", SessionStatus::of(&session));
    println!("==========================================");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            println!("\nGoodbye!");
            break;
        };

        let command = match ReplCommand::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        };

        match command {
            ReplCommand::Empty => {}
            ReplCommand::Help => print_help(),
            ReplCommand::Quit => {
                println!("Goodbye!");
                break;
            }
            ReplCommand::Status => {
                let status = SessionStatus::of(&session);
                println!("{}\n{}", status, status.detail());
                if let Some(version) = session.protocol_version() {
                    println!("Protocol version: {}", version);
                }
                if let Some(id) = session.session_id() {
                    println!("Session id: {}", id);
                }
            }
            ReplCommand::Url(None) => {
                println!("{}", session.server_url().unwrap_or("(not set)"));
            }
            ReplCommand::Url(Some(url)) => {
                if let Err(e) = config::validate_url(&url) {
                    eprintln!("{:#}", e);
                    continue;
                }
                session.connect(url.as_str());
                settings.server_url = Some(url.clone());
                persist(&settings, &settings_path);
                println!("MCP server URL set: {}", url);
            }
            ReplCommand::Headers(None) => {
                if session.custom_headers().is_empty() {
                    println!("(no custom headers)");
                }
                for (name, value) in session.custom_headers() {
                    println!("{}: {}", name, value);
                }
            }
            ReplCommand::Headers(Some(text)) => {
                let text = if text.eq_ignore_ascii_case("clear") {
                    ""
                } else {
                    text.as_str()
                };
                let headers: BTreeMap<String, String> = match config::parse_headers_json(text) {
                    Ok(headers) => headers,
                    Err(e) => {
                        eprintln!("{:#}", e);
                        continue;
                    }
                };
                session.set_custom_headers(headers.clone());
                if headers.is_empty() {
                    println!("Custom headers cleared");
                } else {
                    println!("Custom headers set ({})", headers.len());
                }
                settings.custom_headers = headers;
                persist(&settings, &settings_path);
            }
            ReplCommand::Initialize => {
                print!("{}", exchange::initialize(&mut session).await.render());
                println!("{}", SessionStatus::of(&session));
            }
            ReplCommand::Uninitialize => {
                session.uninitialize();
                println!("MCP session uninitialized");
            }
            ReplCommand::Tools => print!("{}", exchange::list_tools(&mut session).await.render()),
            ReplCommand::Prompts => {
                print!("{}", exchange::list_prompts(&mut session).await.render())
            }
            ReplCommand::Resources => {
                print!("{}", exchange::list_resources(&mut session).await.render())
            }
            ReplCommand::Call { name, args } => {
                let record = exchange::call_tool(&mut session, &name, args.as_deref()).await;
                print!("{}", record.render());
            }
            ReplCommand::Custom(json) => {
                print!("{}", exchange::custom(&session, &json).await.render())
            }
        }
    }

    Ok(())
}

fn persist(settings: &Settings, path: &Path) {
    if let Err(e) = settings.save_to_path(path) {
        tracing::warn!("Could not save settings: {:#}", e);
    }
}
