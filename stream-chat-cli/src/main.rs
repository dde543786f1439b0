//! CLI entry point for stream-chat

mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::{style, Term};
use render::Transcript;
use std::path::PathBuf;
use std::sync::Arc;
use stream_chat_client::{ConversationController, TransportEvent, Update};
use stream_chat_core::config::{ConfigLoader, ServerConfig};
use stream_chat_core::logging::init_logging;
use stream_chat_core::{FileStore, LocalStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "stream-chat")]
#[command(about = "Chat with a streaming assistant over WebSocket")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Chat endpoint, overriding the configured server
    #[arg(short, long, global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Print the saved transcript without connecting
    History,
    /// Forget the saved session and transcript
    Clear,
    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

type Events = Option<mpsc::UnboundedReceiver<TransportEvent>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = if let Some(dir) = &cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };
    let config = config_loader.load()?;
    let _log_guard = init_logging(&config.logging);

    let store: Arc<dyn LocalStore> = Arc::new(FileStore::new(config.storage.dir_path()));
    let mut controller = ConversationController::new(store);

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let url = match cli.url {
                Some(url) => ServerConfig::from_url(&url)?.endpoint(),
                None => config.server.endpoint(),
            };
            run_chat(&mut controller, &url).await?;
        }
        Commands::History => run_history(&controller)?,
        Commands::Clear => {
            controller.clear_session();
            println!("Session cleared");
        }
        Commands::Config { save } => {
            let path = config_loader.config_path();
            if save {
                config_loader.save(&config)?;
                println!("Saved {}", path.display());
            } else {
                println!("{}", style(format!("# {}", path.display())).dim());
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
    }

    controller.dispose();
    Ok(())
}

fn run_history(controller: &ConversationController) -> Result<()> {
    match controller.session_id() {
        Some(id) => println!("{}", style(format!("session {}", id)).dim()),
        None => println!("{}", style("no session").dim()),
    }
    Transcript::new().refresh(controller.messages(), &mut std::io::stdout())?;
    Ok(())
}

async fn run_chat(controller: &mut ConversationController, url: &str) -> Result<()> {
    let term = Term::stdout();
    let mut stdout = std::io::stdout();
    let mut transcript = Transcript::new();
    transcript.refresh(controller.messages(), &mut stdout)?;

    println!(
        "{}",
        style("Type a message, /clear to start over, /reconnect, /quit to exit").dim()
    );

    let mut events = connect(controller, url).await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                match line.trim() {
                    "" => continue,
                    "/quit" | "/exit" => break,
                    "/clear" => {
                        controller.clear_session();
                        transcript.reset();
                        println!("{}", style("Session cleared").dim());
                        // A fresh connection lets the service assign a new session
                        events = connect(controller, url).await;
                    }
                    "/reconnect" => {
                        events = connect(controller, url).await;
                    }
                    _ => {
                        if controller.send_message(&line) {
                            if term.is_term() {
                                let _ = term.clear_last_lines(1);
                            }
                        } else if controller.is_streaming() {
                            println!("{}", style("Wait for the reply to finish").yellow());
                        } else if !controller.is_connected() {
                            println!("{}", style("Not connected; try /reconnect").yellow());
                        } else {
                            println!("{}", style("Message could not be sent; try /reconnect").yellow());
                        }
                    }
                }
            }
            event = next_event(&mut events) => {
                let Some(event) = event else {
                    events = None;
                    continue;
                };
                match controller.handle_event(event) {
                    Update::Connected => {
                        println!("{}", style(format!("connected to {}", url)).dim());
                    }
                    Update::SessionAssigned(id) => {
                        info!("Using session {}", id);
                    }
                    Update::ServerError(content) => {
                        eprintln!("{} {}", style("server error:").red(), content);
                    }
                    Update::Disconnected(reason) => {
                        transcript.refresh(controller.messages(), &mut stdout)?;
                        let reason = reason.unwrap_or_else(|| "closed".to_string());
                        println!("{}", style(format!("disconnected ({}); /reconnect to retry", reason)).yellow());
                        events = None;
                        continue;
                    }
                    Update::LogChanged | Update::Ignored => {}
                }
            }
        }
        transcript.refresh(controller.messages(), &mut stdout)?;
    }

    Ok(())
}

async fn connect(controller: &mut ConversationController, url: &str) -> Events {
    match controller.connect(url).await {
        Ok(events) => Some(events),
        Err(e) => {
            warn!("Could not connect to {}: {}", url, e);
            println!(
                "{}",
                style(format!("could not connect to {}; /reconnect to retry", url)).yellow()
            );
            None
        }
    }
}

async fn next_event(events: &mut Events) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
