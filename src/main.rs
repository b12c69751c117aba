//! GR2 Client - CLI
//!
//! Demo driver for the client SDK: interactive chat, health probe, and a
//! live price watcher.

use anyhow::Result;
use clap::{Parser, Subcommand};
use gr2_client::backend::{BackendApi, ScreenState};
use gr2_client::channel::{ChannelEvent, ConnectionManager};
use gr2_client::chat::ChatSession;
use gr2_client::http::ResilientClient;
use gr2_client::Config;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gr2")]
#[command(about = "Golden Retriever 2.0 client")]
struct Cli {
    /// Backend base URL (overrides config.yaml)
    #[arg(long, env = "GR2_BASE_URL")]
    base_url: Option<String>,

    /// WebSocket URL (overrides config.yaml)
    #[arg(long, env = "GR2_WS_URL")]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant interactively
    Chat,

    /// Probe backend availability
    Health,

    /// Stream live price updates from the persistent channel
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gr2_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(ws_url) = cli.ws_url {
        config.channel_url = ws_url;
    }

    match cli.command {
        Commands::Chat => run_chat(config).await,
        Commands::Health => run_health(config).await,
        Commands::Watch => run_watch(config).await,
    }
}

async fn run_chat(config: Config) -> Result<()> {
    let session = ChatSession::from_config(&config);
    session.manager().connect();

    println!(
        "Chatting with {} — type a question, 'retry', 'clear', or 'quit'.",
        config.base_url
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            "clear" => {
                session.clear();
                println!("(log cleared)");
            }
            "retry" => {
                let status = session.retry_connection().await;
                println!("(status: {status:?})");
            }
            question => match session.send(question, &ScreenState::default()).await {
                Some(message) => {
                    println!("{}", message.answer);
                    println!(
                        "(confidence: {}, via {:?}, status {:?})",
                        message
                            .confidence
                            .map_or_else(|| "n/a".into(), |c| format!("{c:.2}")),
                        message.transport,
                        session.status()
                    );
                }
                None => println!("(message dropped)"),
            },
        }
    }

    session.manager().disconnect();
    Ok(())
}

async fn run_health(config: Config) -> Result<()> {
    let api = BackendApi::new(ResilientClient::with_reqwest(), config.base_url, config.retry);

    match api.health().await {
        Ok(health) => {
            println!(
                "backend: {}",
                if health.available { "available" } else { "degraded" }
            );
        }
        Err(e) => {
            println!("backend: unreachable ({e})");
        }
    }
    Ok(())
}

async fn run_watch(config: Config) -> Result<()> {
    let manager = ConnectionManager::with_websocket(config.channel_url, config.reconnect);
    let mut events = manager.subscribe();
    manager.connect();

    println!("Watching live prices (Ctrl+C to stop)");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ChannelEvent::Price(price)) => println!("BTC {price:.2}"),
                Ok(ChannelEvent::Status(status)) => tracing::info!(?status, "channel status"),
                Ok(_) => {}
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.disconnect();
    Ok(())
}
