//! Figaro — a command-line AI agent host for MCP tool servers.

use anyhow::{Context, Result};
use clap::Parser;
use figaro_api::AnthropicBridge;
use figaro_config::{CliOverrides, FigaroConfig};
use figaro_core::{ConversationSink, FileSink, Supervisor, SupervisorOptions};
use figaro_mcp::ServerRegistry;
use figaro_types::{Event, EventType};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "figaro", version, about = "A command-line AI agent host for MCP tool servers")]
struct Cli {
    /// Model to use
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Maximum tokens per assistant turn
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,

    /// The request; all words are joined with spaces
    words: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    if cli.words.is_empty() {
        eprintln!("Nothing to say now. Bye bye.");
        return Ok(0);
    }

    let config = FigaroConfig::load(CliOverrides {
        model: cli.model,
        max_tokens: cli.max_tokens,
    })
    .context("Failed to load configuration")?;

    let servers = ServerRegistry::load(&config.servers_path())
        .context("Failed to load the server registry")?;

    let bridge = AnthropicBridge::new(&config.api_key, &config.api_base_url)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Failed to create the LLM bridge")?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(events_rx));

    let sink: Arc<dyn ConversationSink> =
        Arc::new(FileSink::new(config.config_dir.join(".conversation.json")));

    let supervisor = Supervisor::start(
        SupervisorOptions {
            container_runtime: config.container_runtime.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        },
        &servers,
        Arc::new(bridge),
        events_tx,
        Some(sink),
    )
    .await
    .map_err(|e| anyhow::anyhow!("{e}"))
    .context("Failed to start tool servers")?;

    tracing::info!(
        "figaro v{} (model: {}, {} tools)",
        env!("CARGO_PKG_VERSION"),
        config.model,
        supervisor.registry().len()
    );

    let text = cli.words.join(" ");
    let result = {
        let request = supervisor.request(&text);
        tokio::pin!(request);

        tokio::select! {
            result = &mut request => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
                supervisor.interrupt();
                // Cancellation unwinds the in-flight request promptly.
                request.as_mut().await
            }
        }
    };

    let cause = supervisor.shutdown().await;
    let _ = printer.await;

    match cause.or_else(|| result.err()) {
        None => Ok(0),
        Some(e) if e.is_cancelled() => {
            eprintln!();
            Ok(0)
        }
        Some(e) => {
            eprintln!("Error: {e}");
            Ok(1)
        }
    }
}

/// The UI stand-in: renders the event stream to stdout.
async fn print_events(mut events: mpsc::UnboundedReceiver<Event>) {
    let stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        let mut out = stdout.lock();
        match event.event_type {
            EventType::MessageStarted | EventType::MessagePart => {
                if let Some(data) = &event.data {
                    let _ = write!(out, "{data}");
                    let _ = out.flush();
                }
            }
            EventType::MessageEnded => {
                let _ = writeln!(out);
            }
            EventType::TaskFailed => {
                if let Some(data) = &event.data {
                    let _ = writeln!(std::io::stderr(), "task failed: {data}");
                }
            }
            EventType::TaskStarted | EventType::TaskCompleted => {}
        }
    }
}
