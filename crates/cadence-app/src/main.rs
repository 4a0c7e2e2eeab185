//! Cadence application binary - composition root.
//!
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Build the scenario catalog, HTTP transport and offline toggle
//! 3. Run the delivery orchestrator behind a line-based prompt

mod cli;
mod render;

use std::io::Write;
use std::sync::Arc;

use cadence_core::config::CadenceConfig;
use cadence_core::types::DeliveryMode;
use cadence_delivery::{
    ChannelSink, DeliveryOrchestrator, HttpTransport, ModeFlag, ModeSource, Notification,
    ScenarioCatalog, StaticHeaders,
};
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use cli::{CliArgs, Command, HELP_TEXT};
use render::Transcript;

/// Load the scenario file if one is configured, otherwise the built-in set.
fn load_catalog(config: &CadenceConfig) -> ScenarioCatalog {
    let Some(path) = &config.replay.scenarios_path else {
        return ScenarioCatalog::builtin();
    };
    match ScenarioCatalog::load(path) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to load scenarios, using built-in set");
            ScenarioCatalog::builtin()
        }
    }
}

/// Print notifications as they arrive.
async fn render_loop(mut updates: mpsc::UnboundedReceiver<Notification>) {
    let mut transcript = Transcript::new();
    let mut stdout = std::io::stdout();
    while let Some(notification) = updates.recv().await {
        let text = transcript.render(&notification);
        if write!(stdout, "{}", text).and_then(|_| stdout.flush()).is_err() {
            tracing::warn!("stdout closed, stopping renderer");
            return;
        }
    }
}

fn toggle_mode(mode: DeliveryMode) -> DeliveryMode {
    match mode {
        DeliveryMode::Router => DeliveryMode::Benchmark,
        DeliveryMode::Benchmark => DeliveryMode::Router,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = if config_file.exists() {
        CadenceConfig::load(&config_file)?
    } else {
        CadenceConfig::default()
    };
    args.apply(&mut config);
    config.validate()?;

    // Tracing. Logs go to stderr so they never interleave with replies.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Cadence v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        path = %config_file.display(),
        endpoint = %config.backend.endpoint,
        "Configuration ready"
    );

    // Delivery stack.
    let catalog = load_catalog(&config);
    let headers = Arc::new(StaticHeaders::new(config.backend.headers.clone()));
    let transport = Arc::new(HttpTransport::new(&config.backend, headers)?);
    let mode_flag = ModeFlag::new(config.general.offline);
    let (sink, updates) = ChannelSink::new();
    let orchestrator = DeliveryOrchestrator::new(
        &config,
        catalog,
        transport,
        Arc::new(mode_flag.clone()),
        Arc::new(sink),
    );

    tokio::spawn(render_loop(updates));

    let mut mode = config.general.default_mode;
    println!(
        "cadence {} ({} mode, {}). Type /help for commands.",
        env!("CARGO_PKG_VERSION"),
        mode,
        if mode_flag.is_offline() { "offline" } else { "online" }
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match Command::parse(&line) {
            Command::Submit(text) => match orchestrator.submit(&text, mode) {
                Ok(handle) => {
                    tokio::spawn(async move {
                        let id = handle.assistant_message_id;
                        let outcome = handle.wait().await;
                        tracing::debug!(message_id = %id, outcome = ?outcome, "Reply settled");
                    });
                }
                Err(e) => eprintln!("! {}", e),
            },
            Command::Offline => {
                mode_flag.set_offline(true);
                println!("offline: scripted replies enabled");
            }
            Command::Online => {
                mode_flag.set_offline(false);
                println!("online: every message goes to the backend");
            }
            Command::Mode(next) => {
                mode = next.unwrap_or_else(|| toggle_mode(mode));
                println!("mode: {}", mode);
            }
            Command::Reset => {
                orchestrator.reset_conversation()?;
                println!("conversation cleared");
            }
            Command::Help => println!("{}", HELP_TEXT),
            Command::Quit => break,
            Command::Unknown(cmd) => eprintln!("! unknown command {}, try /help", cmd),
        }
    }

    tracing::info!("Cadence stopped");
    Ok(())
}
