use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use prism_core::{CompletionPolicy, DriverMode};
use prism_engine::{ActionLogEntry, EngineConfig, LogKind, RemoteChannelDriver, SessionError, SessionHandle};
use prism_server::ServerConfig;
use prism_settings::PrismSettings;
use prism_telemetry::{init_telemetry, parse_level, MetricsRecorder, TelemetryConfig};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "prism", version, about = "Multi-platform publishing sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (default: ~/.prism/settings.json or $PRISM_SETTINGS)
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Log level override, e.g. debug
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the event-stream server until ctrl-c
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Publish content and follow the session to its results
    Publish(PublishArgs),
}

#[derive(Args, Debug)]
struct PublishArgs {
    #[arg(long)]
    content: String,

    /// Platform id; repeat for several (linkedin, twitter, instagram)
    #[arg(long = "platform", required = true)]
    platforms: Vec<String>,

    /// Simulate locally
    #[arg(long, conflicts_with = "remote")]
    demo: bool,

    /// Stream from a running prism server
    #[arg(long)]
    remote: bool,

    /// lenient or strict
    #[arg(long)]
    policy: Option<CompletionPolicy>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => prism_settings::load_settings_from_path(path),
        None => prism_settings::load_settings(),
    }
    .context("failed to load settings")?;
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }

    let telemetry = init_telemetry(TelemetryConfig {
        log_level: parse_level(&settings.logging.level).unwrap_or(Level::INFO),
        json: settings.logging.json,
        ..TelemetryConfig::default()
    });

    match cli.command {
        Command::Serve { host, port } => serve(settings, host, port, telemetry.metrics()).await,
        Command::Publish(args) => publish(settings, args, telemetry.metrics()).await,
    }
}

async fn serve(
    mut settings: PrismSettings,
    host: Option<String>,
    port: Option<u16>,
    metrics: Option<Arc<MetricsRecorder>>,
) -> Result<()> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let config = ServerConfig::from(&settings.server);
    let mut engine = EngineConfig::from(&settings);
    engine.metrics = metrics;

    let handle = prism_server::start(config, engine, settings)
        .await
        .context("failed to start server")?;
    tracing::info!(addr = %handle.addr(), "Prism server ready");

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}

async fn publish(settings: PrismSettings, args: PublishArgs, metrics: Option<Arc<MetricsRecorder>>) -> Result<()> {
    let mut engine = EngineConfig::from(&settings);
    engine.metrics = metrics;
    if args.demo {
        engine.mode = DriverMode::LocalSimulation;
    } else if args.remote {
        engine.mode = DriverMode::RemoteChannel;
    }
    if let Some(policy) = args.policy {
        engine.policy = policy;
    }

    let session = engine.session(&args.content, &args.platforms)?;
    let _log = session.observers().log.subscribe(print_entry);

    let handle = match engine.mode {
        DriverMode::LocalSimulation => session.attach(engine.driver(), engine.attach.clone()),
        DriverMode::RemoteChannel => {
            let mut driver = RemoteChannelDriver::new(engine.remote.clone());
            let joined = driver.joined_signal();
            let handle = session.attach(Box::new(driver), engine.attach.clone());
            let wait = engine.remote.attempt_timeout * engine.remote.connect_attempts.max(1) + Duration::from_secs(1);
            match tokio::time::timeout(wait, joined).await {
                Ok(Ok(())) => {}
                _ => {
                    handle.abandon();
                    handle.finished().await;
                    bail!("could not join the event stream at {}", engine.remote.url);
                }
            }
            if let Err(e) = request_publication(&settings.remote.api_url, &handle, &args).await {
                handle.abandon();
                handle.finished().await;
                return Err(e);
            }
            handle
        }
    };

    let outcome = tokio::select! {
        r = handle.wait_resolved() => r,
        _ = tokio::signal::ctrl_c() => {
            handle.abandon();
            Err(SessionError::Abandoned)
        }
    };
    handle.finished().await;

    let results = outcome.context("session did not resolve")?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

/// Ask the server to start publishing under the session id we already joined.
async fn request_publication(api_url: &str, handle: &SessionHandle, args: &PublishArgs) -> Result<()> {
    let url = format!("{}/api/publish-content", api_url.trim_end_matches('/'));
    let resp = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({
            "content": args.content,
            "platforms": args.platforms,
            "session_id": handle.session_id().as_str(),
        }))
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?;

    let status = resp.status();
    if !status.is_success() {
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        let reason = body["error"].as_str().unwrap_or("unknown error");
        bail!("publish request rejected ({status}): {reason}");
    }
    tracing::info!(session_id = %handle.session_id(), "Publication requested");
    Ok(())
}

fn print_entry(entry: &ActionLogEntry) {
    let tag = match entry.kind {
        LogKind::Info => "info",
        LogKind::Action => "action",
        LogKind::Thinking => "thinking",
        LogKind::Success => "success",
        LogKind::Error => "error",
        LogKind::Step => "step",
    };
    println!("{} {:<8} {}", entry.timestamp, tag, entry.message);
}
