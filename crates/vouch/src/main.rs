//! # Vouch kiosk host
//!
//! Runs the liveness engine behind a small local HTTP API the kiosk UI
//! talks to.
//!
//! ## Architecture
//! ```text
//! Kiosk UI → Vouch (HTTP) → SessionMachine → Evidence store
//!                                  ↓
//!                          Verification endpoint
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use vouch::config::{AppConfig, ConfigOverrides};
use vouch::evidence::open_store;
use vouch::routes;
use vouch::session::{Collaborators, SessionMachine, spawn_session_driver};
use vouch::state::AppState;
use vouch::submission::HttpSubmissionClient;
use vouch::trace::LandmarkTrace;

/// Vouch - liveness verification engine
#[derive(Parser, Debug)]
#[command(name = "vouch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/vouch.toml")]
    config: String,

    /// Listen address (overrides config)
    #[arg(short, long, env = "VOUCH_LISTEN_ADDR")]
    listen: Option<String>,

    /// Redis URL for the redis evidence backend (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Verification endpoint (overrides config)
    #[arg(long, env = "VOUCH_SUBMIT_URL")]
    submit_url: Option<String>,

    /// User the evidence is submitted for (overrides config)
    #[arg(long, env = "VOUCH_USER_ID")]
    user_id: Option<String>,

    /// Landmark trace to replay as camera and estimator (overrides config)
    #[arg(long)]
    trace: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen_addr: self.listen.clone(),
            redis_url: self.redis_url.clone(),
            submit_url: self.submit_url.clone(),
            user_id: self.user_id.clone(),
            trace_path: self.trace.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Vouch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args.overrides())?;
    info!("Configuration loaded from {}", args.config);

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let store = open_store(&config.store).await?;
    let submitter = Arc::new(
        HttpSubmissionClient::new(&config.submission).context("Failed to build submission client")?,
    );

    // Camera and estimator come from a recorded trace; live device
    // adapters plug in through the same traits
    let trace_path = config
        .trace_path
        .clone()
        .context("No capture source configured (set trace_path or pass --trace)")?;
    let trace = LandmarkTrace::load(&trace_path).await?;

    let machine = SessionMachine::new(
        &config,
        Collaborators {
            camera: Arc::new(trace.camera()),
            detector: Arc::new(trace.landmark_source()),
            store: store.clone(),
            submitter,
        },
    );
    let session = spawn_session_driver(machine, shutdown_tx.subscribe());

    // Build router
    let listen_addr = config.listen_addr.clone();
    let app = routes::create_router(AppState::new(config, session, store));

    // Start server
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("Vouch listening on {}", listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Vouch shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
