//! Crashwave server binary.
//!
//! Wires the storage, ledger, hub, and round engine together and serves
//! the WebSocket + REST surface.

use clap::Parser;
use crashwave::api::handlers::AppState;
use crashwave::api::ApiServer;
use crashwave::{
    BroadcastHub, CrashwaveConfig, EngineMetrics, HistoryStore, LedgerGateway, RoundEngine,
    Storage,
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "crashwave")]
#[command(about = "Crashwave crash-game server", long_about = None)]
struct Args {
    /// Server host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Round history database directory
    #[arg(long, default_value = "./data/crashwave")]
    db_path: String,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long, default_value = "*")]
    cors_origins: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crashwave=info,tower_http=info".into()),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => CrashwaveConfig::from_toml_file(path)?,
        None => CrashwaveConfig::default(),
    };
    config.server.host = args.host;
    config.server.port = args.port;
    config.server.allowed_origins = args
        .cors_origins
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();
    config.validate()?;

    info!(db_path = %args.db_path, "opening round history database");
    let storage = Storage::open(&args.db_path)?;
    let history = Arc::new(HistoryStore::new(storage));
    let ledger = Arc::new(LedgerGateway::new(config.ledger.clone()));
    let hub = Arc::new(BroadcastHub::new());
    let metrics = Arc::new(EngineMetrics::new());

    let engine = RoundEngine::spawn(
        config.clone(),
        ledger.clone(),
        history.clone(),
        hub.clone(),
        metrics.clone(),
    );

    let server = ApiServer::new(AppState {
        config,
        engine,
        ledger,
        history,
        hub,
        metrics,
    });
    server.run().await
}
