// HSA Ledger - Web Server
// REST API + snapshot stream for the receipt ledger front end

use anyhow::{Context, Result};
use clap::Parser;
use hsa_ledger::{
    api::{build_router, AppState},
    AppConfig, ExpenseStore, GeminiAnalyzer, StaticTokenVerifier,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hsa-server", about = "HSA receipt ledger API server")]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "HSA_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides bind_addr from the config
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hsa_ledger=info,hsa_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let store = ExpenseStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    info!("✓ Database opened: {:?}", config.database_path);

    let analyzer = GeminiAnalyzer::new(config.analyzer.clone())?;
    let verifier = StaticTokenVerifier::new(&config.tokens);
    if verifier.is_empty() {
        warn!("No API tokens configured; every authenticated request will be rejected");
    } else {
        info!("✓ {} API token(s) loaded", verifier.len());
    }

    let state = AppState::new(store, Arc::new(analyzer), Arc::new(verifier));
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("🚀 Server running on http://{}", config.bind_addr);
    info!("   API: http://{}/api/expenses", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
