use anyhow::Result;
use clap::Parser;
use crawler::HttpFetcher;
use search_core::config::AppConfig;
use search_core::persist::SledStore;
use search_core::Storage;
use server::{build_app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Site list and crawler/search settings (TOML)
    #[arg(long, default_value = "./config.toml")]
    config: String,
    /// Store directory
    #[arg(long, default_value = "./data")]
    db: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = AppConfig::load_from_file(&args.config)?;

    let sled = Arc::new(SledStore::open(&args.db)?);
    let store: Arc<dyn Storage> = sled.clone();
    let state = AppState::new(store, HttpFetcher::new(&config.crawler)?, &config);
    let crawler = state.crawler.clone();
    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, sites = config.sites.len(), "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if crawler.is_running() {
        crawler.stop()?;
    }
    sled.flush()?;
    tracing::info!("server stopped");
    Ok(())
}
