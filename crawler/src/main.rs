use anyhow::Result;
use clap::Parser;
use crawler::{Crawler, HttpFetcher};
use indexer::Indexer;
use search_core::config::AppConfig;
use search_core::persist::SledStore;
use search_core::{Lemmatizer, Storage};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl the configured sites into the search index")]
struct Cli {
    /// Site list and crawler settings (TOML)
    #[arg(long, default_value = "./config.toml")]
    config: String,
    /// Store directory
    #[arg(long, default_value = "./data")]
    db: String,
    /// Index only this page instead of crawling every site
    #[arg(long)]
    page: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    let config = AppConfig::load_from_file(&args.config)?;

    let sled = Arc::new(SledStore::open(&args.db)?);
    let store: Arc<dyn Storage> = sled.clone();
    let indexer = Arc::new(Indexer::new(store.clone(), Arc::new(Lemmatizer::new())));
    let fetcher = HttpFetcher::new(&config.crawler)?;
    let crawler = Crawler::new(store, indexer, fetcher, config.crawler.clone(), config.sites.clone());

    if let Some(url) = args.page {
        let page = crawler.index_single_page(&url).await?;
        eprintln!("crawler: indexed {url} as page {} (code {})", page.id, page.code);
        sled.flush()?;
        return Ok(());
    }

    let mut handle = crawler.start(config.sites.clone())?;
    let outcomes = tokio::select! {
        joined = &mut handle => joined?,
        _ = tokio::signal::ctrl_c() => {
            crawler.stop()?;
            handle.await?
        }
    };
    sled.flush()?;

    for outcome in &outcomes {
        eprintln!(
            "crawler: site={} status={} pages={} at={} error={}",
            outcome.site.url,
            outcome.site.status.as_str(),
            outcome.pages,
            outcome.site.status_time.format(&Rfc3339)?,
            outcome.site.last_error.as_deref().unwrap_or("-"),
        );
    }
    println!("{}", serde_json::to_string_pretty(&outcomes)?);
    Ok(())
}
