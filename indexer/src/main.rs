use anyhow::Result;
use clap::{Parser, Subcommand};
use search_core::config::SearchConfig;
use search_core::persist::SledStore;
use search_core::search::{CandidatePolicy, Retriever};
use search_core::stats::statistics;
use search_core::Lemmatizer;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Inspect lemmas and query a crawled index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the lemma counts of HTML/text files
    Lemmas {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
    },
    /// Print site, page and lemma counts of a store
    Stats {
        /// Store directory
        #[arg(long, default_value = "./data")]
        db: String,
    },
    /// Run a query against a store
    Search {
        #[arg(long, default_value = "./data")]
        db: String,
        #[arg(long)]
        query: String,
        /// Restrict to one site root URL
        #[arg(long)]
        site: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Accept pages containing any query lemma instead of all of them
        #[arg(long, default_value_t = false)]
        union: bool,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Lemmas { input } => print_lemmas(Path::new(&input)),
        Commands::Stats { db } => {
            let store = SledStore::open(&db)?;
            println!("{}", serde_json::to_string_pretty(&statistics(&store, false)?)?);
            Ok(())
        }
        Commands::Search { db, query, site, offset, limit, union } => {
            let store = Arc::new(SledStore::open(&db)?);
            let candidates = if union { CandidatePolicy::Union } else { CandidatePolicy::Intersection };
            let config = SearchConfig { candidates, ..SearchConfig::default() };
            let retriever = Retriever::new(store, Arc::new(Lemmatizer::new()), config);
            let page = retriever.search(&query, site.as_deref(), offset, limit)?;
            println!("{}", serde_json::to_string_pretty(&page)?);
            Ok(())
        }
    }
}

fn print_lemmas(input: &Path) -> Result<()> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("html" | "htm" | "txt")) {
                files.push(p.to_path_buf());
            }
        }
    } else {
        files.push(input.to_path_buf());
    }

    let lemmatizer = Lemmatizer::new();
    let mut out: BTreeMap<String, BTreeMap<String, u32>> = BTreeMap::new();
    for file in files {
        let text = fs::read_to_string(&file)?;
        let lemmas = lemmatizer.extract_lemmas(&text).into_iter().collect();
        out.insert(file.display().to_string(), lemmas);
    }
    tracing::info!(files = out.len(), "lemmatized input");
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
