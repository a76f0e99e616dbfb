pub mod errors;

use axum::{extract::{Query, State}, routing::{get, post}, Form, Json, Router};
use crawler::{Crawler, Fetcher};
use errors::ApiError;
use indexer::Indexer;
use search_core::config::AppConfig;
use search_core::search::{Retriever, SearchHit};
use search_core::stats::{statistics, Statistics};
use search_core::{Lemmatizer, Storage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub site: Option<String>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub result: bool,
    /// Matching pages before pagination.
    pub count: usize,
    pub data: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct StatisticsResponse {
    pub result: bool,
    pub statistics: Statistics,
}

#[derive(Deserialize)]
pub struct IndexPageParams {
    pub url: String,
}

pub struct AppState<F> {
    pub crawler: Crawler<F>,
    pub retriever: Arc<Retriever>,
    pub store: Arc<dyn Storage>,
}

impl<F> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self { crawler: self.crawler.clone(), retriever: self.retriever.clone(), store: self.store.clone() }
    }
}

impl<F: Fetcher> AppState<F> {
    /// Wire the indexer, crawler and retriever over one store and lemmatizer.
    pub fn new(store: Arc<dyn Storage>, fetcher: F, config: &AppConfig) -> Self {
        let lemmatizer = Arc::new(Lemmatizer::new());
        let indexer = Arc::new(Indexer::new(store.clone(), lemmatizer.clone()));
        let crawler = Crawler::new(store.clone(), indexer, fetcher, config.crawler.clone(), config.sites.clone());
        let retriever = Arc::new(Retriever::new(store.clone(), lemmatizer, config.search.clone()));
        Self { crawler, retriever, store }
    }
}

pub fn build_app<F: Fetcher>(state: AppState<F>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let api = Router::new()
        .route("/startIndexing", get(start_indexing::<F>))
        .route("/stopIndexing", get(stop_indexing::<F>))
        .route("/indexPage", post(index_page::<F>))
        .route("/search", get(search_handler::<F>))
        .route("/statistics", get(statistics_handler::<F>));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn ok() -> Json<Value> {
    Json(json!({ "result": true }))
}

pub async fn start_indexing<F: Fetcher>(State(state): State<AppState<F>>) -> Result<Json<Value>, ApiError> {
    // The crawl runs detached; progress is visible through site statuses.
    let _crawl = state.crawler.start(state.crawler.sites().to_vec())?;
    Ok(ok())
}

pub async fn stop_indexing<F: Fetcher>(State(state): State<AppState<F>>) -> Result<Json<Value>, ApiError> {
    state.crawler.stop()?;
    Ok(ok())
}

pub async fn index_page<F: Fetcher>(
    State(state): State<AppState<F>>,
    Form(params): Form<IndexPageParams>,
) -> Result<Json<Value>, ApiError> {
    state.crawler.index_single_page(params.url.trim()).await?;
    Ok(ok())
}

pub async fn search_handler<F: Fetcher>(
    State(state): State<AppState<F>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let site = params.site.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let limit = params.limit.unwrap_or(state.retriever.config().default_limit);
    let page = state.retriever.search(&params.query, site, params.offset, limit)?;
    tracing::debug!(query = %params.query, count = page.total, returned = page.hits.len(), "search");
    Ok(Json(SearchResponse { result: true, count: page.total, data: page.hits }))
}

pub async fn statistics_handler<F: Fetcher>(
    State(state): State<AppState<F>>,
) -> Result<Json<StatisticsResponse>, ApiError> {
    let statistics = statistics(state.store.as_ref(), state.crawler.is_running())?;
    Ok(Json(StatisticsResponse { result: true, statistics }))
}
