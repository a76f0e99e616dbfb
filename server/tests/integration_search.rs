use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use crawler::{FetchError, Fetched, Fetcher};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use search_core::config::AppConfig;
use search_core::persist::SledStore;
use search_core::{MemoryStore, Storage};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tower::ServiceExt;
use url::Url;

#[derive(Clone, Default)]
struct FakeWeb(Arc<Mutex<HashMap<String, String>>>);

impl FakeWeb {
    fn page(self, url: &str, html: &str) -> Self {
        self.0.lock().insert(url.to_string(), html.to_string());
        self
    }
}

impl Fetcher for FakeWeb {
    async fn fetch(&self, url: &Url) -> Result<Fetched, FetchError> {
        let body = self.0.lock().get(url.as_str()).cloned();
        match body {
            Some(body) => Ok(Fetched { url: url.clone(), status: 200, body }),
            None => Err(FetchError::Status { code: 404 }),
        }
    }
}

const CONFIG: &str = r#"
[[sites]]
url = "https://a.test"
name = "A"

[crawler]
politeness_min_ms = 0
politeness_max_ms = 0
"#;

fn web() -> FakeWeb {
    FakeWeb::default()
        .page("https://a.test/", r#"<title>Home</title><a href="/news">news</a> welcome"#)
        .page("https://a.test/news", "<title>News</title><p>The quick brown fox jumps</p>")
}

fn state(store: Arc<dyn Storage>) -> server::AppState<FakeWeb> {
    let config = AppConfig::from_toml(CONFIG).unwrap();
    server::AppState::new(store, web(), &config)
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn index_page(url: &str) -> Request<Body> {
    let form = format!("url={}", url.replace(':', "%3A").replace('/', "%2F"));
    Request::post("/api/indexPage")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap()
}

#[tokio::test]
async fn indexed_page_is_searchable() {
    let app = server::build_app(state(Arc::new(MemoryStore::new())));

    let (status, json) = call(&app, index_page("https://a.test/news")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], true);

    let (status, json) = call(&app, get("/api/search?query=fox")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], true);
    assert_eq!(json["count"], 1);
    let hit = &json["data"][0];
    assert_eq!(hit["uri"], "https://a.test/news");
    assert_eq!(hit["title"], "News");
    assert_eq!(hit["relevance"], 1.0);
    assert!(hit["snippet"].as_str().unwrap().contains("<b>fox</b>"));

    let (_, json) = call(&app, get("/api/search?query=fox&site=https://a.test/&offset=1&limit=5")).await;
    assert_eq!(json["count"], 1);
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn bad_requests_report_errors() {
    let app = server::build_app(state(Arc::new(MemoryStore::new())));

    let (status, json) = call(&app, get("/api/search")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
    assert_eq!(json["error"], "empty search query");

    let (status, json) = call(&app, get("/api/search?query=fox&site=https://b.test/")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);

    let (status, json) = call(&app, index_page("https://b.test/page")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("outside the configured sites"));

    let (status, json) = call(&app, index_page("https://a.test/missing")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "HTTP Error: 404");

    let (status, json) = call(&app, get("/api/stopIndexing")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
}

#[tokio::test(start_paused = true)]
async fn full_indexing_cycle() {
    let state = state(Arc::new(MemoryStore::new()));
    let crawler = state.crawler.clone();
    let app = server::build_app(state);

    let (status, json) = call(&app, get("/api/startIndexing")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], true);
    let (status, _) = call(&app, get("/api/startIndexing")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    while crawler.is_running() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let (status, json) = call(&app, get("/api/statistics")).await;
    assert_eq!(status, StatusCode::OK);
    let stats = &json["statistics"];
    assert_eq!(stats["total"]["sites"], 1);
    assert_eq!(stats["total"]["pages"], 2);
    assert_eq!(stats["total"]["indexing"], false);
    assert_eq!(stats["detailed"][0]["status"], "INDEXED");
    assert_eq!(stats["detailed"][0]["url"], "https://a.test/");
    assert_eq!(stats["detailed"][0]["error"], "");
    assert!(stats["detailed"][0]["statusTime"].as_i64().unwrap() > 0);

    let (_, json) = call(&app, get("/api/search?query=welcome")).await;
    assert_eq!(json["data"][0]["uri"], "https://a.test/");
}

#[tokio::test]
async fn statistics_over_a_persistent_store() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let app = server::build_app(state(store.clone()));

    let (status, _) = call(&app, index_page("https://a.test/news")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = call(&app, get("/api/statistics")).await;
    assert_eq!(json["statistics"]["total"]["pages"], 1);
    assert!(json["statistics"]["total"]["lemmas"].as_u64().unwrap() >= 4);
    assert_eq!(store.sites().unwrap().len(), 1);
}
