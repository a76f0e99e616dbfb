use lazy_static::lazy_static;
use reqwest::{header, Client};
use scraper::{Html, Selector};
use search_core::config::CrawlerConfig;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Bodies above this size are refused.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

lazy_static! {
    static ref LINKS: Selector = Selector::parse("a[href]").expect("valid selector");
}

/// A successfully fetched HTML document.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub body: String,
}

impl Fetched {
    /// Absolute targets of every `<a href>`, without fragments, in document order.
    pub fn links(&self) -> Vec<Url> {
        let doc = Html::parse_document(&self.body);
        let mut links = Vec::new();
        for a in doc.select(&LINKS) {
            let Some(href) = a.value().attr("href") else { continue };
            if let Ok(mut link) = self.url.join(href) {
                if link.scheme().starts_with("http") {
                    link.set_fragment(None);
                    links.push(link);
                }
            }
        }
        links
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP Error: {code}")]
    Status { code: u16 },
    #[error("unsupported content type {0}")]
    UnsupportedContent(String),
    #[error("body of {0} bytes exceeds the limit")]
    TooLarge(usize),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Retrieves one URL. Implemented over HTTP by [`HttpFetcher`].
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<Fetched, FetchError>> + Send;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self, FetchError> {
        let mut headers = header::HeaderMap::new();
        if let Ok(referrer) = header::HeaderValue::from_str(&config.referrer) {
            headers.insert(header::REFERER, referrer);
        }
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Fetched, FetchError> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { code: status.as_u16() });
        }
        if let Some(ct) = resp.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            if !(ct.starts_with("text/html") || ct.starts_with("application/xhtml+xml")) {
                return Err(FetchError::UnsupportedContent(ct.to_string()));
            }
        }
        let final_url = resp.url().clone();
        let bytes = resp.bytes().await?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(FetchError::TooLarge(bytes.len()));
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Fetched { url: final_url, status: status.as_u16(), body })
    }
}
