use crate::fetch::{FetchError, Fetched, Fetcher};
use indexer::Indexer;
use parking_lot::Mutex;
use rand::Rng;
use search_core::config::{site_for_url, CrawlerConfig, SiteEntry};
use search_core::{Page, Site, SiteId, SiteStatus, Storage, StoreError};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use url::Url;

pub const STOP_MESSAGE: &str = "Indexing stopped by user";
pub const NO_PAGES_MESSAGE: &str = "No pages indexed due to errors";

/// Placeholder body stored for a page that answered with an error status.
pub fn http_error_body(code: u16) -> String {
    format!("HTTP Error: {code}")
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("indexing is already running")]
    AlreadyRunning,
    #[error("indexing is not running")]
    NotRunning,
    #[error("{0} is outside the configured sites")]
    SiteNotConfigured(String),
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("crawl task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Cooperative stop flag shared by every crawl task.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final state of one site after a crawl.
#[derive(Debug, Clone, Serialize)]
pub struct SiteOutcome {
    pub site: Site,
    pub pages: u64,
}

/// Per-site state shared by the tasks of one crawl.
struct SiteCrawl {
    site_id: SiteId,
    /// Normalized root URL, ending with '/'.
    root: String,
    permits: Semaphore,
    claims: Mutex<HashSet<String>>,
}

struct Inner<F> {
    store: Arc<dyn Storage>,
    indexer: Arc<Indexer>,
    fetcher: F,
    config: CrawlerConfig,
    sites: Vec<SiteEntry>,
    stop: StopSignal,
    running: AtomicBool,
}

/// Fetches pages of the configured sites, stores them and hands them to the indexer.
pub struct Crawler<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for Crawler<F> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<F: Fetcher> Crawler<F> {
    /// `sites` is the configured site list, used to resolve single pages.
    pub fn new(
        store: Arc<dyn Storage>,
        indexer: Arc<Indexer>,
        fetcher: F,
        config: CrawlerConfig,
        sites: Vec<SiteEntry>,
    ) -> Self {
        let inner = Inner {
            store,
            indexer,
            fetcher,
            config,
            sites,
            stop: StopSignal::default(),
            running: AtomicBool::new(false),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.inner.stop.clone()
    }

    pub fn sites(&self) -> &[SiteEntry] {
        &self.inner.sites
    }

    /// Launch one crawl per site, all running concurrently. The handle resolves
    /// once every site has its final status.
    pub fn start(&self, sites: Vec<SiteEntry>) -> Result<JoinHandle<Vec<SiteOutcome>>, CrawlError> {
        if self.inner.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(CrawlError::AlreadyRunning);
        }
        self.inner.stop.reset();
        tracing::info!(sites = sites.len(), "indexing started");

        let crawler = self.clone();
        Ok(tokio::spawn(async move {
            let mut tasks = JoinSet::new();
            for entry in sites {
                let c = crawler.clone();
                tasks.spawn(async move {
                    let result = c.crawl_site(&entry).await;
                    (entry, result)
                });
            }
            let mut outcomes = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(outcome))) => outcomes.push(outcome),
                    Ok((entry, Err(e))) => tracing::error!(site = %entry.url, error = %e, "site crawl aborted"),
                    Err(e) => tracing::error!(error = %e, "site crawl panicked"),
                }
            }
            outcomes.sort_by_key(|o| o.site.id);
            crawler.inner.running.store(false, Ordering::SeqCst);
            tracing::info!(sites = outcomes.len(), "indexing finished");
            outcomes
        }))
    }

    /// Raise the stop signal. Fetches already in flight still complete and persist.
    pub fn stop(&self) -> Result<(), CrawlError> {
        if !self.is_running() {
            return Err(CrawlError::NotRunning);
        }
        self.inner.stop.raise();
        tracing::info!("stop requested");
        Ok(())
    }

    /// Crawl every page reachable from the site's root and record the final status.
    ///
    /// A storage failure while opening or closing the crawl still leaves the
    /// site FAILED with the error when its row exists.
    pub async fn crawl_site(&self, entry: &SiteEntry) -> Result<SiteOutcome, CrawlError> {
        let root = normalized_root(entry)?;
        let result = self.crawl_root(&root, &entry.name).await;
        if let Err(e) = &result {
            self.record_failure(&root, e);
        }
        result
    }

    async fn crawl_root(&self, root: &Url, name: &str) -> Result<SiteOutcome, CrawlError> {
        let site = self.open_site(root, name)?;
        tracing::info!(site = %root, id = site.id, "crawling site");

        let ctx = Arc::new(SiteCrawl {
            site_id: site.id,
            root: root.to_string(),
            permits: Semaphore::new(self.inner.config.concurrency.max(1)),
            claims: Mutex::new(HashSet::new()),
        });
        let walked = self.walk(&ctx, root.clone()).await;

        let mut site = self.inner.store.site(site.id)?.unwrap_or(site);
        match walked {
            Ok(()) if !self.inner.stop.is_raised() => site.mark(SiteStatus::Indexed, None),
            Ok(()) => site.mark(SiteStatus::Failed, Some(STOP_MESSAGE.to_string())),
            Err(e) => site.mark(SiteStatus::Failed, Some(e.to_string())),
        }
        let pages = self.inner.store.count_pages(site.id)?;
        if pages == 0 {
            site.mark(SiteStatus::Failed, Some(NO_PAGES_MESSAGE.to_string()));
        }
        self.inner.store.update_site(&site)?;
        tracing::info!(site = %site.url, status = site.status.as_str(), pages, "site finished");
        Ok(SiteOutcome { site, pages })
    }

    /// Fetch exactly one URL under a configured site root, store it and index it.
    pub async fn index_single_page(&self, url: &str) -> Result<Page, CrawlError> {
        let target = Url::parse(url).map_err(|_| CrawlError::InvalidUrl(url.to_string()))?;
        let entry = site_for_url(&self.inner.sites, target.as_str())
            .ok_or_else(|| CrawlError::SiteNotConfigured(url.to_string()))?
            .clone();
        let root = normalized_root(&entry)?;
        let path = site_path(root.as_str(), &target).unwrap_or_else(|| "/".to_string());
        let mut site = match self.open_site(&root, &entry.name) {
            Ok(site) => site,
            Err(e) => {
                let e = CrawlError::from(e);
                self.record_failure(&root, &e);
                return Err(e);
            }
        };
        tracing::info!(site = %site.url, %path, "indexing single page");

        let result = self.fetch_single(site.id, &path, &target).await;
        match &result {
            Ok(_) => site.mark(SiteStatus::Indexed, None),
            Err(e) => site.mark(SiteStatus::Failed, Some(e.to_string())),
        }
        self.inner.store.update_site(&site)?;
        result
    }

    async fn fetch_single(&self, site: SiteId, path: &str, target: &Url) -> Result<Page, CrawlError> {
        match self.inner.fetcher.fetch(target).await {
            Ok(fetched) => Ok(self.store_and_index(site, path, &fetched)?),
            Err(e) => {
                if let FetchError::Status { code } = &e {
                    self.inner.store.upsert_page(site, path, *code, &http_error_body(*code))?;
                }
                Err(e.into())
            }
        }
    }

    /// Best effort: flag the stored site for `root` as FAILED with `error`.
    fn record_failure(&self, root: &Url, error: &CrawlError) {
        let marked = self.inner.store.find_site_by_url(root.as_str()).and_then(|site| match site {
            Some(mut site) => {
                site.mark(SiteStatus::Failed, Some(error.to_string()));
                self.inner.store.update_site(&site)
            }
            None => Ok(()),
        });
        if let Err(e) = marked {
            tracing::error!(site = %root, error = %e, "could not record site failure");
        }
    }

    /// Find the stored site for `root` and flag it as indexing, or create it.
    fn open_site(&self, root: &Url, name: &str) -> Result<Site, StoreError> {
        match self.inner.store.find_site_by_url(root.as_str())? {
            Some(mut site) => {
                site.name = name.to_string();
                site.mark(SiteStatus::Indexing, None);
                self.inner.store.update_site(&site)?;
                Ok(site)
            }
            None => self.inner.store.insert_site(root.as_str(), name, SiteStatus::Indexing),
        }
    }

    /// Run the task tree of one site until every task, and every task it
    /// admitted, has finished.
    async fn walk(&self, ctx: &Arc<SiteCrawl>, root: Url) -> Result<(), CrawlError> {
        if self.inner.config.claim_paths {
            ctx.claims.lock().insert("/".to_string());
        }
        let mut tasks = JoinSet::new();
        self.fork(&mut tasks, ctx, root);
        while let Some(joined) = tasks.join_next().await {
            for link in joined? {
                if self.inner.stop.is_raised() {
                    break;
                }
                self.fork(&mut tasks, ctx, link);
            }
        }
        Ok(())
    }

    fn fork(&self, tasks: &mut JoinSet<Vec<Url>>, ctx: &Arc<SiteCrawl>, url: Url) {
        let crawler = self.clone();
        let ctx = ctx.clone();
        tasks.spawn(async move { crawler.visit(&ctx, url).await });
    }

    /// One URL: fetch, persist, index, and return the links to follow.
    async fn visit(&self, ctx: &SiteCrawl, url: Url) -> Vec<Url> {
        if self.inner.stop.is_raised() {
            return Vec::new();
        }
        let fetched = {
            let Ok(_permit) = ctx.permits.acquire().await else {
                return Vec::new();
            };
            // Waiting for a permit is not in flight yet.
            if self.inner.stop.is_raised() {
                return Vec::new();
            }
            self.inner.fetcher.fetch(&url).await
        };

        let links = match fetched {
            Ok(page) => self.accept(ctx, &url, &page).unwrap_or_else(|e| {
                tracing::warn!(%url, error = %e, "failed to store page");
                Vec::new()
            }),
            Err(FetchError::Status { code }) => {
                tracing::warn!(%url, code, "error status");
                if let Some(path) = site_path(&ctx.root, &url) {
                    if let Err(e) = self.inner.store.upsert_page(ctx.site_id, &path, code, &http_error_body(code)) {
                        tracing::warn!(%url, error = %e, "failed to store error page");
                    }
                }
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "fetch failed");
                Vec::new()
            }
        };

        tokio::time::sleep(self.politeness()).await;
        links
    }

    /// Store and index a fetched page, then pick the links worth following.
    fn accept(&self, ctx: &SiteCrawl, url: &Url, fetched: &Fetched) -> Result<Vec<Url>, CrawlError> {
        let Some(path) = site_path(&ctx.root, url) else {
            return Ok(Vec::new());
        };
        self.store_and_index(ctx.site_id, &path, fetched)?;
        self.touch_site(ctx.site_id)?;
        Ok(self.admit(ctx, fetched.links())?)
    }

    fn store_and_index(&self, site: SiteId, path: &str, fetched: &Fetched) -> Result<Page, StoreError> {
        let write = self.inner.store.upsert_page(site, path, fetched.status, &fetched.body)?;
        if write.created {
            self.inner.indexer.index_page(&write.page)?;
        } else {
            self.inner.indexer.reindex_page(&write.page)?;
        }
        Ok(write.page)
    }

    fn touch_site(&self, id: SiteId) -> Result<(), StoreError> {
        if let Some(mut site) = self.inner.store.site(id)? {
            site.status_time = OffsetDateTime::now_utc();
            self.inner.store.update_site(&site)?;
        }
        Ok(())
    }

    /// Links under the site root whose path has no stored page and, when
    /// claiming is on, was not claimed by another task of this crawl.
    fn admit(&self, ctx: &SiteCrawl, links: Vec<Url>) -> Result<Vec<Url>, StoreError> {
        let mut seen = HashSet::new();
        let mut admitted = Vec::new();
        for link in links {
            let Some(path) = site_path(&ctx.root, &link) else { continue };
            if !seen.insert(path.clone()) || self.inner.store.page_exists(ctx.site_id, &path)? {
                continue;
            }
            if self.inner.config.claim_paths && !ctx.claims.lock().insert(path) {
                continue;
            }
            admitted.push(link);
        }
        Ok(admitted)
    }

    fn politeness(&self) -> Duration {
        let (min, max) = (self.inner.config.politeness_min_ms, self.inner.config.politeness_max_ms);
        Duration::from_millis(rand::rng().random_range(min..=max.max(min)))
    }
}

fn normalized_root(entry: &SiteEntry) -> Result<Url, CrawlError> {
    let root = entry.root();
    Url::parse(&root).map_err(|_| CrawlError::InvalidUrl(root))
}

/// Site-relative path of `url`: the part after `root`, prefixed with '/'.
fn site_path(root: &str, url: &Url) -> Option<String> {
    url.as_str().strip_prefix(root).map(|rest| format!("/{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_relative_to_root() {
        let root = "https://a.test/docs/";
        let url = |s: &str| Url::parse(s).unwrap();
        assert_eq!(site_path(root, &url("https://a.test/docs/")).as_deref(), Some("/"));
        assert_eq!(site_path(root, &url("https://a.test/docs/x/y?p=1")).as_deref(), Some("/x/y?p=1"));
        assert_eq!(site_path(root, &url("https://a.test/blog/")), None);
    }

    #[test]
    fn stop_signal_is_shared() {
        let signal = StopSignal::default();
        let other = signal.clone();
        other.raise();
        assert!(signal.is_raised());
        signal.reset();
        assert!(!other.is_raised());
    }
}
