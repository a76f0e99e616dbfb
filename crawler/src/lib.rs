//! Concurrent site crawler: fetches every page reachable from a site root,
//! stores it and feeds it to the indexer.

pub mod crawl;
pub mod fetch;

pub use crawl::{http_error_body, CrawlError, Crawler, SiteOutcome, StopSignal, NO_PAGES_MESSAGE, STOP_MESSAGE};
pub use fetch::{FetchError, Fetched, Fetcher, HttpFetcher};
