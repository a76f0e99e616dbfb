use crate::search::CandidatePolicy;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub sites: Vec<SiteEntry>,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// A configured site: the roots that may be crawled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiteEntry {
    pub url: String,
    pub name: String,
}

impl SiteEntry {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self { url: url.into(), name: name.into() }
    }

    /// Root URL with a trailing slash.
    pub fn root(&self) -> String {
        normalize_root(&self.url)
    }
}

pub fn normalize_root(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub user_agent: String,
    pub referrer: String,
    pub timeout_secs: u64,
    pub politeness_min_ms: u64,
    pub politeness_max_ms: u64,
    /// Parallel fetches per site.
    pub concurrency: usize,
    /// Claim each path before fetching so a crawl fetches it at most once.
    pub claim_paths: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: "HeliontSearchBot".to_string(),
            referrer: "http://www.google.com".to_string(),
            timeout_secs: 10,
            politeness_min_ms: 500,
            politeness_max_ms: 5000,
            concurrency: 8,
            claim_paths: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub candidates: CandidatePolicy,
    pub default_limit: usize,
    pub snippet_len: usize,
    pub title_len: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { candidates: CandidatePolicy::Intersection, default_limit: 20, snippet_len: 200, title_len: 50 }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for site in &self.sites {
            let url = Url::parse(&site.url).with_context(|| format!("site url {}", site.url))?;
            if !url.scheme().starts_with("http") {
                bail!("site url {} is not http(s)", site.url);
            }
        }
        if self.crawler.politeness_min_ms > self.crawler.politeness_max_ms {
            bail!("politeness_min_ms must not exceed politeness_max_ms");
        }
        if self.crawler.concurrency == 0 {
            bail!("crawler concurrency must be positive");
        }
        Ok(())
    }

    /// The configured site owning `url`: the longest root that prefixes it.
    /// A URL on a configured host but outside every root belongs to no site.
    pub fn site_for_url(&self, url: &str) -> Option<&SiteEntry> {
        site_for_url(&self.sites, url)
    }
}

pub fn site_for_url<'a>(sites: &'a [SiteEntry], url: &str) -> Option<&'a SiteEntry> {
    let as_root = normalize_root(url);
    sites
        .iter()
        .filter(|s| {
            let root = s.root();
            url.starts_with(&root) || as_root == root
        })
        .max_by_key(|s| s.root().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[sites]]
url = "https://example.com"
name = "Example"

[[sites]]
url = "https://docs.example.com/guide/"
name = "Guide"

[crawler]
politeness_min_ms = 0
politeness_max_ms = 10

[search]
candidates = "union"
"#;

    #[test]
    fn parses_sites_and_defaults() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[0].root(), "https://example.com/");
        assert_eq!(config.crawler.user_agent, "HeliontSearchBot");
        assert_eq!(config.crawler.politeness_max_ms, 10);
        assert_eq!(config.search.candidates, CandidatePolicy::Union);
        assert_eq!(config.search.default_limit, 20);
    }

    #[test]
    fn rejects_inverted_politeness_range() {
        let raw = "sites = []\n[crawler]\npoliteness_min_ms = 10\npoliteness_max_ms = 1\n";
        assert!(AppConfig::from_toml(raw).is_err());
    }

    #[test]
    fn resolves_owning_site() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.site_for_url("https://example.com/a/b").unwrap().name, "Example");
        assert_eq!(config.site_for_url("https://docs.example.com/guide/x").unwrap().name, "Guide");
        assert_eq!(config.site_for_url("https://docs.example.com/guide").unwrap().name, "Guide");
        assert!(config.site_for_url("https://docs.example.com/other").is_none());
        assert!(config.site_for_url("https://elsewhere.org/").is_none());
        assert!(config.site_for_url("http://example.com/").is_none());
    }
}
