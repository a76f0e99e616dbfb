use crate::error::StoreError;
use crate::store::Storage;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total: TotalStatistics,
    pub detailed: Vec<SiteStatistics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalStatistics {
    pub sites: usize,
    pub pages: u64,
    pub lemmas: u64,
    pub indexing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatistics {
    pub url: String,
    pub name: String,
    pub status: String,
    /// Unix seconds.
    pub status_time: i64,
    pub error: String,
    pub pages: u64,
    pub lemmas: u64,
}

/// Read-only rollup of stored sites, pages and lemmas.
pub fn statistics(store: &dyn Storage, indexing: bool) -> Result<Statistics, StoreError> {
    let mut detailed = Vec::new();
    for site in store.sites()? {
        detailed.push(SiteStatistics {
            pages: store.count_pages(site.id)?,
            lemmas: store.count_lemmas(site.id)?,
            status: site.status.as_str().to_string(),
            status_time: site.status_time.unix_timestamp(),
            error: site.last_error.unwrap_or_default(),
            url: site.url,
            name: site.name,
        });
    }
    let total = TotalStatistics {
        sites: detailed.len(),
        pages: detailed.iter().map(|s| s.pages).sum(),
        lemmas: detailed.iter().map(|s| s.lemmas).sum(),
        indexing,
    };
    Ok(Statistics { total, detailed })
}
