use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type SiteId = u64;
pub type PageId = u64;
pub type LemmaId = u64;
pub type PostingId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Indexing,
    Indexed,
    Failed,
}

impl SiteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SiteStatus::Indexing => "INDEXING",
            SiteStatus::Indexed => "INDEXED",
            SiteStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    /// Root URL, always ending with '/'.
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    pub status_time: OffsetDateTime,
    pub last_error: Option<String>,
}

impl Site {
    /// Set a status and refresh `status_time`.
    pub fn mark(&mut self, status: SiteStatus, error: Option<String>) {
        self.status = status;
        self.last_error = error;
        self.status_time = OffsetDateTime::now_utc();
    }

    /// Absolute URL of a site-relative path.
    pub fn uri(&self, path: &str) -> String {
        format!("{}{}", self.url, path.strip_prefix('/').unwrap_or(path))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    /// Site-relative path, always starting with '/'.
    pub path: String,
    pub code: u16,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lemma {
    pub id: LemmaId,
    pub site_id: SiteId,
    pub text: String,
    /// Number of pages of the site found to contain this lemma.
    pub frequency: u32,
}

/// One posting of the inverted index: how often a lemma occurs on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: PostingId,
    pub page_id: PageId,
    pub lemma_id: LemmaId,
    pub rank: f32,
}
