use crate::error::StoreError;
use crate::model::{IndexEntry, Lemma, LemmaId, Page, PageId, PostingId, Site, SiteId, SiteStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use time::OffsetDateTime;

/// Result of writing a page: the stored row and whether it was new.
#[derive(Debug, Clone)]
pub struct PageWrite {
    pub page: Page,
    pub created: bool,
}

/// Persistence contract of the search engine.
///
/// Every call is a single synchronous read or write; implementations must be
/// safe to share across threads but are not required to make several calls
/// atomic together. Compound keys are unique: a site url, a page (site, path),
/// a lemma (site, text) and a posting (page, lemma).
pub trait Storage: Send + Sync {
    fn insert_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site, StoreError>;
    fn update_site(&self, site: &Site) -> Result<(), StoreError>;
    fn site(&self, id: SiteId) -> Result<Option<Site>, StoreError>;
    fn find_site_by_url(&self, url: &str) -> Result<Option<Site>, StoreError>;
    fn sites(&self) -> Result<Vec<Site>, StoreError>;

    /// Create the page at (site, path) or overwrite the existing one in place.
    fn upsert_page(&self, site: SiteId, path: &str, code: u16, content: &str) -> Result<PageWrite, StoreError>;
    fn page(&self, id: PageId) -> Result<Option<Page>, StoreError>;
    fn find_page(&self, site: SiteId, path: &str) -> Result<Option<Page>, StoreError>;
    fn page_exists(&self, site: SiteId, path: &str) -> Result<bool, StoreError> {
        Ok(self.find_page(site, path)?.is_some())
    }
    fn count_pages(&self, site: SiteId) -> Result<u64, StoreError>;

    /// New lemma rows start with a frequency of zero.
    fn insert_lemma(&self, site: SiteId, text: &str) -> Result<Lemma, StoreError>;
    fn update_lemma(&self, lemma: &Lemma) -> Result<(), StoreError>;
    fn find_lemma(&self, site: SiteId, text: &str) -> Result<Option<Lemma>, StoreError>;
    /// Lemma rows with this text on every site.
    fn lemmas_by_text(&self, text: &str) -> Result<Vec<Lemma>, StoreError>;
    fn count_lemmas(&self, site: SiteId) -> Result<u64, StoreError>;

    fn insert_posting(&self, page: PageId, lemma: LemmaId, rank: f32) -> Result<IndexEntry, StoreError>;
    fn update_posting(&self, entry: &IndexEntry) -> Result<(), StoreError>;
    fn find_posting(&self, page: PageId, lemma: LemmaId) -> Result<Option<IndexEntry>, StoreError>;
    fn postings_for_lemma(&self, lemma: LemmaId) -> Result<Vec<IndexEntry>, StoreError>;
}

#[derive(Default)]
struct Tables {
    next_id: u64,
    sites: HashMap<SiteId, Site>,
    site_urls: HashMap<String, SiteId>,
    pages: HashMap<PageId, Page>,
    page_keys: HashMap<(SiteId, String), PageId>,
    lemmas: HashMap<LemmaId, Lemma>,
    lemma_keys: HashMap<(SiteId, String), LemmaId>,
    postings: HashMap<PostingId, IndexEntry>,
    posting_keys: HashMap<(PageId, LemmaId), PostingId>,
    lemma_postings: HashMap<LemmaId, Vec<PostingId>>,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Arena-style tables behind a single lock. Used by tests and short-lived runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStore {
    fn insert_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site, StoreError> {
        let mut t = self.tables.write();
        if t.site_urls.contains_key(url) {
            return Err(StoreError::Conflict { entity: "site", key: url.to_string() });
        }
        let id = t.next_id();
        let site = Site {
            id,
            url: url.to_string(),
            name: name.to_string(),
            status,
            status_time: OffsetDateTime::now_utc(),
            last_error: None,
        };
        t.site_urls.insert(site.url.clone(), id);
        t.sites.insert(id, site.clone());
        Ok(site)
    }

    fn update_site(&self, site: &Site) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        let slot = t.sites.get_mut(&site.id).ok_or(StoreError::Missing { entity: "site", id: site.id })?;
        *slot = site.clone();
        Ok(())
    }

    fn site(&self, id: SiteId) -> Result<Option<Site>, StoreError> {
        Ok(self.tables.read().sites.get(&id).cloned())
    }

    fn find_site_by_url(&self, url: &str) -> Result<Option<Site>, StoreError> {
        let t = self.tables.read();
        Ok(t.site_urls.get(url).and_then(|id| t.sites.get(id)).cloned())
    }

    fn sites(&self) -> Result<Vec<Site>, StoreError> {
        let mut sites: Vec<Site> = self.tables.read().sites.values().cloned().collect();
        sites.sort_by_key(|s| s.id);
        Ok(sites)
    }

    fn upsert_page(&self, site: SiteId, path: &str, code: u16, content: &str) -> Result<PageWrite, StoreError> {
        let mut t = self.tables.write();
        if let Some(&id) = t.page_keys.get(&(site, path.to_string())) {
            let page = t.pages.get_mut(&id).ok_or(StoreError::Missing { entity: "page", id })?;
            page.code = code;
            page.content = content.to_string();
            return Ok(PageWrite { page: page.clone(), created: false });
        }
        let id = t.next_id();
        let page = Page { id, site_id: site, path: path.to_string(), code, content: content.to_string() };
        t.page_keys.insert((site, page.path.clone()), id);
        t.pages.insert(id, page.clone());
        Ok(PageWrite { page, created: true })
    }

    fn page(&self, id: PageId) -> Result<Option<Page>, StoreError> {
        Ok(self.tables.read().pages.get(&id).cloned())
    }

    fn find_page(&self, site: SiteId, path: &str) -> Result<Option<Page>, StoreError> {
        let t = self.tables.read();
        Ok(t.page_keys.get(&(site, path.to_string())).and_then(|id| t.pages.get(id)).cloned())
    }

    fn count_pages(&self, site: SiteId) -> Result<u64, StoreError> {
        Ok(self.tables.read().pages.values().filter(|p| p.site_id == site).count() as u64)
    }

    fn insert_lemma(&self, site: SiteId, text: &str) -> Result<Lemma, StoreError> {
        let mut t = self.tables.write();
        let key = (site, text.to_string());
        if t.lemma_keys.contains_key(&key) {
            return Err(StoreError::Conflict { entity: "lemma", key: format!("{site}/{text}") });
        }
        let id = t.next_id();
        let lemma = Lemma { id, site_id: site, text: text.to_string(), frequency: 0 };
        t.lemma_keys.insert(key, id);
        t.lemmas.insert(id, lemma.clone());
        Ok(lemma)
    }

    fn update_lemma(&self, lemma: &Lemma) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        let slot = t.lemmas.get_mut(&lemma.id).ok_or(StoreError::Missing { entity: "lemma", id: lemma.id })?;
        *slot = lemma.clone();
        Ok(())
    }

    fn find_lemma(&self, site: SiteId, text: &str) -> Result<Option<Lemma>, StoreError> {
        let t = self.tables.read();
        Ok(t.lemma_keys.get(&(site, text.to_string())).and_then(|id| t.lemmas.get(id)).cloned())
    }

    fn lemmas_by_text(&self, text: &str) -> Result<Vec<Lemma>, StoreError> {
        let mut found: Vec<Lemma> = self.tables.read().lemmas.values().filter(|l| l.text == text).cloned().collect();
        found.sort_by_key(|l| l.id);
        Ok(found)
    }

    fn count_lemmas(&self, site: SiteId) -> Result<u64, StoreError> {
        Ok(self.tables.read().lemmas.values().filter(|l| l.site_id == site).count() as u64)
    }

    fn insert_posting(&self, page: PageId, lemma: LemmaId, rank: f32) -> Result<IndexEntry, StoreError> {
        let mut t = self.tables.write();
        if t.posting_keys.contains_key(&(page, lemma)) {
            return Err(StoreError::Conflict { entity: "posting", key: format!("{page}/{lemma}") });
        }
        let id = t.next_id();
        let entry = IndexEntry { id, page_id: page, lemma_id: lemma, rank };
        t.posting_keys.insert((page, lemma), id);
        t.lemma_postings.entry(lemma).or_default().push(id);
        t.postings.insert(id, entry.clone());
        Ok(entry)
    }

    fn update_posting(&self, entry: &IndexEntry) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        let slot = t.postings.get_mut(&entry.id).ok_or(StoreError::Missing { entity: "posting", id: entry.id })?;
        slot.rank = entry.rank;
        Ok(())
    }

    fn find_posting(&self, page: PageId, lemma: LemmaId) -> Result<Option<IndexEntry>, StoreError> {
        let t = self.tables.read();
        Ok(t.posting_keys.get(&(page, lemma)).and_then(|id| t.postings.get(id)).cloned())
    }

    fn postings_for_lemma(&self, lemma: LemmaId) -> Result<Vec<IndexEntry>, StoreError> {
        let t = self.tables.read();
        Ok(t
            .lemma_postings
            .get(&lemma)
            .map(|ids| ids.iter().filter_map(|id| t.postings.get(id)).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_page_overwrites_same_path() {
        let store = MemoryStore::new();
        let site = store.insert_site("https://a.test/", "A", SiteStatus::Indexing).unwrap();
        let first = store.upsert_page(site.id, "/x", 200, "one").unwrap();
        let second = store.upsert_page(site.id, "/x", 404, "two").unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.page.id, second.page.id);
        assert_eq!(store.count_pages(site.id).unwrap(), 1);
        let page = store.find_page(site.id, "/x").unwrap().unwrap();
        assert_eq!(page.code, 404);
        assert_eq!(page.content, "two");
    }

    #[test]
    fn duplicate_keys_conflict() {
        let store = MemoryStore::new();
        let site = store.insert_site("https://a.test/", "A", SiteStatus::Indexing).unwrap();
        assert!(matches!(
            store.insert_site("https://a.test/", "again", SiteStatus::Indexing),
            Err(StoreError::Conflict { .. })
        ));
        let lemma = store.insert_lemma(site.id, "fox").unwrap();
        assert!(store.insert_lemma(site.id, "fox").is_err());
        let page = store.upsert_page(site.id, "/", 200, "").unwrap().page;
        store.insert_posting(page.id, lemma.id, 1.0).unwrap();
        assert!(store.insert_posting(page.id, lemma.id, 2.0).is_err());
    }

    #[test]
    fn lemmas_are_scoped_per_site() {
        let store = MemoryStore::new();
        let a = store.insert_site("https://a.test/", "A", SiteStatus::Indexing).unwrap();
        let b = store.insert_site("https://b.test/", "B", SiteStatus::Indexing).unwrap();
        store.insert_lemma(a.id, "fox").unwrap();
        store.insert_lemma(b.id, "fox").unwrap();
        store.insert_lemma(b.id, "dog").unwrap();
        assert_eq!(store.lemmas_by_text("fox").unwrap().len(), 2);
        assert_eq!(store.count_lemmas(a.id).unwrap(), 1);
        assert_eq!(store.count_lemmas(b.id).unwrap(), 2);
        assert!(store.find_lemma(a.id, "dog").unwrap().is_none());
    }
}
