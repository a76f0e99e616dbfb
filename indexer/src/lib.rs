//! Maintains the per-site lemma table and the page -> lemma postings.

use parking_lot::Mutex;
use search_core::{IndexEntry, Lemma, Lemmatizer, Page, SiteId, Storage, StoreError};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Distinct lemmas found on the page.
    pub lemmas: usize,
    /// Postings created by this call (the rest were overwritten).
    pub new_postings: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Every lemma on the page counts as one more page containing it.
    Fresh,
    /// Only lemmas without a posting for this page count as new.
    Overwrite,
}

pub struct Indexer {
    store: Arc<dyn Storage>,
    lemmatizer: Arc<Lemmatizer>,
    site_locks: Mutex<HashMap<SiteId, Arc<Mutex<()>>>>,
}

impl Indexer {
    pub fn new(store: Arc<dyn Storage>, lemmatizer: Arc<Lemmatizer>) -> Self {
        Self { store, lemmatizer, site_locks: Mutex::new(HashMap::new()) }
    }

    pub fn lemmatizer(&self) -> &Arc<Lemmatizer> {
        &self.lemmatizer
    }

    /// Index a page seen for the first time.
    ///
    /// Each lemma's document frequency is incremented once per call, so calling
    /// this twice for the same page counts the page twice. Ranks are overwritten
    /// with the page's term frequencies. Use [`Indexer::reindex_page`] for pages
    /// that were indexed before.
    pub fn index_page(&self, page: &Page) -> Result<IndexReport, StoreError> {
        self.apply(page, Mode::Fresh)
    }

    /// Index a page whose row already existed: ranks are overwritten and only
    /// lemmas new to this page raise the document frequency. Postings of lemmas
    /// that disappeared from the page are kept.
    pub fn reindex_page(&self, page: &Page) -> Result<IndexReport, StoreError> {
        self.apply(page, Mode::Overwrite)
    }

    fn apply(&self, page: &Page, mode: Mode) -> Result<IndexReport, StoreError> {
        let lemmas = self.lemmatizer.extract_lemmas(&page.content);
        tracing::debug!(path = %page.path, lemmas = lemmas.len(), "lemmatized page");

        let lock = self.site_lock(page.site_id);
        let _guard = lock.lock();
        let mut report = IndexReport { lemmas: lemmas.len(), new_postings: 0 };
        for (text, count) in lemmas {
            let mut lemma = self.find_or_create_lemma(page.site_id, &text)?;
            let posting = self.store.find_posting(page.id, lemma.id)?;
            if mode == Mode::Fresh || posting.is_none() {
                lemma.frequency += 1;
                self.store.update_lemma(&lemma)?;
            }
            match posting {
                Some(existing) => self.store.update_posting(&IndexEntry { rank: count as f32, ..existing })?,
                None => {
                    self.store.insert_posting(page.id, lemma.id, count as f32)?;
                    report.new_postings += 1;
                }
            }
        }
        tracing::info!(path = %page.path, lemmas = report.lemmas, new_postings = report.new_postings, "indexed page");
        Ok(report)
    }

    fn find_or_create_lemma(&self, site: SiteId, text: &str) -> Result<Lemma, StoreError> {
        match self.store.find_lemma(site, text)? {
            Some(lemma) => Ok(lemma),
            None => self.store.insert_lemma(site, text),
        }
    }

    fn site_lock(&self, site: SiteId) -> Arc<Mutex<()>> {
        self.site_locks.lock().entry(site).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_core::{MemoryStore, SiteStatus};

    fn setup() -> (Arc<MemoryStore>, Indexer, u64) {
        let store = Arc::new(MemoryStore::new());
        let site = store.insert_site("https://a.test/", "A", SiteStatus::Indexing).unwrap();
        let indexer = Indexer::new(store.clone(), Arc::new(Lemmatizer::new()));
        (store, indexer, site.id)
    }

    #[test]
    fn counts_each_page_once_per_lemma() {
        let (store, indexer, site) = setup();
        let a = store.upsert_page(site, "/a", 200, "<p>fox fox fox dog</p>").unwrap().page;
        let b = store.upsert_page(site, "/b", 200, "<p>fox</p>").unwrap().page;
        indexer.index_page(&a).unwrap();
        indexer.index_page(&b).unwrap();
        let fox = store.find_lemma(site, "fox").unwrap().unwrap();
        let dog = store.find_lemma(site, "dog").unwrap().unwrap();
        assert_eq!(fox.frequency, 2);
        assert_eq!(dog.frequency, 1);
        assert_eq!(store.find_posting(a.id, fox.id).unwrap().unwrap().rank, 3.0);
        assert_eq!(store.find_posting(b.id, fox.id).unwrap().unwrap().rank, 1.0);
    }

    #[test]
    fn index_twice_keeps_rank_but_recounts_frequency() {
        let (store, indexer, site) = setup();
        let page = store.upsert_page(site, "/", 200, "<p>fox fox</p>").unwrap().page;
        let first = indexer.index_page(&page).unwrap();
        let second = indexer.index_page(&page).unwrap();
        assert_eq!(first.new_postings, 1);
        assert_eq!(second.new_postings, 0);
        let fox = store.find_lemma(site, "fox").unwrap().unwrap();
        assert_eq!(store.find_posting(page.id, fox.id).unwrap().unwrap().rank, 2.0);
        assert_eq!(fox.frequency, 2);
    }

    #[test]
    fn reindex_counts_only_new_lemmas() {
        let (store, indexer, site) = setup();
        let page = store.upsert_page(site, "/", 200, "<p>fox</p>").unwrap().page;
        indexer.index_page(&page).unwrap();
        let page = store.upsert_page(site, "/", 200, "<p>fox fox cat</p>").unwrap().page;
        indexer.reindex_page(&page).unwrap();
        let fox = store.find_lemma(site, "fox").unwrap().unwrap();
        let cat = store.find_lemma(site, "cat").unwrap().unwrap();
        assert_eq!(fox.frequency, 1);
        assert_eq!(cat.frequency, 1);
        assert_eq!(store.find_posting(page.id, fox.id).unwrap().unwrap().rank, 2.0);
    }
}
