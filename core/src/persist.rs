use crate::error::StoreError;
use crate::model::{IndexEntry, Lemma, LemmaId, Page, PageId, Site, SiteId, SiteStatus};
use crate::store::{PageWrite, Storage};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreMeta {
    pub version: u32,
    pub created_at: String,
}

/// Durable storage on a sled database.
///
/// Entities live in id-keyed trees encoded with bincode. Compound keys are
/// kept in separate trees mapping the key to the owning id, with big-endian
/// ids so that prefix scans group rows by their parent.
pub struct SledStore {
    root: PathBuf,
    db: Db,
    sites: Tree,
    site_urls: Tree,
    pages: Tree,
    page_keys: Tree,
    lemmas: Tree,
    lemma_keys: Tree,
    lemma_texts: Tree,
    postings: Tree,
    posting_keys: Tree,
    lemma_postings: Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let db = sled::open(&root)?;
        let store = Self {
            sites: db.open_tree("sites")?,
            site_urls: db.open_tree("site_urls")?,
            pages: db.open_tree("pages")?,
            page_keys: db.open_tree("page_keys")?,
            lemmas: db.open_tree("lemmas")?,
            lemma_keys: db.open_tree("lemma_keys")?,
            lemma_texts: db.open_tree("lemma_texts")?,
            postings: db.open_tree("postings")?,
            posting_keys: db.open_tree("posting_keys")?,
            lemma_postings: db.open_tree("lemma_postings")?,
            root,
            db,
        };
        let meta = store.ensure_meta()?;
        tracing::info!(path = %store.root.display(), version = meta.version, created_at = %meta.created_at, "opened store");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn ensure_meta(&self) -> Result<StoreMeta, StoreError> {
        if let Some(raw) = self.db.get("meta")? {
            return Ok(serde_json::from_slice(&raw)?);
        }
        let meta = StoreMeta {
            version: STORE_VERSION,
            created_at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        };
        self.db.insert("meta", serde_json::to_vec(&meta)?)?;
        Ok(meta)
    }

    fn next_id(&self) -> Result<u64, StoreError> {
        Ok(self.db.generate_id()? + 1)
    }

    /// Atomically bind `key` to `id` in `tree`; returns the id already bound on conflict.
    fn claim(tree: &Tree, key: &[u8], id: u64) -> Result<Option<u64>, StoreError> {
        match tree.compare_and_swap(key, None as Option<&[u8]>, Some(id.to_be_bytes().to_vec()))? {
            Ok(()) => Ok(None),
            Err(e) => Ok(e.current.map(|v| read_id(&v))),
        }
    }

    fn load<T: DeserializeOwned>(tree: &Tree, id: u64) -> Result<Option<T>, StoreError> {
        tree.get(id.to_be_bytes())?.map(|raw| decode(&raw)).transpose()
    }

    fn save<T: Serialize>(tree: &Tree, id: u64, value: &T) -> Result<(), StoreError> {
        tree.insert(id.to_be_bytes(), encode(value)?)?;
        Ok(())
    }

    fn update<T: Serialize>(tree: &Tree, entity: &'static str, id: u64, value: &T) -> Result<(), StoreError> {
        if !tree.contains_key(id.to_be_bytes())? {
            return Err(StoreError::Missing { entity, id });
        }
        Self::save(tree, id, value)
    }

    fn lookup<T: DeserializeOwned>(&self, keys: &Tree, rows: &Tree, key: &[u8]) -> Result<Option<T>, StoreError> {
        match keys.get(key)? {
            Some(id) => Self::load(rows, read_id(&id)),
            None => Ok(None),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(raw)?)
}

fn read_id(raw: &[u8]) -> u64 {
    raw.get(..8)
        .and_then(|b| <[u8; 8]>::try_from(b).ok())
        .map(u64::from_be_bytes)
        .unwrap_or_default()
}

fn pair_key(parent: u64, rest: &[u8]) -> Vec<u8> {
    let mut key = parent.to_be_bytes().to_vec();
    key.extend_from_slice(rest);
    key
}

fn text_key(text: &str, site: SiteId) -> Vec<u8> {
    let mut key = text.as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(&site.to_be_bytes());
    key
}

impl Storage for SledStore {
    fn insert_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site, StoreError> {
        let id = self.next_id()?;
        if Self::claim(&self.site_urls, url.as_bytes(), id)?.is_some() {
            return Err(StoreError::Conflict { entity: "site", key: url.to_string() });
        }
        let site = Site {
            id,
            url: url.to_string(),
            name: name.to_string(),
            status,
            status_time: OffsetDateTime::now_utc(),
            last_error: None,
        };
        Self::save(&self.sites, id, &site)?;
        Ok(site)
    }

    fn update_site(&self, site: &Site) -> Result<(), StoreError> {
        Self::update(&self.sites, "site", site.id, site)
    }

    fn site(&self, id: SiteId) -> Result<Option<Site>, StoreError> {
        Self::load(&self.sites, id)
    }

    fn find_site_by_url(&self, url: &str) -> Result<Option<Site>, StoreError> {
        self.lookup(&self.site_urls, &self.sites, url.as_bytes())
    }

    fn sites(&self) -> Result<Vec<Site>, StoreError> {
        self.sites.iter().values().map(|raw| decode(&raw?)).collect()
    }

    fn upsert_page(&self, site: SiteId, path: &str, code: u16, content: &str) -> Result<PageWrite, StoreError> {
        let key = pair_key(site, path.as_bytes());
        let existing = match self.page_keys.get(&key)? {
            Some(raw) => read_id(&raw),
            None => {
                let id = self.next_id()?;
                match Self::claim(&self.page_keys, &key, id)? {
                    Some(current) => current,
                    None => {
                        let page = Page { id, site_id: site, path: path.to_string(), code, content: content.to_string() };
                        Self::save(&self.pages, id, &page)?;
                        return Ok(PageWrite { page, created: true });
                    }
                }
            }
        };
        // Another writer may have claimed the key without having saved the row yet.
        let mut page = Self::load::<Page>(&self.pages, existing)?.unwrap_or(Page {
            id: existing,
            site_id: site,
            path: path.to_string(),
            code,
            content: String::new(),
        });
        page.code = code;
        page.content = content.to_string();
        Self::save(&self.pages, existing, &page)?;
        Ok(PageWrite { page, created: false })
    }

    fn page(&self, id: PageId) -> Result<Option<Page>, StoreError> {
        Self::load(&self.pages, id)
    }

    fn find_page(&self, site: SiteId, path: &str) -> Result<Option<Page>, StoreError> {
        self.lookup(&self.page_keys, &self.pages, &pair_key(site, path.as_bytes()))
    }

    fn page_exists(&self, site: SiteId, path: &str) -> Result<bool, StoreError> {
        Ok(self.page_keys.contains_key(pair_key(site, path.as_bytes()))?)
    }

    fn count_pages(&self, site: SiteId) -> Result<u64, StoreError> {
        Ok(self.page_keys.scan_prefix(site.to_be_bytes()).count() as u64)
    }

    fn insert_lemma(&self, site: SiteId, text: &str) -> Result<Lemma, StoreError> {
        let id = self.next_id()?;
        if Self::claim(&self.lemma_keys, &pair_key(site, text.as_bytes()), id)?.is_some() {
            return Err(StoreError::Conflict { entity: "lemma", key: format!("{site}/{text}") });
        }
        let lemma = Lemma { id, site_id: site, text: text.to_string(), frequency: 0 };
        Self::save(&self.lemmas, id, &lemma)?;
        self.lemma_texts.insert(text_key(text, site), id.to_be_bytes().to_vec())?;
        Ok(lemma)
    }

    fn update_lemma(&self, lemma: &Lemma) -> Result<(), StoreError> {
        Self::update(&self.lemmas, "lemma", lemma.id, lemma)
    }

    fn find_lemma(&self, site: SiteId, text: &str) -> Result<Option<Lemma>, StoreError> {
        self.lookup(&self.lemma_keys, &self.lemmas, &pair_key(site, text.as_bytes()))
    }

    fn lemmas_by_text(&self, text: &str) -> Result<Vec<Lemma>, StoreError> {
        let mut prefix = text.as_bytes().to_vec();
        prefix.push(0);
        let mut found = Vec::new();
        for id in self.lemma_texts.scan_prefix(prefix).values() {
            let id = read_id(&id?);
            if let Some(lemma) = Self::load(&self.lemmas, id)? {
                found.push(lemma);
            }
        }
        Ok(found)
    }

    fn count_lemmas(&self, site: SiteId) -> Result<u64, StoreError> {
        Ok(self.lemma_keys.scan_prefix(site.to_be_bytes()).count() as u64)
    }

    fn insert_posting(&self, page: PageId, lemma: LemmaId, rank: f32) -> Result<IndexEntry, StoreError> {
        let id = self.next_id()?;
        if Self::claim(&self.posting_keys, &pair_key(page, &lemma.to_be_bytes()), id)?.is_some() {
            return Err(StoreError::Conflict { entity: "posting", key: format!("{page}/{lemma}") });
        }
        let entry = IndexEntry { id, page_id: page, lemma_id: lemma, rank };
        Self::save(&self.postings, id, &entry)?;
        self.lemma_postings.insert(pair_key(lemma, &id.to_be_bytes()), Vec::<u8>::new())?;
        Ok(entry)
    }

    fn update_posting(&self, entry: &IndexEntry) -> Result<(), StoreError> {
        Self::update(&self.postings, "posting", entry.id, entry)
    }

    fn find_posting(&self, page: PageId, lemma: LemmaId) -> Result<Option<IndexEntry>, StoreError> {
        self.lookup(&self.posting_keys, &self.postings, &pair_key(page, &lemma.to_be_bytes()))
    }

    fn postings_for_lemma(&self, lemma: LemmaId) -> Result<Vec<IndexEntry>, StoreError> {
        let mut found = Vec::new();
        for key in self.lemma_postings.scan_prefix(lemma.to_be_bytes()).keys() {
            let key = key?;
            let id = read_id(key.get(8..).unwrap_or_default());
            if let Some(entry) = Self::load(&self.postings, id)? {
                found.push(entry);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pages_and_postings_survive_reopen() {
        let dir = tempdir().unwrap();
        let (site_id, page_id) = {
            let store = SledStore::open(dir.path()).unwrap();
            let site = store.insert_site("https://a.test/", "A", SiteStatus::Indexing).unwrap();
            let page = store.upsert_page(site.id, "/", 200, "<p>fox</p>").unwrap().page;
            let lemma = store.insert_lemma(site.id, "fox").unwrap();
            store.insert_posting(page.id, lemma.id, 2.0).unwrap();
            store.flush().unwrap();
            (site.id, page.id)
        };
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.find_site_by_url("https://a.test/").unwrap().unwrap().id, site_id);
        assert_eq!(store.find_page(site_id, "/").unwrap().unwrap().id, page_id);
        let lemma = store.find_lemma(site_id, "fox").unwrap().unwrap();
        let postings = store.postings_for_lemma(lemma.id).unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].rank, 2.0);
    }

    #[test]
    fn upsert_keeps_one_row_per_path() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let site = store.insert_site("https://a.test/", "A", SiteStatus::Indexing).unwrap();
        let first = store.upsert_page(site.id, "/a", 200, "one").unwrap();
        let second = store.upsert_page(site.id, "/a", 500, "two").unwrap();
        store.upsert_page(site.id, "/b", 200, "three").unwrap();
        assert!(first.created && !second.created);
        assert_eq!(first.page.id, second.page.id);
        assert_eq!(store.count_pages(site.id).unwrap(), 2);
        assert_eq!(store.page(first.page.id).unwrap().unwrap().code, 500);
    }

    #[test]
    fn lemma_text_index_spans_sites() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let a = store.insert_site("https://a.test/", "A", SiteStatus::Indexing).unwrap();
        let b = store.insert_site("https://b.test/", "B", SiteStatus::Indexing).unwrap();
        store.insert_lemma(a.id, "fox").unwrap();
        store.insert_lemma(b.id, "fox").unwrap();
        store.insert_lemma(b.id, "foxes").unwrap();
        assert_eq!(store.lemmas_by_text("fox").unwrap().len(), 2);
        assert_eq!(store.count_lemmas(b.id).unwrap(), 2);
        assert!(store.insert_lemma(a.id, "fox").is_err());
    }
}
