//! Shared building blocks of the site search engine: the entity model, the
//! storage contract, word normalization, and query-time retrieval.

pub mod config;
pub mod error;
pub mod html;
pub mod lemmatizer;
pub mod model;
pub mod morphology;
pub mod persist;
pub mod search;
pub mod stats;
pub mod store;

pub use error::StoreError;
pub use lemmatizer::Lemmatizer;
pub use model::{IndexEntry, Lemma, LemmaId, Page, PageId, PostingId, Site, SiteId, SiteStatus};
pub use store::{MemoryStore, PageWrite, Storage};
