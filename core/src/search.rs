//! Query-time retrieval over the lemma index.
//!
//! A query is lemmatized with the same [`Lemmatizer`] used for pages, each
//! lemma is resolved to its stored rows, candidate pages are collected from
//! the postings, and every candidate is scored by the summed term frequency
//! of the query lemmas on it. Scores are normalized against the best
//! candidate, so the top result always has relevance 1.0.
//!
//! Candidate selection is explicit: with [`CandidatePolicy::Intersection`] a
//! page must contain every resolved query lemma, with
//! [`CandidatePolicy::Union`] any one of them is enough.

use crate::config::{normalize_root, SearchConfig};
use crate::error::StoreError;
use crate::html::{display_title, plain_text};
use crate::lemmatizer::Lemmatizer;
use crate::model::{Lemma, PageId, SiteId};
use crate::store::Storage;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidatePolicy {
    /// Pages containing every resolved query lemma.
    #[default]
    Intersection,
    /// Pages containing at least one resolved query lemma.
    Union,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("empty search query")]
    EmptyQuery,
    #[error("site {0} is not indexed")]
    UnknownSite(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub uri: String,
    pub title: String,
    pub snippet: String,
    pub relevance: f32,
}

/// One page of results plus the number of candidates before pagination.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchPage {
    pub total: usize,
    pub hits: Vec<SearchHit>,
}

pub struct Retriever {
    store: Arc<dyn Storage>,
    lemmatizer: Arc<Lemmatizer>,
    config: SearchConfig,
}

impl Retriever {
    pub fn new(store: Arc<dyn Storage>, lemmatizer: Arc<Lemmatizer>, config: SearchConfig) -> Self {
        Self { store, lemmatizer, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn search(&self, query: &str, site: Option<&str>, offset: usize, limit: usize) -> Result<SearchPage, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let site_id = match site.filter(|s| !s.trim().is_empty()) {
            Some(url) => {
                let root = normalize_root(url);
                let site = self.store.find_site_by_url(&root)?.ok_or(SearchError::UnknownSite(root))?;
                Some(site.id)
            }
            None => None,
        };

        let query_lemmas = self.lemmatizer.extract_lemmas(query);
        if query_lemmas.is_empty() {
            return Ok(SearchPage::default());
        }
        let mut lemmas = Vec::new();
        for text in query_lemmas.keys() {
            lemmas.extend(self.store.lemmas_by_text(text)?.into_iter().filter(|l| site_id.map_or(true, |id| l.site_id == id)));
        }
        if lemmas.is_empty() {
            return Ok(SearchPage::default());
        }
        lemmas.sort_by_key(|l| l.frequency);

        let scores = self.score_candidates(&lemmas)?;
        let max = scores.iter().map(|(_, s)| *s).fold(0.0f32, f32::max);
        if max <= 0.0 {
            return Ok(SearchPage::default());
        }
        let mut ranked: Vec<(PageId, f32)> = scores.into_iter().map(|(page, s)| (page, s / max)).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        let total = ranked.len();
        tracing::debug!(query, total, lemmas = lemmas.len(), "ranked candidates");

        let terms: Vec<&str> = query_lemmas.keys().map(String::as_str).collect();
        let highlighter = highlighter(&terms);
        let mut hits = Vec::new();
        for (page_id, relevance) in ranked.into_iter().skip(offset).take(limit) {
            let Some(page) = self.store.page(page_id)? else { continue };
            let Some(site) = self.store.site(page.site_id)? else { continue };
            hits.push(SearchHit {
                uri: site.uri(&page.path),
                title: display_title(&page.content, self.config.title_len),
                snippet: snippet(&plain_text(&page.content), highlighter.as_ref(), self.config.snippet_len),
                relevance,
            });
        }
        Ok(SearchPage { total, hits })
    }

    /// Absolute relevance of every candidate page.
    ///
    /// `lemmas` must be sorted rarest first. Lemma rows are grouped by site;
    /// under intersection, a site lacking any of the resolved lemma texts
    /// contributes no candidates.
    fn score_candidates(&self, lemmas: &[Lemma]) -> Result<Vec<(PageId, f32)>, StoreError> {
        let texts: BTreeSet<&str> = lemmas.iter().map(|l| l.text.as_str()).collect();
        let mut by_site: HashMap<SiteId, Vec<&Lemma>> = HashMap::new();
        for lemma in lemmas {
            by_site.entry(lemma.site_id).or_default().push(lemma);
        }

        let mut scores = Vec::new();
        for (_, site_lemmas) in by_site {
            if self.config.candidates == CandidatePolicy::Intersection && site_lemmas.len() < texts.len() {
                continue;
            }
            let mut pages: Option<HashMap<PageId, f32>> = None;
            for lemma in site_lemmas {
                let postings: HashMap<PageId, f32> =
                    self.store.postings_for_lemma(lemma.id)?.into_iter().map(|p| (p.page_id, p.rank)).collect();
                pages = Some(match (pages, self.config.candidates) {
                    (None, _) => postings,
                    (Some(mut acc), CandidatePolicy::Intersection) => {
                        acc.retain(|page, _| postings.contains_key(page));
                        for (page, score) in acc.iter_mut() {
                            *score += postings[page];
                        }
                        acc
                    }
                    (Some(mut acc), CandidatePolicy::Union) => {
                        for (page, rank) in postings {
                            *acc.entry(page).or_insert(0.0) += rank;
                        }
                        acc
                    }
                });
                if pages.as_ref().is_some_and(HashMap::is_empty) {
                    break;
                }
            }
            scores.extend(pages.unwrap_or_default());
        }
        Ok(scores)
    }
}

/// Case-insensitive matcher for any of `terms`, longest alternatives first.
/// Lemmas store `ё` as `е`, so every `е` also matches `ё` in the page text.
fn highlighter(terms: &[&str]) -> Option<Regex> {
    let mut terms: Vec<&str> = terms.iter().copied().filter(|t| !t.is_empty()).collect();
    if terms.is_empty() {
        return None;
    }
    terms.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    let pattern = terms.iter().map(|t| regex::escape(t).replace('е', "[её]")).collect::<Vec<_>>().join("|");
    RegexBuilder::new(&pattern).case_insensitive(true).build().ok()
}

/// A window of about `len` characters around the first term match with every
/// match inside it wrapped in `<b>`; the leading `len` characters, unmarked,
/// when nothing matches.
fn snippet(text: &str, highlighter: Option<&Regex>, len: usize) -> String {
    let Some(first) = highlighter.and_then(|re| re.find(text)) else {
        return text.chars().take(len).collect();
    };
    let total = text.chars().count();
    let hit = text[..first.start()].chars().count();
    let start = hit.saturating_sub(len / 2);
    let end = (start + len).min(total);
    let window = char_slice(text, start, end);
    match highlighter {
        Some(re) => re.replace_all(window, |caps: &regex::Captures| format!("<b>{}</b>", &caps[0])).into_owned(),
        None => window.to_string(),
    }
}

fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let byte = |n: usize| text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len());
    &text[byte(start)..byte(end)]
}
