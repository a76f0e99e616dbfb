use crate::html::plain_text;
use crate::morphology::{EnglishMorphology, Morphology, RussianMorphology, Script};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\p{L}+").expect("valid regex");
}

/// Turns text into a bag of lemmas with occurrence counts.
pub struct Lemmatizer {
    morphologies: HashMap<Script, Box<dyn Morphology>>,
}

impl Lemmatizer {
    /// English and Russian analyzers.
    pub fn new() -> Self {
        Self::with_morphologies(vec![Box::new(EnglishMorphology::new()), Box::new(RussianMorphology::new())])
    }

    /// One analyzer per script; a later analyzer replaces an earlier one for the same script.
    pub fn with_morphologies(morphologies: Vec<Box<dyn Morphology>>) -> Self {
        Self { morphologies: morphologies.into_iter().map(|m| (m.script(), m)).collect() }
    }

    /// Lemma -> number of occurrences in `text` (HTML or plain).
    ///
    /// Words are maximal runs of letters. Words mixing alphabets or written in an
    /// unsupported alphabet are skipped, as are function words and words the
    /// analyzer fails on.
    pub fn extract_lemmas(&self, text: &str) -> HashMap<String, u32> {
        let normalized = plain_text(text).nfkc().collect::<String>().to_lowercase();
        let mut lemmas = HashMap::new();
        for word in WORD.find_iter(&normalized).map(|m| m.as_str()) {
            let Some(morphology) = Script::detect(word).and_then(|s| self.morphologies.get(&s)) else {
                continue;
            };
            match morphology.analyze(word) {
                Ok(form) if form.class.is_function_word() => {}
                Ok(form) => {
                    if let Some(lemma) = form.normal_forms.into_iter().next() {
                        *lemmas.entry(lemma).or_insert(0) += 1;
                    }
                }
                Err(e) => tracing::warn!(word, error = %e, "skipping word"),
            }
        }
        lemmas
    }
}

impl Default for Lemmatizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_repeated_words() {
        let lemmas = Lemmatizer::new().extract_lemmas("Fox, foxes and the FOX!");
        assert_eq!(lemmas.get("fox"), Some(&3));
        assert!(!lemmas.contains_key("and"));
        assert!(!lemmas.contains_key("the"));
    }
}
