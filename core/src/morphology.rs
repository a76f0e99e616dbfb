//! Word normalization per alphabet.
//!
//! A [`Morphology`] turns a lowercase surface word into its normal forms and
//! tells which grammatical class the word belongs to. Each implementation
//! covers exactly one [`Script`]; supporting another alphabet means adding an
//! implementation and registering it with the lemmatizer.

use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Latin,
    Cyrillic,
}

impl Script {
    /// Script of a lowercase word, if every character belongs to one supported alphabet.
    pub fn detect(word: &str) -> Option<Script> {
        if word.is_empty() {
            return None;
        }
        if word.chars().all(|c| c.is_ascii_lowercase()) {
            Some(Script::Latin)
        } else if word.chars().all(is_cyrillic_lower) {
            Some(Script::Cyrillic)
        } else {
            None
        }
    }
}

fn is_cyrillic_lower(c: char) -> bool {
    matches!(c, 'а'..='я' | 'ё')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordClass {
    Notional,
    Conjunction,
    Preposition,
    Interjection,
    Particle,
}

impl WordClass {
    pub fn is_function_word(self) -> bool {
        !matches!(self, WordClass::Notional)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordForm {
    pub normal_forms: Vec<String>,
    pub class: WordClass,
}

#[derive(Debug, Error)]
pub enum MorphologyError {
    #[error("'{word}' is not a {script:?} word")]
    Alphabet { word: String, script: Script },
    #[error("no normal form for '{0}'")]
    NoNormalForm(String),
}

pub trait Morphology: Send + Sync {
    fn script(&self) -> Script;
    fn analyze(&self, word: &str) -> Result<WordForm, MorphologyError>;
}

const ENGLISH_CONJUNCTIONS: &[&str] = &[
    "and", "or", "but", "nor", "yet", "so", "because", "although", "though", "while", "whereas",
    "unless", "whether", "if", "since", "once", "lest", "either", "neither",
];
const ENGLISH_PREPOSITIONS: &[&str] = &[
    "of", "in", "on", "at", "by", "for", "with", "about", "against", "between", "into", "through",
    "during", "before", "after", "above", "below", "to", "from", "over", "under", "upon", "within",
    "without", "across", "among", "around", "behind", "beside", "besides", "beyond", "near",
    "onto", "toward", "towards", "via", "per", "amid", "despite", "till", "until", "throughout",
    "underneath", "inside", "outside",
];
const ENGLISH_INTERJECTIONS: &[&str] =
    &["oh", "ah", "wow", "hey", "oops", "alas", "hmm", "ugh", "ouch", "yeah", "hooray", "oho"];
// Articles are grouped with particles.
const ENGLISH_PARTICLES: &[&str] = &["a", "an", "the", "not", "no", "off", "up", "down", "out"];

const RUSSIAN_CONJUNCTIONS: &[&str] = &[
    "и", "а", "но", "или", "да", "либо", "что", "чтобы", "если", "как", "когда", "хотя", "зато",
    "однако", "тоже", "также", "потому", "поэтому", "ибо", "пока", "нежели", "будто", "словно",
    "причем", "притом",
];
const RUSSIAN_PREPOSITIONS: &[&str] = &[
    "в", "во", "на", "с", "со", "к", "ко", "по", "о", "об", "обо", "от", "ото", "до", "из", "изо",
    "у", "за", "над", "надо", "под", "подо", "при", "про", "для", "без", "через", "между", "перед",
    "около", "вокруг", "после", "среди", "кроме", "вместо", "ради", "сквозь", "возле", "вдоль",
];
const RUSSIAN_INTERJECTIONS: &[&str] = &["ах", "ох", "эх", "ой", "ай", "увы", "ура", "эй", "ого", "ага", "ух"];
const RUSSIAN_PARTICLES: &[&str] = &[
    "не", "ни", "же", "бы", "б", "ли", "вот", "вон", "даже", "уже", "ведь", "лишь", "только", "ну",
    "именно", "разве", "неужели", "пусть", "ка", "то", "де",
];

lazy_static! {
    static ref ENGLISH_CLASSES: HashMap<&'static str, WordClass> = classes(&[
        (WordClass::Conjunction, ENGLISH_CONJUNCTIONS),
        (WordClass::Preposition, ENGLISH_PREPOSITIONS),
        (WordClass::Interjection, ENGLISH_INTERJECTIONS),
        (WordClass::Particle, ENGLISH_PARTICLES),
    ]);
    static ref RUSSIAN_CLASSES: HashMap<&'static str, WordClass> = classes(&[
        (WordClass::Conjunction, RUSSIAN_CONJUNCTIONS),
        (WordClass::Preposition, RUSSIAN_PREPOSITIONS),
        (WordClass::Interjection, RUSSIAN_INTERJECTIONS),
        (WordClass::Particle, RUSSIAN_PARTICLES),
    ]);
}

fn classes(groups: &[(WordClass, &[&'static str])]) -> HashMap<&'static str, WordClass> {
    groups
        .iter()
        .flat_map(|(class, words)| words.iter().map(move |w| (*w, *class)))
        .collect()
}

/// English words, normalized with the Snowball English stemmer.
pub struct EnglishMorphology {
    stemmer: Stemmer,
}

impl EnglishMorphology {
    pub fn new() -> Self {
        Self { stemmer: Stemmer::create(Algorithm::English) }
    }
}

impl Default for EnglishMorphology {
    fn default() -> Self {
        Self::new()
    }
}

impl Morphology for EnglishMorphology {
    fn script(&self) -> Script {
        Script::Latin
    }

    fn analyze(&self, word: &str) -> Result<WordForm, MorphologyError> {
        if Script::detect(word) != Some(Script::Latin) {
            return Err(MorphologyError::Alphabet { word: word.to_string(), script: Script::Latin });
        }
        let class = ENGLISH_CLASSES.get(word).copied().unwrap_or(WordClass::Notional);
        normal_form(&self.stemmer, word, class)
    }
}

/// Russian words, normalized with the Snowball Russian stemmer.
pub struct RussianMorphology {
    stemmer: Stemmer,
}

impl RussianMorphology {
    pub fn new() -> Self {
        Self { stemmer: Stemmer::create(Algorithm::Russian) }
    }
}

impl Default for RussianMorphology {
    fn default() -> Self {
        Self::new()
    }
}

impl Morphology for RussianMorphology {
    fn script(&self) -> Script {
        Script::Cyrillic
    }

    fn analyze(&self, word: &str) -> Result<WordForm, MorphologyError> {
        if Script::detect(word) != Some(Script::Cyrillic) {
            return Err(MorphologyError::Alphabet { word: word.to_string(), script: Script::Cyrillic });
        }
        let word = word.replace('ё', "е");
        let class = RUSSIAN_CLASSES.get(word.as_str()).copied().unwrap_or(WordClass::Notional);
        normal_form(&self.stemmer, &word, class)
    }
}

fn normal_form(stemmer: &Stemmer, word: &str, class: WordClass) -> Result<WordForm, MorphologyError> {
    let stem = stemmer.stem(word);
    if stem.is_empty() {
        return Err(MorphologyError::NoNormalForm(word.to_string()));
    }
    Ok(WordForm { normal_forms: vec![stem.into_owned()], class })
}
