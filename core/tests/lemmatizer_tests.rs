use search_core::morphology::{Morphology, MorphologyError, Script, WordClass, WordForm};
use search_core::Lemmatizer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn it_normalizes_html_and_stems() {
    let lemmas = Lemmatizer::new().extract_lemmas("<p>Running <b>runs</b></p><p>RUN!</p>");
    assert_eq!(lemmas.get("run"), Some(&3));
}

#[test]
fn it_filters_function_words() {
    let lemmas = Lemmatizer::new().extract_lemmas("The quick fox and the lazy dog; кошка и собака");
    assert!(!lemmas.contains_key("and"));
    assert!(!lemmas.contains_key("the"));
    assert!(!lemmas.contains_key("и"));
    assert!(lemmas.contains_key("fox"));
    assert!(lemmas.contains_key("dog"));
    assert!(lemmas.keys().any(|k| k.starts_with("кошк")));
}

#[test]
fn it_skips_unsupported_alphabets_and_splits_on_non_letters() {
    let lemmas = Lemmatizer::new().extract_lemmas("café 東京 dog42cat foxлиса");
    assert!(lemmas.keys().all(|k| !k.contains("caf")));
    assert!(!lemmas.keys().any(|k| k.contains('東')));
    assert!(lemmas.contains_key("dog"));
    assert!(lemmas.contains_key("cat"));
    assert!(!lemmas.keys().any(|k| k.contains("fox")));
    assert!(lemmas.keys().all(|k| k.chars().all(char::is_alphabetic)));
}

#[test]
fn it_returns_nothing_for_empty_text() {
    assert!(Lemmatizer::new().extract_lemmas("").is_empty());
    assert!(Lemmatizer::new().extract_lemmas("123 !!! 4.5").is_empty());
}

struct Recording {
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl Morphology for Recording {
    fn script(&self) -> Script {
        self.script
    }

    fn analyze(&self, word: &str) -> Result<WordForm, MorphologyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match word {
            "broken" | "сломано" => Err(MorphologyError::NoNormalForm(word.to_string())),
            "with" => Ok(WordForm { normal_forms: vec!["with".into()], class: WordClass::Preposition }),
            _ => Ok(WordForm {
                normal_forms: vec![format!("{word}-first"), format!("{word}-second")],
                class: WordClass::Notional,
            }),
        }
    }
}

#[test]
fn it_routes_each_word_to_its_script_and_takes_first_normal_form() {
    let latin = Arc::new(AtomicUsize::new(0));
    let cyrillic = Arc::new(AtomicUsize::new(0));
    let lemmatizer = Lemmatizer::with_morphologies(vec![
        Box::new(Recording { script: Script::Latin, calls: latin.clone() }),
        Box::new(Recording { script: Script::Cyrillic, calls: cyrillic.clone() }),
    ]);
    let lemmas = lemmatizer.extract_lemmas("alpha with broken бета сломано alpha");
    assert_eq!(latin.load(Ordering::SeqCst), 4);
    assert_eq!(cyrillic.load(Ordering::SeqCst), 2);
    assert_eq!(lemmas.get("alpha-first"), Some(&2));
    assert_eq!(lemmas.get("бета-first"), Some(&1));
    assert!(!lemmas.contains_key("with"));
    assert_eq!(lemmas.len(), 2);
}

#[test]
fn it_ignores_scripts_without_an_analyzer() {
    let calls = Arc::new(AtomicUsize::new(0));
    let lemmatizer = Lemmatizer::with_morphologies(vec![Box::new(Recording { script: Script::Latin, calls })]);
    let lemmas = lemmatizer.extract_lemmas("лиса fox");
    assert_eq!(lemmas.len(), 1);
    assert!(lemmas.contains_key("fox-first"));
}
