use include_dir::{include_dir, Dir};
use serde::Deserialize;
use serde_json::from_str;

use crate::error::GameError;

static VOCAB_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/vocab");

pub const DEFAULT_VOCABULARY: &str = "french";

/// A fixed, ordered word list plus the instruction sent with every drawing.
/// Loaded once per session and shared read-only across rounds.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Vocabulary {
    pub name: String,
    pub prompt: String,
    pub words: Vec<String>,
}

impl Vocabulary {
    /// Load one of the embedded vocabularies by name.
    pub fn builtin(name: &str) -> Result<Self, GameError> {
        let file = VOCAB_DIR
            .get_file(format!("{}.json", name.to_lowercase()))
            .ok_or_else(|| GameError::UnknownVocabulary(name.to_string()))?;

        let contents = file
            .contents_utf8()
            .ok_or_else(|| GameError::UnknownVocabulary(name.to_string()))?;

        Self::from_json(contents)
    }

    pub fn from_json(json: &str) -> Result<Self, GameError> {
        let mut vocab: Vocabulary = from_str(json)?;
        vocab.words = vocab
            .words
            .into_iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        Ok(vocab)
    }

    /// Ad-hoc list (e.g. from the command line); borrows the prompt of `base`.
    pub fn from_words<I, S>(base: &Vocabulary, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: "custom".to_string(),
            prompt: base.prompt.clone(),
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_string())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Names of every embedded vocabulary, sorted.
    pub fn available() -> Vec<String> {
        let mut names: Vec<String> = VOCAB_DIR
            .files()
            .filter_map(|f| f.path().file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
