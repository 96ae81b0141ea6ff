//! Detection of clarification follow-ups.
//!
//! A message is contextual when it contains, as a plain case-insensitive
//! substring, any configured clarification phrase.  Matching is deliberately
//! not tokenized: a phrase matches inside longer words.

use serde::{Deserialize, Serialize};

/// Clarification phrases used when no list is configured.
pub const DEFAULT_PHRASES: &[&str] = &[
    "no entendí",
    "explica",
    "dudas",
    "más claro",
    "más simple",
    "no me parece",
    "repite",
    "aclara",
    "sencillo",
    "para qué sirve",
    "cuál es el objetivo",
    "qué finalidad tiene",
    "por qué se hace",
    "qué implica",
    "cuál es el propósito",
    "a qué se refiere",
    "qué significa esto",
    "no quedó claro",
    "detalla mejor",
    "en otras palabras",
    "hazlo más fácil",
    "explícame mejor",
    "no me queda claro",
];

/// Decides whether a user message asks to clarify the previous question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ContextualClassifier {
    phrases: Vec<String>,
}

impl ContextualClassifier {
    /// Builds a classifier from a phrase list.  Blank phrases are dropped.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// Returns the normalized phrases.
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Returns true if `input` contains any configured phrase.
    pub fn is_contextual(&self, input: &str) -> bool {
        let input = input.trim();
        if input.is_empty() {
            return false;
        }
        let lowered = input.to_lowercase();
        self.phrases.iter().any(|p| lowered.contains(p.as_str()))
    }
}

impl Default for ContextualClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_PHRASES)
    }
}

impl From<Vec<String>> for ContextualClassifier {
    fn from(phrases: Vec<String>) -> Self {
        Self::new(phrases)
    }
}

impl From<ContextualClassifier> for Vec<String> {
    fn from(classifier: ContextualClassifier) -> Self {
        classifier.phrases
    }
}
