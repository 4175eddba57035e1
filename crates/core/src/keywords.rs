//! Term-frequency keyword extraction for cluster content analysis.

use std::collections::HashMap;

use rust_stemmers::{Algorithm, Stemmer};
use stop_words::{LANGUAGE, get};
use unicode_segmentation::UnicodeSegmentation;

pub struct KeywordExtractor {
    top_n: usize,
    stemmer: Stemmer,
    stop_words: Vec<String>,
}

impl KeywordExtractor {
    pub fn new() -> Self {
        Self::with_top_n(5)
    }

    pub fn with_top_n(top_n: usize) -> Self {
        let stemmer = Stemmer::create(Algorithm::English);
        let stop_words = get(LANGUAGE::English)
            .iter()
            .map(|s| s.to_string())
            .collect();

        Self {
            top_n,
            stemmer,
            stop_words,
        }
    }

    /// Extract up to `top_n` stemmed keywords from the documents, most
    /// frequent first.
    pub fn extract(&self, documents: &[String]) -> Vec<String> {
        let tokens: Vec<String> = documents
            .iter()
            .flat_map(|doc| {
                doc.unicode_words()
                    .map(|word| word.to_lowercase())
                    .filter(|word| word.len() > 2 && !self.stop_words.contains(word))
                    .map(|word| self.stemmer.stem(&word).to_string())
            })
            .collect();

        if tokens.is_empty() {
            return Vec::new();
        }

        let tf = self.calculate_tf(&tokens);

        let mut tf_scores: Vec<(String, f64)> = tf.into_iter().collect();
        tf_scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        tf_scores
            .into_iter()
            .take(self.top_n)
            .map(|(term, _)| term)
            .collect()
    }

    fn calculate_tf(&self, tokens: &[String]) -> HashMap<String, f64> {
        let mut tf = HashMap::new();
        let total_terms = tokens.len() as f64;

        if total_terms == 0.0 {
            return tf;
        }

        for token in tokens {
            *tf.entry(token.clone()).or_insert(0.0) += 1.0;
        }

        for count in tf.values_mut() {
            *count /= total_terms;
        }

        tf
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}
