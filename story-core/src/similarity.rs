//! Lexical similarity between two passages.
//!
//! Each comparison fits a TF-IDF model over exactly the two passages being
//! compared, so a term shared by both is weighted lower than a term unique
//! to one of them. The score is the cosine of the angle between the two
//! L2-normalized vectors.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    /// Words of two or more characters.
    static ref TOKEN: Regex = Regex::new(r"\b\w\w+\b").unwrap();
}

/// Number of documents in every fitted corpus.
const CORPUS_SIZE: f64 = 2.0;

/// Split text into lowercase terms. Single-character words are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Similarity in `[0, 1]` between two passages.
///
/// Symmetric: `similarity(a, b) == similarity(b, a)` exactly, since the
/// vocabulary is walked in sorted order for both vectors. Two passages with
/// no terms at all score `1.0`; if only one of them is empty the score is `0.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let counts_a = term_counts(a);
    let counts_b = term_counts(b);

    match (counts_a.is_empty(), counts_b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        (false, false) => {}
    }

    let mut vocabulary: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for (term, count) in &counts_a {
        vocabulary.entry(term.as_str()).or_default().0 = *count as f64;
    }
    for (term, count) in &counts_b {
        vocabulary.entry(term.as_str()).or_default().1 = *count as f64;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for &(tf_a, tf_b) in vocabulary.values() {
        let doc_freq = (tf_a > 0.0) as u8 as f64 + (tf_b > 0.0) as u8 as f64;
        let weight = idf(doc_freq);
        let wa = tf_a * weight;
        let wb = tf_b * weight;
        dot += wa * wb;
        norm_a += wa * wa;
        norm_b += wb * wb;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom).clamp(0.0, 1.0)
}

/// Smoothed inverse document frequency over the two-document corpus.
fn idf(doc_freq: f64) -> f64 {
    ((1.0 + CORPUS_SIZE) / (1.0 + doc_freq)).ln() + 1.0
}

fn term_counts(text: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for term in tokenize(text) {
        *counts.entry(term).or_insert(0) += 1;
    }
    counts
}
