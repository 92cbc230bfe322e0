//! Text helpers shared by the research components: content hashing, sentence
//! chunking, vector similarity and JSON extraction from model output.

use regex::Regex;
use sha1::{Digest, Sha1};
use std::sync::OnceLock;
use tracing::debug;

/// SHA-1 hex digest of `text`; the key for both chunk dedup and embedding lookup.
pub fn hash_text(text: &str) -> String {
    format!("{:x}", Sha1::digest(text.as_bytes()))
}

/// Splits `text` into windows of `per_chunk` sentences.
///
/// Sentence boundaries are whitespace runs that follow `.`, `!` or `?`.
pub fn sentence_chunks(text: &str, per_chunk: usize) -> Vec<String> {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    let boundary = BOUNDARY.get_or_init(|| Regex::new(r"[.!?]\s+").expect("valid regex"));

    let mut sentences = Vec::new();
    let mut start = 0;
    for m in boundary.find_iter(text) {
        // Keep the punctuation with its sentence, drop the whitespace.
        let end = m.start() + 1;
        sentences.push(&text[start..end]);
        start = m.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
        .chunks(per_chunk.max(1))
        .map(|window| window.join(" "))
        .filter(|chunk| !chunk.trim().is_empty())
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Highest cosine similarity between `target` and any of `candidates`, or 0.0.
pub fn max_similarity<'a, I>(target: &[f32], candidates: I) -> f32
where
    I: IntoIterator<Item = &'a Vec<f32>>,
{
    candidates
        .into_iter()
        .map(|candidate| cosine_similarity(target, candidate))
        .fold(None, |best: Option<f32>, sim| Some(best.map_or(sim, |b| b.max(sim))))
        .unwrap_or(0.0)
}

/// Truncates to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

type Extractor = fn(&str) -> Option<String>;

/// Pulls a JSON document out of free-form model output.
///
/// Tries, in order: a fenced ```json block, the whole trimmed text, and the
/// span from the first `{` to the last `}`. Returns `None` when all fail.
pub fn extract_json(raw: &str) -> Option<String> {
    const CHAIN: [(&str, Extractor); 3] = [
        ("fenced block", fenced_json),
        ("whole response", whole_json),
        ("greedy object match", greedy_object),
    ];

    for (name, extractor) in CHAIN {
        if let Some(found) = extractor(raw) {
            debug!("Extracted JSON via {}", name);
            return Some(found);
        }
    }
    debug!("No JSON found in response: {}", truncate_chars(raw, 200));
    None
}

fn fenced_json(raw: &str) -> Option<String> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?is)```json\s*(.*?)\s*```").expect("valid regex"));
    fence
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn whole_json(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .map(|_| trimmed.to_string())
}

fn greedy_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| raw[start..=end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha1_hex() {
        assert_eq!(hash_text("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn chunks_group_sentences() {
        let text = "One. Two! Three? Four. Five.";
        let chunks = sentence_chunks(text, 2);
        assert_eq!(chunks, vec!["One. Two!", "Three? Four.", "Five."]);
    }

    #[test]
    fn chunking_text_without_boundaries_yields_single_chunk() {
        assert_eq!(sentence_chunks("no punctuation here", 4), vec!["no punctuation here"]);
        assert!(sentence_chunks("", 4).is_empty());
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn max_similarity_of_nothing_is_zero() {
        let none: Vec<Vec<f32>> = Vec::new();
        assert_eq!(max_similarity(&[1.0, 0.0], &none), 0.0);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn extracts_fenced_block_first() {
        let raw = "Sure!\n```json\n{\"plan\": []}\n```\nanything else {\"x\": 1}";
        assert_eq!(extract_json(raw).as_deref(), Some("{\"plan\": []}"));
    }

    #[test]
    fn extracts_bare_document() {
        assert_eq!(extract_json("  [\"a\", \"b\"] ").as_deref(), Some("[\"a\", \"b\"]"));
    }

    #[test]
    fn extracts_embedded_object_greedily() {
        let raw = "Here is the plan: {\"plan\": [{\"action\": \"SEARCH\"}]} hope it helps";
        assert_eq!(
            extract_json(raw).as_deref(),
            Some("{\"plan\": [{\"action\": \"SEARCH\"}]}")
        );
    }

    #[test]
    fn reports_missing_json() {
        assert_eq!(extract_json("nothing structured here"), None);
    }
}
