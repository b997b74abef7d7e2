//! Numbered references for generated answers.
//!
//! Retrieval results carry no presentation; everything about `[n]` labels
//! lives here.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use docrag_core::types::RetrievedChunk;

/// `"[n] -> <source> (chunk <i>)"`, numbered from 1 in retrieval order.
pub fn reference_lines(chunks: &[RetrievedChunk]) -> Vec<String> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] -> {} (chunk {})", i + 1, c.source, c.chunk_index))
        .collect()
}

/// Remove numeric `[n]` markers together with the whitespace around them.
pub fn strip_inline_refs(text: &str) -> String {
    static INLINE_REF: OnceLock<Regex> = OnceLock::new();
    let re = INLINE_REF.get_or_init(|| Regex::new(r"\s*\[\d+\]\s*").expect("valid inline reference pattern"));
    re.replace_all(text, " ").into_owned()
}

/// Keep the first occurrence of each reference, in order.
pub fn dedupe_refs(refs: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    refs.into_iter().filter(|r| seen.insert(r.clone())).collect()
}
