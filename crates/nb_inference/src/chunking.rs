//! Boundary-aware splitting of long text into overlapping chunks.
//!
//! Chunk sizes are measured in characters, not bytes, so multi-byte
//! scripts behave the same as ASCII.

use tracing::{debug, warn};

/// Marker inserted where the middle of an oversized text was dropped.
pub const ELISION_MARKER: &str = "\n\n[... content elided ...]\n\n";

const IMPORTANCE_TERMS: [&str; 8] = [
    "important",
    "key",
    "conclusion",
    "summary",
    "analysis",
    "data",
    "critical",
    "significant",
];

/// Strip markup tags and collapse whitespace. Blank lines survive as
/// paragraph breaks so the splitter can still find them.
pub fn clean_markup(text: &str) -> String {
    use regex::Regex;
    use std::sync::OnceLock;

    static TAG: OnceLock<Regex> = OnceLock::new();
    static PARA: OnceLock<Regex> = OnceLock::new();
    static WS: OnceLock<Regex> = OnceLock::new();

    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());
    let para = PARA.get_or_init(|| Regex::new(r"\s*\n\s*\n\s*").unwrap());
    let ws = WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let text = tag.replace_all(text, " ");
    let text = para.replace_all(&text, "\u{0}");
    let text = ws.replace_all(&text, " ");
    text.replace('\u{0}', "\n\n").trim().to_string()
}

fn rfind_str(chars: &[char], needle: &str, lo: usize, hi: usize) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() || hi > chars.len() || lo >= hi {
        return None;
    }
    let mut pos = hi.saturating_sub(needle.len());
    loop {
        if chars[pos..pos + needle.len()] == needle[..] {
            return Some(pos);
        }
        if pos == lo {
            return None;
        }
        pos -= 1;
    }
}

/// Split `text` into at most `max_chunks` overlapping chunks of at most
/// `chunk_size` characters. Returns `[text]` when it already fits and
/// `[]` for empty input. Oversized input is lossily truncated (first
/// ~75% and last ~25% of capacity around an elision marker) rather than
/// rejected.
pub fn split_text_into_chunks(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    max_chunks: usize,
) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut text = clean_markup(text);
    let capacity = chunk_size * max_chunks;
    let mut chars: Vec<char> = text.chars().collect();

    if chars.len() > capacity {
        warn!(
            len = chars.len(),
            capacity, "text exceeds chunking capacity, truncating"
        );
        let head = capacity * 3 / 4;
        let tail = capacity / 4;
        let front: String = chars[..head].iter().collect();
        // Only keep a tail when there is clearly more text past the head.
        text = if chars.len() > head + 500 {
            let back: String = chars[chars.len() - tail..].iter().collect();
            format!("{}{}{}", front, ELISION_MARKER, back)
        } else {
            front
        };
        chars = text.chars().collect();
    }

    let half = chunk_size / 2;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());

        if end < chars.len() && chunks.len() < max_chunks.saturating_sub(1) {
            if let Some(pos) = rfind_str(&chars, "\n\n", start, end)
                .filter(|&p| p > start + half)
            {
                end = pos + 2;
            } else if let Some(pos) = rfind_str(&chars, ". ", start, end)
                .filter(|&p| p > start + half)
            {
                end = pos + 2;
            } else if let Some(pos) = rfind_str(&chars, " ", start + half, end)
                .filter(|&p| p > start)
            {
                end = pos + 1;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim().to_string();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }

        if chunks.len() >= max_chunks {
            let remaining = chars.len() - end;
            if remaining > 200 {
                warn!(max_chunks, remaining, "chunk cap reached with text left over");
            }
            break;
        }

        // Always advance to avoid stalling on degenerate input.
        start = (start + 1).max(end.saturating_sub(overlap));
    }

    debug!(count = chunks.len(), "split text into chunks");
    chunks
}

fn density_score(chunk: &str) -> usize {
    let sentences = chunk.split(". ").count();
    let lower = chunk.to_lowercase();
    let term_hits = IMPORTANCE_TERMS
        .iter()
        .filter(|term| lower.contains(**term))
        .count();
    sentences + term_hits * 2
}

/// Reduce an over-long chunk list to `max_chunks` entries: first chunk,
/// last chunk, and the densest middle chunks. Density (sentence count
/// plus weighted importance-term hits) is a proxy for information
/// content, not a guarantee of optimal selection.
pub fn prioritize_chunks(chunks: Vec<String>, max_chunks: usize) -> Vec<String> {
    if chunks.len() <= max_chunks {
        return chunks;
    }

    let mut selected = Vec::with_capacity(max_chunks);
    selected.push(chunks[0].clone());

    let last = chunks.last().cloned();
    let middle = &chunks[1..chunks.len() - 1];

    let mut scored: Vec<(usize, &String)> =
        middle.iter().map(|c| (density_score(c), c)).collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let keep = max_chunks.saturating_sub(2).min(scored.len());
    selected.extend(scored.into_iter().take(keep).map(|(_, c)| c.clone()));

    if let Some(last) = last {
        selected.push(last);
    }

    debug!(
        original = chunks.len(),
        selected = selected.len(),
        "prioritized chunks"
    );
    selected
}
