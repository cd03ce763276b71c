//! Tolerant extraction of JSON payloads from model output.
//!
//! Language models asked for JSON frequently wrap it in prose or fenced
//! code blocks. Extraction is a prioritized chain: direct parse, fenced
//! block, brace-delimited substring, bracket-delimited substring. The
//! first strategy that yields valid JSON wins.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").unwrap())
}

fn parse_direct(output: &str) -> Option<Value> {
    serde_json::from_str(output.trim()).ok()
}

fn parse_fenced(output: &str) -> Option<Value> {
    let caps = fence_re().captures(output)?;
    serde_json::from_str(caps.get(1)?.as_str().trim()).ok()
}

fn delimited(output: &str, open: char, close: char) -> Option<&str> {
    let start = output.find(open)?;
    let end = output.rfind(close)?;
    (end > start).then(|| &output[start..=end])
}

fn parse_braced(output: &str) -> Option<Value> {
    serde_json::from_str(delimited(output, '{', '}')?).ok()
}

fn parse_bracketed(output: &str) -> Option<Value> {
    serde_json::from_str(delimited(output, '[', ']')?).ok()
}

/// Substring extraction keyed on whichever delimiter opens first, so an
/// array wrapped in prose is not mistaken for its first object.
fn parse_delimited(output: &str) -> Option<Value> {
    match (output.find('{'), output.find('[')) {
        (Some(brace), Some(bracket)) if bracket < brace => {
            parse_bracketed(output).or_else(|| parse_braced(output))
        }
        _ => parse_braced(output).or_else(|| parse_bracketed(output)),
    }
}

/// Extract the first parseable JSON value from free-form model output.
pub fn extract_json(output: &str) -> Option<Value> {
    let extractors: [fn(&str) -> Option<Value>; 3] =
        [parse_direct, parse_fenced, parse_delimited];
    extractors.iter().find_map(|extract| extract(output))
}
