//! Full-text extraction from article pages.
//!
//! Three tiers, first viable result wins: a structured pass over likely
//! article containers, a paragraph sweep over the whole document, and a
//! regex tag strip as the last resort. "Viable" means more than
//! [`MIN_CONTENT_LEN`] characters of text.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use tracing::debug;

/// Minimum extracted length for a tier's output to be accepted.
pub const MIN_CONTENT_LEN: usize = 50;

const REGEX_TIER_CAP: usize = 5000;

fn collect_text(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .map(|el| {
            el.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn viable(text: &str) -> bool {
    text.trim().chars().count() > MIN_CONTENT_LEN
}

fn article_container(html: &Html) -> Option<String> {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR.get_or_init(|| {
        Selector::parse(r#"article, main, div[class*="article"], div[class*="content"]"#).unwrap()
    });
    let text = collect_text(html, selector);
    viable(&text).then_some(text)
}

fn paragraph_sweep(html: &Html) -> Option<String> {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR.get_or_init(|| Selector::parse("body p").unwrap());
    let text = collect_text(html, selector);
    viable(&text).then_some(text)
}

fn regex_strip(raw: &str) -> Option<String> {
    static SCRIPT: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    static WS: OnceLock<Regex> = OnceLock::new();

    let script = SCRIPT.get_or_init(|| {
        Regex::new(
            r"(?is)<script[^>]*>.*?</script\s*>|<style[^>]*>.*?</style\s*>|<nav[^>]*>.*?</nav\s*>|<header[^>]*>.*?</header\s*>|<footer[^>]*>.*?</footer\s*>",
        )
        .unwrap()
    });
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());
    let ws = WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let text = script.replace_all(raw, " ");
    let text = tag.replace_all(&text, " ");
    let text = ws.replace_all(&text, " ");
    let text: String = text.trim().chars().take(REGEX_TIER_CAP).collect();
    viable(&text).then_some(text)
}

/// Extract the main text of an article page, or `None` when no tier
/// produced a viable result.
pub fn extract_article_text(raw_html: &str) -> Option<String> {
    let document = Html::parse_document(raw_html);

    if let Some(text) = article_container(&document) {
        debug!(len = text.len(), "extracted via article container");
        return Some(text);
    }
    if let Some(text) = paragraph_sweep(&document) {
        debug!(len = text.len(), "extracted via paragraph sweep");
        return Some(text);
    }
    if let Some(text) = regex_strip(raw_html) {
        debug!(len = text.len(), "extracted via regex strip");
        return Some(text);
    }
    None
}
