//! RSS/Atom feed parsing into [`FeedEntry`] values.

use nb_core::{Error, FeedEntry, Result};
use tracing::warn;

/// Parse a raw feed document. Entries without a link are dropped; a
/// feed with no usable entries is an empty, non-error result.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| Error::Feed(format!("failed to parse feed: {}", e)))?;

    let mut entries = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let Some(url) = entry.links.first().map(|l| l.href.clone()) else {
            warn!("feed entry without link, skipping");
            continue;
        };
        entries.push(FeedEntry {
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            url,
            summary: entry.summary.map(|t| t.content).unwrap_or_default(),
            content: entry
                .content
                .and_then(|c| c.body)
                .unwrap_or_default(),
            published_at: entry.published.or(entry.updated),
            author: entry
                .authors
                .first()
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            categories: entry.categories.iter().map(|c| c.term.clone()).collect(),
            keywords: Vec::new(),
        });
    }
    Ok(entries)
}
