//! Exponential recency decay for published timestamps.

use chrono::{DateTime, Utc};

const DECAY_BASE: f32 = 0.9;
const FLOOR: f32 = 0.1;
const CEILING: f32 = 1.0;

/// Score for a timestamp that cannot be resolved to an age.
pub const NEUTRAL_RECENCY: f32 = 0.5;

/// `0.9^age_days` clamped to `[0.1, 1.0]`. Half-life is about 6.6
/// days; the floor keeps old but relevant items from zeroing out.
/// A missing timestamp scores neutral, a future one as published today.
pub fn recency_score(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f32 {
    let Some(published_at) = published_at else {
        return NEUTRAL_RECENCY;
    };
    let age_days = (now - published_at).num_days().max(0);
    DECAY_BASE.powi(age_days as i32).clamp(FLOOR, CEILING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_article_scores_full() {
        let now = Utc::now();
        assert_eq!(recency_score(Some(now), now), 1.0);
    }

    #[test]
    fn week_old_article_decays() {
        let now = Utc::now();
        let score = recency_score(Some(now - Duration::days(7)), now);
        assert!((score - 0.478).abs() < 0.01, "got {}", score);
    }

    #[test]
    fn ancient_article_hits_the_floor() {
        let now = Utc::now();
        assert_eq!(recency_score(Some(now - Duration::days(1000)), now), 0.1);
    }

    #[test]
    fn missing_timestamp_is_neutral() {
        assert_eq!(recency_score(None, Utc::now()), NEUTRAL_RECENCY);
    }

    #[test]
    fn future_timestamp_clamps_to_full() {
        let now = Utc::now();
        assert_eq!(recency_score(Some(now + Duration::days(3)), now), 1.0);
    }
}
