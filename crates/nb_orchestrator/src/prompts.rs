//! Prompt builders for the analysis and orchestration models.

use nb_core::{RankedCandidate, UserProfile};
use serde_json::json;

/// Instruction driving the tool-calling loop. The model must work
/// through all four tools before emitting the final report JSON.
pub fn orchestrator_system(user_id: u64, tool_listing: &str) -> String {
    format!(
        "You are the coordinator of a financial news briefing system, generating a \
         personalized daily briefing for user {user_id}.\n\
         \n\
         Available tools:\n{tool_listing}\n\
         \n\
         Work strictly in this order: first look up the user profile, then fetch the \
         latest news, then filter and rank it for this user, then analyze the selected \
         articles. Call one tool at a time by replying with exactly one JSON object:\n\
         {{\"tool\": \"<tool name>\", \"input\": {{...}}}}\n\
         \n\
         After each call you will receive the tool's result. Once all four steps are \
         done, reply with the final report as a single JSON object with these fields:\n\
         {{\n\
           \"full_report_content\": \"<complete narrative briefing>\",\n\
           \"summary\": \"<two or three sentence summary>\",\n\
           \"user_profile_references\": [\"<profile aspects the briefing addresses>\"],\n\
           \"key_directions\": {{\"market_sentiment\": \"<bullish|bearish|neutral>\", \
           \"recommendations\": [\"<actionable suggestion>\"]}},\n\
           \"related_stocks\": [\"<ticker or company>\"],\n\
           \"ai_impact_score\": \"<low|medium|high>\",\n\
           \"news_articles\": [\"<url of each article used>\"]\n\
         }}\n\
         \n\
         full_report_content must not be empty. Do not wrap the final report in a \
         tool call."
    )
}

/// Batch analysis prompt over the ranked candidates.
pub fn analyzer(profile: &UserProfile, candidates: &[RankedCandidate]) -> String {
    let items: Vec<_> = candidates
        .iter()
        .map(|c| {
            json!({
                "title": c.title,
                "summary": c.summary,
                "url": c.url,
                "source": c.source_name,
                "published_at": c.published_at,
            })
        })
        .collect();
    format!(
        "You are a financial analyst. Analyze the following news articles for a reader \
         with this profile: {}\n\
         \n\
         Articles:\n{}\n\
         \n\
         Respond with a single JSON object:\n\
         {{\n\
           \"market_sentiment\": \"<bullish|bearish|neutral>\",\n\
           \"related_stocks\": [\"<ticker or company>\"],\n\
           \"key_trends\": [\"<trend>\"],\n\
           \"potential_impacts\": [\"<impact on the reader's interests>\"],\n\
           \"article_summaries\": [{{\"url\": \"<url>\", \"summary\": \"<one sentence>\"}}]\n\
         }}",
        profile.embedding_text(),
        serde_json::to_string_pretty(&items).unwrap_or_default(),
    )
}
