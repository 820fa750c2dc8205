use anyhow::Result;
use tracing::{info, warn};

use super::prompts;
use crate::llm::{parse_list_literal, ChatModel, Message};
use crate::store::types::RetrievalResult;

/// At most this many follow-up queries are taken from one reflection.
pub const MAX_GAP_QUERIES: usize = 3;

/// Ask whether the evidence so far leaves gaps. Returns follow-up queries,
/// empty when the search should stop.
pub async fn reflect(
    llm: &dyn ChatModel,
    query: &str,
    all_sub_queries: &[String],
    all_results: &[RetrievalResult],
) -> Result<(Vec<String>, u64)> {
    let chunks: Vec<&str> = all_results.iter().map(|r| r.text.as_str()).collect();
    let resp = llm
        .chat(&[Message::user(prompts::reflect_prompt(
            query,
            all_sub_queries,
            &chunks,
        ))])
        .await?;

    let gaps: Vec<String> = match parse_list_literal(&resp.content) {
        Ok(list) => list
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(MAX_GAP_QUERIES)
            .collect(),
        Err(e) => {
            warn!(error = %e, "Could not parse reflection reply, stopping");
            Vec::new()
        }
    };

    info!(?gaps, "Reflection done");
    Ok((gaps, resp.total_tokens))
}
