use anyhow::Result;
use tracing::{info, warn};

use super::prompts;
use crate::llm::{parse_list_literal, ChatModel, Message};

/// Break `query` into sub-questions. An empty list means the model gave
/// nothing usable and the query cannot proceed.
pub async fn decompose(llm: &dyn ChatModel, query: &str) -> Result<(Vec<String>, u64)> {
    let resp = llm
        .chat(&[Message::user(prompts::sub_query_prompt(query))])
        .await?;

    let sub_queries = match parse_list_literal(&resp.content) {
        Ok(list) => list
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect(),
        Err(e) => {
            warn!(error = %e, "Could not parse sub-queries");
            Vec::new()
        }
    };

    info!(count = sub_queries.len(), ?sub_queries, "Query decomposed");
    Ok((sub_queries, resp.total_tokens))
}
