use anyhow::Result;
use tracing::info;

use super::prompts;
use crate::llm::{strip_thinking, ChatModel, Message};
use crate::store::types::RetrievalResult;

/// Write the final report from every accepted chunk, using each chunk's wider
/// window when the splitter recorded one.
pub async fn synthesize(
    llm: &dyn ChatModel,
    query: &str,
    all_sub_queries: &[String],
    results: &[RetrievalResult],
) -> Result<(String, u64)> {
    let chunks: Vec<&str> = results.iter().map(RetrievalResult::wider_text).collect();
    let resp = llm
        .chat(&[Message::user(prompts::final_answer_prompt(
            query,
            all_sub_queries,
            &chunks,
        ))])
        .await?;

    let answer = strip_thinking(&resp.content).trim().to_string();
    info!(answer_len = answer.len(), tokens = resp.total_tokens, "Final answer generated");
    Ok((answer, resp.total_tokens))
}
