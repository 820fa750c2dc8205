use tracing::info;

use super::send_chunked;
use crate::state::Context;
use crate::store::types::RetrievalResult;
use crate::store::VectorStore;

/// Research a question across the collections and write a report
#[poise::command(slash_command, guild_only)]
pub async fn ask(
    ctx: Context<'_>,
    #[description = "Your question"] question: String,
    #[description = "Search rounds (default from config)"] max_iter: Option<u32>,
) -> Result<(), anyhow::Error> {
    // Acknowledge immediately so the user isn't staring at a loading spinner
    let user_mention = format!("<@{}>", ctx.author().id);
    ctx.say(format!(
        "Researching that for you. I'll ping you when the report is ready, {}",
        user_mention
    ))
    .await?;

    let (config, engine) = ctx.data().engine_for_request().await;
    let max_iter = max_iter.unwrap_or(config.max_iter);
    info!(user = ctx.author().name, question, max_iter, "Deep search query started");

    let outcome = engine.run_query(&question, max_iter).await?;

    if outcome.sub_queries.is_empty() {
        ctx.say(format!(
            "{} I couldn't break that question into searchable parts. Try rephrasing it.",
            user_mention
        ))
        .await?;
        return Ok(());
    }

    let mut full = format!(
        "{} here's what I found:\n\n**Q:** {}\n**Sub-queries:** {} | **Chunks:** {} | **Tokens:** {}\n\n{}",
        user_mention,
        question,
        outcome.sub_queries.len(),
        outcome.results.len(),
        outcome.total_tokens,
        outcome.answer
    );
    push_sources(&mut full, &outcome.results);

    send_chunked(&ctx, &full).await
}

/// Show the evidence a deep search gathers, without writing a report
#[poise::command(slash_command, guild_only)]
pub async fn evidence(
    ctx: Context<'_>,
    #[description = "Your question"] question: String,
    #[description = "Search rounds (default from config)"] max_iter: Option<u32>,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;

    let (config, engine) = ctx.data().engine_for_request().await;
    let max_iter = max_iter.unwrap_or(config.max_iter);
    info!(
        user = ctx.author().name,
        question,
        max_iter,
        top_k = engine.top_k(),
        "Evidence query started"
    );

    let retrieval = engine.retrieve_only(&question, max_iter).await?;

    let mut full = format!(
        "**Q:** {}\n**Tokens:** {}\n\n**Sub-queries:**\n",
        question, retrieval.total_tokens
    );
    if retrieval.sub_queries.is_empty() {
        full.push_str("_none generated_\n");
    }
    for (i, q) in retrieval.sub_queries.iter().enumerate() {
        full.push_str(&format!("{}. {}\n", i + 1, q));
    }
    full.push_str(&format!("\n**Accepted chunks:** {}", retrieval.results.len()));
    push_sources(&mut full, &retrieval.results);

    send_chunked(&ctx, &full).await
}

/// Single similarity search plus a summary, no iteration
#[poise::command(slash_command, guild_only)]
pub async fn naive(
    ctx: Context<'_>,
    #[description = "Your question"] question: String,
    #[description = "Collection to search (all when omitted)"]
    #[autocomplete = "autocomplete_collection"]
    collection: Option<String>,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;

    let (config, engine) = ctx.data().engine_for_request().await;
    info!(user = ctx.author().name, question, ?collection, "Naive RAG query started");

    let (answer, results, tokens) = engine
        .naive_rag_query(&question, collection.as_deref(), config.top_k)
        .await?;

    let mut full = format!(
        "**Q:** {}\n**Chunks:** {} | **Tokens:** {}\n\n{}",
        question,
        results.len(),
        tokens,
        answer
    );
    push_sources(&mut full, &results);

    send_chunked(&ctx, &full).await
}

/// References in first-seen order, each once.
fn unique_references(results: &[RetrievalResult]) -> Vec<&str> {
    let mut refs: Vec<&str> = Vec::new();
    for r in results {
        if !refs.contains(&r.reference.as_str()) {
            refs.push(&r.reference);
        }
    }
    refs
}

fn push_sources(out: &mut String, results: &[RetrievalResult]) {
    let refs = unique_references(results);
    if refs.is_empty() {
        return;
    }
    out.push_str("\n\n**Sources:**\n");
    for reference in refs {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            // Short label from the URL path
            let label = reference
                .rsplit('/')
                .find(|s| !s.is_empty())
                .unwrap_or(reference);
            out.push_str(&format!("- [{}](<{}>)\n", label, reference));
        } else {
            out.push_str(&format!("- `{}`\n", reference));
        }
    }
}

/// Autocomplete for collection names.
async fn autocomplete_collection(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let collections = ctx.data().store.list_collections().await.unwrap_or_default();

    collections
        .into_iter()
        .map(|c| c.name)
        .filter(|name| name.to_lowercase().contains(&partial.to_lowercase()))
        .take(25)
        .collect()
}
