use super::send_chunked;
use crate::state::Context;
use crate::store::VectorStore;

/// List searchable collections
#[poise::command(slash_command, guild_only)]
pub async fn collections(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let store = &ctx.data().store;
    let metas = store.collections().await?;

    if metas.is_empty() {
        ctx.say("No collections yet. Use `/deepsearch load` to add some documents.")
            .await?;
        return Ok(());
    }

    let mut output = String::from("**Collections**\n\n");
    for meta in &metas {
        let chunks = store.chunk_count(&meta.name).await?;
        let marker = if meta.name == store.default_collection() {
            " (default)"
        } else {
            ""
        };
        let created = chrono::DateTime::from_timestamp(meta.created_at, 0)
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        output.push_str(&format!(
            "**{}**{}: {} chunks, created {}\n",
            meta.name, marker, chunks, created
        ));
        if meta.description.is_empty() {
            output.push_str("  _no description, searched for every query_\n");
        } else {
            output.push_str(&format!("  {}\n", meta.description));
        }
    }

    send_chunked(&ctx, &output).await
}
