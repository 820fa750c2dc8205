mod ask;
mod collections;
mod config;
mod load;

use crate::state::Context;

/// Discord messages are capped at 2000 characters; leave room for formatting.
const MESSAGE_LIMIT: usize = 1990;

/// DeepSearch - iterative research over your document collections
#[poise::command(
    slash_command,
    subcommands(
        "ask::ask",
        "ask::evidence",
        "ask::naive",
        "collections::collections",
        "load::load",
        "load::load_file",
        "config::config"
    )
)]
pub async fn deepsearch(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// Reject non-admins with a reply. Returns whether the caller may proceed.
pub(crate) async fn require_admin(ctx: &Context<'_>) -> Result<bool, anyhow::Error> {
    if ctx.data().is_admin(ctx.author().id.get()) {
        return Ok(true);
    }
    ctx.say("This command is admin-only.").await?;
    Ok(false)
}

/// Send a message in Discord-safe chunks.
/// Every chunk goes through ctx.say(): poise routes follow-ups through the
/// interaction webhook, so no Send Messages channel permission is needed.
pub(crate) async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    for chunk in split_message(text, MESSAGE_LIMIT) {
        ctx.say(chunk).await?;
    }
    Ok(())
}

/// Split `text` into pieces of at most `limit` bytes, preferring line then
/// word boundaries.
pub(crate) fn split_message(text: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= limit {
            pieces.push(remaining);
            break;
        }
        let mut end = limit.max(1);
        while !remaining.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }
        let window = &remaining[..end];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|i| i + 1)
            .unwrap_or(end);
        pieces.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    pieces
}
