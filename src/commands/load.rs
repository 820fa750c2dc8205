use poise::serenity_prelude as serenity;
use tracing::info;

use super::require_admin;
use crate::state::Context;
use crate::store::ingest::{self, LoadReport};
use crate::store::types::Document;

/// Largest attachment accepted by `load_file`.
const MAX_ATTACHMENT_BYTES: u32 = 8 * 1024 * 1024;

/// Load a GitHub repo or web page into a collection (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn load(
    ctx: Context<'_>,
    #[description = "URL (GitHub repo or web page)"] url: String,
    #[description = "Collection (default collection when omitted)"] collection: Option<String>,
    #[description = "What the collection holds, used to route questions"] description: Option<String>,
    #[description = "Type for GitHub repos: documentation, code, minimal"] doc_type: Option<String>,
    #[description = "Drop existing chunks in the collection first"] force_new: Option<bool>,
) -> Result<(), anyhow::Error> {
    if !require_admin(&ctx).await? {
        return Ok(());
    }
    ctx.defer().await?;

    info!(user = ctx.author().name, url, ?collection, "Load started");

    let docs = if url.contains("github.com") {
        ingest::fetch_github_repo(&url, doc_type.as_deref()).await?
    } else {
        ingest::fetch_url(&url).await?
    };

    let report = store_documents(
        &ctx,
        &docs,
        collection.as_deref(),
        description.as_deref(),
        force_new.unwrap_or(false),
    )
    .await?;

    ctx.say(format!(
        "Loaded **{}** into **{}**: {} documents, {} chunks",
        url, report.collection, report.documents, report.chunks
    ))
    .await?;
    Ok(())
}

/// Load an uploaded text file into a collection (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn load_file(
    ctx: Context<'_>,
    #[description = "Text or Markdown file"] file: serenity::Attachment,
    #[description = "Collection (default collection when omitted)"] collection: Option<String>,
    #[description = "What the collection holds, used to route questions"] description: Option<String>,
    #[description = "Drop existing chunks in the collection first"] force_new: Option<bool>,
) -> Result<(), anyhow::Error> {
    if !require_admin(&ctx).await? {
        return Ok(());
    }
    if file.size > MAX_ATTACHMENT_BYTES {
        ctx.say(format!(
            "`{}` is too large ({} KB, limit {} KB).",
            file.filename,
            file.size / 1024,
            MAX_ATTACHMENT_BYTES / 1024
        ))
        .await?;
        return Ok(());
    }
    ctx.defer().await?;

    info!(user = ctx.author().name, file = file.filename, ?collection, "File load started");

    let bytes = file.download().await?;
    let docs = ingest::documents_from_attachment(&file.filename, &bytes)?;

    let report = store_documents(
        &ctx,
        &docs,
        collection.as_deref(),
        description.as_deref(),
        force_new.unwrap_or(false),
    )
    .await?;

    ctx.say(format!(
        "Loaded `{}` into **{}**: {} chunks",
        file.filename, report.collection, report.chunks
    ))
    .await?;
    Ok(())
}

async fn store_documents(
    ctx: &Context<'_>,
    docs: &[Document],
    collection: Option<&str>,
    description: Option<&str>,
    force_new: bool,
) -> Result<LoadReport, anyhow::Error> {
    let data = ctx.data();
    let settings = data.config.read().await.split_settings();
    ingest::load_documents(
        &data.store,
        data.embedder.as_ref(),
        docs,
        collection,
        description,
        force_new,
        settings,
    )
    .await
}
