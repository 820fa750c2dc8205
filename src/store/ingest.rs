use anyhow::{Context, Result};
use tracing::info;

use super::splitter::{split_documents, SplitSettings};
use super::types::{Document, StoredChunk};
use super::{ChunkStore, VectorStore};
use crate::embedding::Embedder;

const EMBED_BATCH_SIZE: usize = 256;

/// What a load wrote.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub collection: String,
    pub documents: usize,
    pub chunks: usize,
}

/// Fetch a GitHub repository snapshot using githem-core, one document per file.
pub async fn fetch_github_repo(url: &str, doc_type: Option<&str>) -> Result<Vec<Document>> {
    let _parsed = githem_core::parse_github_url(url).context("Invalid GitHub URL")?;

    let preset = match doc_type {
        Some("code") => githem_core::FilterPreset::CodeOnly,
        Some("minimal") => githem_core::FilterPreset::Minimal,
        _ => githem_core::FilterPreset::Standard,
    };
    let opts = githem_core::IngestOptions::with_preset(preset);

    // Clone and ingest is blocking I/O, so it runs in spawn_blocking
    let url_owned = url.to_string();
    let output = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let ingester = githem_core::Ingester::from_url_cached(&url_owned, opts)?;
        let mut output = Vec::new();
        ingester.ingest(&mut output)?;
        Ok(output)
    })
    .await
    .context("spawn_blocking join failed")??;

    let text = String::from_utf8_lossy(&output);
    let docs = split_repo_sections(&text, url);
    info!(url, files = docs.len(), size = output.len(), "GitHub repo fetched");
    Ok(docs)
}

/// githem output delimits files with `=== path ===` lines.
fn split_repo_sections(text: &str, repo_url: &str) -> Vec<Document> {
    let base = repo_url.trim_end_matches('/').trim_end_matches(".git");
    let mut docs = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        if line.starts_with("=== ") && line.ends_with(" ===") {
            if let Some((path, body)) = current.take() {
                push_nonempty(&mut docs, body, format!("{}/blob/HEAD/{}", base, path));
            }
            let path = line.trim_start_matches("=== ").trim_end_matches(" ===");
            current = Some((path.to_string(), String::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    if let Some((path, body)) = current {
        push_nonempty(&mut docs, body, format!("{}/blob/HEAD/{}", base, path));
    }
    docs
}

fn push_nonempty(docs: &mut Vec<Document>, text: String, reference: String) {
    if !text.trim().is_empty() {
        docs.push(Document { text, reference });
    }
}

/// Fetch a web page as text.
pub async fn fetch_url(url: &str) -> Result<Vec<Document>> {
    let resp = reqwest::get(url).await.context("Failed to fetch URL")?;

    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = resp.bytes().await.context("Failed to read response body")?;

    // Convert HTML to text if applicable
    let text = if content_type.contains("html") {
        html2text::from_read(&body[..], 120)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string())
    } else {
        String::from_utf8_lossy(&body).to_string()
    };

    info!(url, size = text.len(), "URL fetched");
    let mut docs = Vec::new();
    push_nonempty(&mut docs, text, url.to_string());
    Ok(docs)
}

/// A text file uploaded by a user. Binary content is rejected.
pub fn documents_from_attachment(filename: &str, bytes: &[u8]) -> Result<Vec<Document>> {
    let text = std::str::from_utf8(bytes)
        .with_context(|| format!("{} is not a UTF-8 text file", filename))?;
    let mut docs = Vec::new();
    push_nonempty(&mut docs, text.to_string(), filename.to_string());
    Ok(docs)
}

/// Split, embed and store documents in `collection` (the store's default when `None`).
pub async fn load_documents(
    store: &ChunkStore,
    embedder: &dyn Embedder,
    docs: &[Document],
    collection: Option<&str>,
    description: Option<&str>,
    force_new: bool,
    settings: SplitSettings,
) -> Result<LoadReport> {
    if docs.is_empty() {
        anyhow::bail!("no documents to load");
    }
    let collection = collection
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(store.default_collection());

    let chunks = split_documents(docs, settings);
    info!(
        documents = docs.len(),
        chunks = chunks.len(),
        chunk_size = settings.chunk_size,
        "documents split"
    );

    let mut stored = Vec::with_capacity(chunks.len());
    for (batch_no, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_documents(&texts).await?;
        if vectors.len() != batch.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            );
        }
        for (chunk, vector) in batch.iter().zip(vectors) {
            stored.push(StoredChunk::new(
                chunk.text.clone(),
                chunk.reference.clone(),
                chunk.metadata.clone(),
                vector,
            ));
        }
        info!(
            batch = batch_no + 1,
            embedded = stored.len(),
            total = chunks.len(),
            "embedding progress"
        );
    }

    let dimension = stored.first().map(|c| c.embedding.len()).unwrap_or(0);
    let collection = store
        .init_collection(collection, description, dimension, force_new)
        .await?;
    let written = store.insert_chunks(&collection, &stored).await?;

    info!(collection = %collection, chunks = written, "documents loaded");
    Ok(LoadReport {
        collection,
        documents: docs.len(),
        chunks: written,
    })
}
