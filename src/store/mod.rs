pub mod ingest;
pub mod splitter;
pub mod types;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use types::{CollectionInfo, CollectionMeta, RetrievalResult, StoredChunk};

// Key prefixes, no trailing slashes (cnidarium convention)
const COLLECTION_PREFIX: &str = "collection";
const CHUNK_PREFIX: &str = "chunk";

fn collection_key(name: &str) -> String {
    format!("{}/{}", COLLECTION_PREFIX, name)
}
fn chunk_prefix(collection: &str) -> String {
    format!("{}/{}/", CHUNK_PREFIX, collection)
}
fn chunk_key(collection: &str, id: &str) -> String {
    format!("{}{}", chunk_prefix(collection), id)
}

/// Read side of a vector database, as the retrieval agent sees it.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Collection every query is routed to regardless of what the model picks.
    fn default_collection(&self) -> &str;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>>;
}

/// Collection names are stored with spaces, dashes and slashes replaced by
/// underscores. A `/` would let one collection's chunk prefix cover another's.
pub fn normalize_collection_name(name: &str) -> String {
    name.trim().replace([' ', '-', '/'], "_")
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Embedded vector store: collections and embedded chunks in cnidarium,
/// ranked by brute-force cosine similarity.
pub struct ChunkStore {
    storage: Storage,
    default_collection: String,
    /// Chunks per collection, tagged with the snapshot version they were read at.
    /// An entry is only served while that version is still the latest.
    chunk_cache: RwLock<HashMap<String, (u64, Arc<Vec<StoredChunk>>)>>,
    /// cnidarium rejects a commit whose base snapshot is stale; writers go one at a time.
    write_lock: Mutex<()>,
}

impl ChunkStore {
    pub async fn new(data_dir: &Path, default_collection: impl Into<String>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let prefixes = vec![COLLECTION_PREFIX.to_string(), CHUNK_PREFIX.to_string()];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self {
            storage,
            default_collection: normalize_collection_name(&default_collection.into()),
            chunk_cache: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        })
    }

    /// Create or update a collection record. Returns the normalized name.
    ///
    /// An empty `description` keeps the stored one; `force_new` drops every chunk first.
    pub async fn init_collection(
        &self,
        name: &str,
        description: Option<&str>,
        dimension: usize,
        force_new: bool,
    ) -> Result<String> {
        let name = normalize_collection_name(name);
        if name.is_empty() {
            anyhow::bail!("collection name must not be empty");
        }

        let _guard = self.write_lock.lock().await;
        let existing = self.collection_meta(&name).await?;

        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot.clone());

        if force_new {
            let mut stream = std::pin::pin!(snapshot.prefix_raw(&chunk_prefix(&name)));
            let mut dropped = 0usize;
            while let Some(entry) = stream.next().await {
                let (key, _) = entry?;
                delta.delete(key);
                dropped += 1;
            }
            debug!(collection = %name, dropped, "collection reset");
        }

        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .or_else(|| existing.as_ref().map(|m| m.description.clone()))
            .unwrap_or_default();
        let (created_at, dimension) = match &existing {
            Some(meta) if !force_new && meta.dimension != 0 => (meta.created_at, meta.dimension),
            Some(meta) if !force_new => (meta.created_at, dimension),
            _ => (chrono::Utc::now().timestamp(), dimension),
        };

        let meta = CollectionMeta {
            name: name.clone(),
            description,
            dimension,
            created_at,
        };
        delta.put_raw(
            collection_key(&name),
            serde_json::to_vec(&meta).context("serialize collection meta")?,
        );
        self.storage.commit(delta).await?;

        debug!(collection = %name, dimension = meta.dimension, "collection initialized");
        Ok(name)
    }

    pub async fn collection_meta(&self, name: &str) -> Result<Option<CollectionMeta>> {
        let snapshot = self.storage.latest_snapshot();
        let Some(bytes) = snapshot.get_raw(&collection_key(name)).await? else {
            return Ok(None);
        };
        Ok(Some(
            serde_json::from_slice(&bytes).context("deserialize collection meta")?,
        ))
    }

    /// All collection records, ordered by name.
    pub async fn collections(&self) -> Result<Vec<CollectionMeta>> {
        let snapshot = self.storage.latest_snapshot();
        let mut stream = std::pin::pin!(snapshot.prefix_raw(COLLECTION_PREFIX));
        let mut results = Vec::new();

        while let Some(entry) = stream.next().await {
            match entry {
                Ok((_key, value)) => match serde_json::from_slice::<CollectionMeta>(&value) {
                    Ok(meta) => results.push(meta),
                    Err(e) => warn!("Skipping unreadable collection record: {}", e),
                },
                Err(e) => {
                    warn!("Error reading collection stream: {}", e);
                }
            }
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    /// Store chunks in an existing collection. Returns the number written.
    /// Chunks already present (same reference and text) are overwritten in place.
    pub async fn insert_chunks(&self, collection: &str, chunks: &[StoredChunk]) -> Result<usize> {
        let meta = self
            .collection_meta(collection)
            .await?
            .ok_or_else(|| anyhow::anyhow!("collection not found: {}", collection))?;

        if let Some(bad) = chunks
            .iter()
            .find(|c| meta.dimension != 0 && c.embedding.len() != meta.dimension)
        {
            anyhow::bail!(
                "chunk from {} has dimension {}, collection {} expects {}",
                bad.reference,
                bad.embedding.len(),
                collection,
                meta.dimension
            );
        }

        let _guard = self.write_lock.lock().await;
        let mut delta = StateDelta::new(self.storage.latest_snapshot());
        for chunk in chunks {
            delta.put_raw(
                chunk_key(collection, &chunk.id),
                serde_json::to_vec(chunk).context("serialize chunk")?,
            );
        }
        self.storage.commit(delta).await?;

        debug!(collection, count = chunks.len(), "chunks stored");
        Ok(chunks.len())
    }

    pub async fn chunk_count(&self, collection: &str) -> Result<usize> {
        Ok(self.chunks(collection).await?.len())
    }

    async fn chunks(&self, collection: &str) -> Result<Arc<Vec<StoredChunk>>> {
        {
            let cache = self.chunk_cache.read().await;
            if let Some((version, chunks)) = cache.get(collection) {
                if *version == self.storage.latest_version() {
                    return Ok(chunks.clone());
                }
            }
        }

        let snapshot = self.storage.latest_snapshot();
        let version = snapshot.version();
        let mut stream = std::pin::pin!(snapshot.prefix_raw(&chunk_prefix(collection)));
        let mut chunks = Vec::new();
        while let Some(entry) = stream.next().await {
            match entry {
                Ok((_key, value)) => match serde_json::from_slice::<StoredChunk>(&value) {
                    Ok(chunk) => chunks.push(chunk),
                    Err(e) => warn!(collection, "Skipping unreadable chunk: {}", e),
                },
                Err(e) => {
                    warn!("Error reading chunk stream: {}", e);
                }
            }
        }

        let chunks = Arc::new(chunks);
        self.chunk_cache
            .write()
            .await
            .insert(collection.to_string(), (version, chunks.clone()));
        Ok(chunks)
    }
}

#[async_trait]
impl VectorStore for ChunkStore {
    fn default_collection(&self) -> &str {
        &self.default_collection
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(self
            .collections()
            .await?
            .into_iter()
            .map(CollectionInfo::from)
            .collect())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if self.collection_meta(collection).await?.is_none() {
            anyhow::bail!("collection not found: {}", collection);
        }

        let chunks = self.chunks(collection).await?;
        let mut scored: Vec<(f32, &StoredChunk)> = chunks
            .iter()
            .map(|c| (cosine_similarity(vector, &c.embedding), c))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        debug!(collection, top_k, hits = scored.len(), "vector search");
        Ok(scored
            .into_iter()
            .map(|(score, chunk)| chunk.to_result(score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Metadata;

    fn chunk(text: &str, reference: &str, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk::new(
            text.to_string(),
            reference.to_string(),
            Metadata::new(),
            embedding,
        )
    }

    #[test]
    fn test_normalize_collection_name() {
        assert_eq!(normalize_collection_name(" my-docs v2 "), "my_docs_v2");
        assert_eq!(normalize_collection_name("docs/private"), "docs_private");
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_store_search_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), "deepsearcher").await.unwrap();

        let name = store
            .init_collection("milvus-docs", Some("Milvus documentation"), 2, false)
            .await
            .unwrap();
        assert_eq!(name, "milvus_docs");
        store
            .init_collection("deepsearcher", None, 2, false)
            .await
            .unwrap();

        let written = store
            .insert_chunks(
                &name,
                &[
                    chunk("vectors are indexed", "index.md", vec![1.0, 0.0]),
                    chunk("collections hold data", "collection.md", vec![0.6, 0.8]),
                    chunk("unrelated", "misc.md", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(written, 3);

        let hits = store.search(&name, &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].reference, "index.md");
        assert_eq!(hits[1].reference, "collection.md");
        assert!(hits[0].score.unwrap() > hits[1].score.unwrap());

        let collections = store.list_collections().await.unwrap();
        assert_eq!(
            collections,
            vec![
                CollectionInfo {
                    name: "deepsearcher".to_string(),
                    description: String::new(),
                },
                CollectionInfo {
                    name: "milvus_docs".to_string(),
                    description: "Milvus documentation".to_string(),
                },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reinsert_is_idempotent_and_force_new_resets() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), "deepsearcher").await.unwrap();
        store
            .init_collection("notes", Some("Personal notes"), 2, false)
            .await
            .unwrap();

        let chunks = [chunk("a", "a.md", vec![1.0, 0.0])];
        store.insert_chunks("notes", &chunks).await.unwrap();
        store.insert_chunks("notes", &chunks).await.unwrap();
        assert_eq!(store.chunk_count("notes").await.unwrap(), 1);

        // Empty description keeps the stored one.
        store.init_collection("notes", None, 2, false).await.unwrap();
        let meta = store.collection_meta("notes").await.unwrap().unwrap();
        assert_eq!(meta.description, "Personal notes");

        store.init_collection("notes", None, 2, true).await.unwrap();
        assert_eq!(store.chunk_count("notes").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_unknown_collection_and_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), "deepsearcher").await.unwrap();
        assert!(store.search("missing", &[1.0], 5).await.is_err());

        store.init_collection("dims", None, 3, false).await.unwrap();
        let err = store
            .insert_chunks("dims", &[chunk("x", "x.md", vec![1.0, 0.0])])
            .await;
        assert!(err.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_slash_in_name_does_not_nest_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), "deepsearcher").await.unwrap();
        let docs = store.init_collection("docs", None, 2, false).await.unwrap();
        let private = store
            .init_collection("docs/private", None, 2, false)
            .await
            .unwrap();
        assert_eq!(private, "docs_private");

        store
            .insert_chunks(&docs, &[chunk("public", "pub.md", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .insert_chunks(&private, &[chunk("secret", "secret.md", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store.search("docs", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "public");

        store.init_collection("docs", None, 2, true).await.unwrap();
        assert_eq!(store.chunk_count("docs").await.unwrap(), 0);
        assert_eq!(store.chunk_count(&private).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cache_entry_from_older_snapshot_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path(), "deepsearcher").await.unwrap();
        store.init_collection("notes", None, 2, false).await.unwrap();
        let before = store.storage.latest_version();

        store
            .insert_chunks("notes", &[chunk("a", "a.md", vec![1.0, 0.0])])
            .await
            .unwrap();
        // A search that read before the commit stores its result after it.
        store
            .chunk_cache
            .write()
            .await
            .insert("notes".to_string(), (before, Arc::new(Vec::new())));

        assert_eq!(store.chunk_count("notes").await.unwrap(), 1);
        let hits = store.search("notes", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_searches_during_loads_see_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::new(dir.path(), "deepsearcher").await.unwrap());
        store.init_collection("notes", None, 2, false).await.unwrap();

        for i in 0..50usize {
            let reader = store.clone();
            let search =
                tokio::spawn(async move { reader.search("notes", &[1.0, 0.0], 1).await });
            store
                .insert_chunks(
                    "notes",
                    &[chunk(&format!("note {i}"), "notes.md", vec![1.0, 0.0])],
                )
                .await
                .unwrap();
            search.await.unwrap().unwrap();
            assert_eq!(store.chunk_count("notes").await.unwrap(), i + 1);
        }
    }
}
