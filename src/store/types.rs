use serde::{Deserialize, Serialize};

/// Content-addressed chunk ID (blake3 hex hash of reference + text).
pub type ChunkId = String;

pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the surrounding window of a chunk.
pub const WIDER_TEXT_KEY: &str = "wider_text";

/// One chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub text: String,
    /// Source identifier, e.g. a file path or URL.
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl RetrievalResult {
    pub fn new(text: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reference: reference.into(),
            embedding: None,
            metadata: Metadata::new(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The surrounding window stored by the splitter, or the chunk text itself.
    pub fn wider_text(&self) -> &str {
        self.metadata
            .get(WIDER_TEXT_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or(&self.text)
    }
}

/// Name and routing description of a searchable collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    /// Empty when the loader was not given one.
    pub description: String,
}

/// Collection record stored in cnidarium.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub name: String,
    pub description: String,
    /// Embedding width fixed by the first load; 0 until then.
    pub dimension: usize,
    pub created_at: i64,
}

impl From<CollectionMeta> for CollectionInfo {
    fn from(meta: CollectionMeta) -> Self {
        Self {
            name: meta.name,
            description: meta.description,
        }
    }
}

/// A chunk as persisted, with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: ChunkId,
    pub text: String,
    pub reference: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

impl StoredChunk {
    pub fn new(
        text: String,
        reference: String,
        metadata: Metadata,
        embedding: Vec<f32>,
    ) -> Self {
        let id = chunk_id(&reference, &text);
        Self {
            id,
            text,
            reference,
            metadata,
            embedding,
        }
    }

    pub fn to_result(&self, score: f32) -> RetrievalResult {
        RetrievalResult {
            text: self.text.clone(),
            reference: self.reference.clone(),
            embedding: Some(self.embedding.clone()),
            metadata: self.metadata.clone(),
            score: Some(score),
        }
    }
}

/// Same reference + text always maps to the same ID, so re-loading a source is idempotent.
pub fn chunk_id(reference: &str, text: &str) -> ChunkId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(reference.as_bytes());
    hasher.update(&[0]);
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// A loaded source document before splitting.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub reference: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wider_text_falls_back_to_text() {
        let plain = RetrievalResult::new("chunk", "a.md");
        assert_eq!(plain.wider_text(), "chunk");

        let widened = plain.clone().with_metadata(WIDER_TEXT_KEY, "before chunk after");
        assert_eq!(widened.wider_text(), "before chunk after");
    }

    #[test]
    fn test_chunk_id_separates_reference_and_text() {
        assert_eq!(chunk_id("a", "bc"), chunk_id("a", "bc"));
        assert_ne!(chunk_id("a", "bc"), chunk_id("ab", "c"));
    }
}
