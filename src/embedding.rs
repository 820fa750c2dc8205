use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::llm::endpoint;

/// Turns text into vectors for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_query(text).await?);
        }
        Ok(out)
    }
}

pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl EmbeddingClient {
    /// Falls back to the chat endpoint settings when no embedding-specific ones are set.
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("EMBEDDING_BASE_URL")
            .or_else(|_| dotenv::var("LLM_BASE_URL"))
            .unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
        let model = dotenv::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-nomic-embed-text-v1.5".to_string());
        let api_key = dotenv::var("EMBEDDING_API_KEY")
            .or_else(|_| dotenv::var("LLM_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            model,
            api_key,
        })
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let mut req = self
            .client
            .post(endpoint(&self.base_url, "embeddings"))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.context("Embedding request failed")?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .context("Failed to read embedding response")?;
        if !status.is_success() {
            anyhow::bail!(
                "Embedding endpoint returned {}: {}",
                status,
                text.chars().take(500).collect::<String>()
            );
        }
        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse embedding JSON")?;

        let vectors = parse_embeddings(&json)?;
        if vectors.len() != input.len() {
            anyhow::bail!(
                "Embedding endpoint returned {} vectors for {} inputs",
                vectors.len(),
                input.len()
            );
        }
        debug!(count = vectors.len(), "embeddings computed");
        Ok(vectors)
    }
}

/// Read `data[*].embedding`, ordered by each entry's `index` field.
pub(crate) fn parse_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json["data"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("embedding response has no data array"))?;

    let mut indexed: Vec<(u64, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, entry) in data.iter().enumerate() {
        let index = entry["index"].as_u64().unwrap_or(pos as u64);
        let vector = entry["embedding"]
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("embedding entry {} has no vector", pos))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding endpoint returned no vector"))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}
