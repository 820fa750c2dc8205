//! Scripted gateways for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::llm::{ChatModel, ChatResponse, Message};
use crate::store::types::{CollectionInfo, RetrievalResult};
use crate::store::VectorStore;

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Which agent step a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Decompose,
    Route,
    Rerank,
    Reflect,
    Report,
    Summary,
}

pub fn step_of(prompt: &str) -> Step {
    if prompt.contains("Is the chunk helpful") {
        Step::Rerank
    } else if prompt.contains("Decide whether additional search queries") {
        Step::Reflect
    } else if prompt.contains("\"COLLECTION_INFO\"") {
        Step::Route
    } else if prompt.starts_with("# Research report") {
        Step::Report
    } else if prompt.contains("summarize a specific and detailed answer") {
        Step::Summary
    } else {
        Step::Decompose
    }
}

/// Chat model that answers each prompt with a closure and bills a fixed token count.
pub struct ScriptedLlm {
    responder: Responder,
    tokens_per_call: u64,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(
        tokens_per_call: u64,
        responder: impl Fn(&str) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            tokens_per_call,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(
        tokens_per_call: u64,
        responder: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        Self::new(tokens_per_call, move |prompt| Ok(responder(prompt)))
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait]
impl ChatModel for ScriptedLlm {
    async fn chat(&self, messages: &[Message]) -> Result<ChatResponse> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt.clone());
        let content = (self.responder)(&prompt)?;
        Ok(ChatResponse {
            content,
            total_tokens: self.tokens_per_call,
        })
    }
}

/// Letter-frequency vectors: identical texts score 1.0 against each other.
pub struct FakeEmbedder;

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; 26];
        for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
            v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        Ok(v)
    }
}

/// In-memory store returning canned chunks per collection, ignoring the query vector.
#[derive(Default)]
pub struct FakeStore {
    default: String,
    collections: Vec<CollectionInfo>,
    chunks: HashMap<String, Vec<RetrievalResult>>,
    failing: HashSet<String>,
    listing_fails: bool,
    searches: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new(default: &str) -> Self {
        Self {
            default: default.to_string(),
            ..Default::default()
        }
    }

    pub fn with_collection(
        mut self,
        name: &str,
        description: &str,
        chunks: Vec<RetrievalResult>,
    ) -> Self {
        self.collections.push(CollectionInfo {
            name: name.to_string(),
            description: description.to_string(),
        });
        self.chunks.insert(name.to_string(), chunks);
        self
    }

    pub fn failing_search(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    /// Collection names in the order they were searched.
    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for FakeStore {
    fn default_collection(&self) -> &str {
        &self.default
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        if self.listing_fails {
            anyhow::bail!("store unavailable");
        }
        Ok(self.collections.clone())
    }

    async fn search(
        &self,
        collection: &str,
        _vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        self.searches.lock().unwrap().push(collection.to_string());
        if self.failing.contains(collection) {
            anyhow::bail!("search on {} failed", collection);
        }
        match self.chunks.get(collection) {
            Some(chunks) => Ok(chunks.iter().take(top_k).cloned().collect()),
            None => anyhow::bail!("Collection '{}' does not exist", collection),
        }
    }
}
