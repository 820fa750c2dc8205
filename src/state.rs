use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::agent::{DeepSearch, DEFAULT_MAX_ITER, DEFAULT_TOP_K};
use crate::embedding::Embedder;
use crate::store::splitter::{SplitSettings, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::store::ChunkStore;

/// Agent parameters (admins can modify at runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    pub max_iter: u32,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iter: DEFAULT_MAX_ITER,
            top_k: DEFAULT_TOP_K,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl AgentConfig {
    /// Defaults overridden by `MAX_ITER`, `SEARCH_TOP_K`, `CHUNK_SIZE` and `CHUNK_OVERLAP`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> T {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            max_iter: parsed(&lookup, "MAX_ITER", defaults.max_iter),
            top_k: parsed(&lookup, "SEARCH_TOP_K", defaults.top_k),
            chunk_size: parsed(&lookup, "CHUNK_SIZE", defaults.chunk_size),
            chunk_overlap: parsed(&lookup, "CHUNK_OVERLAP", defaults.chunk_overlap),
        }
    }

    pub fn split_settings(&self) -> SplitSettings {
        SplitSettings {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

pub struct AppState {
    pub store: Arc<ChunkStore>,
    pub embedder: Arc<dyn Embedder>,
    pub engine: Arc<DeepSearch>,
    pub admin_ids: HashSet<u64>,
    pub config: Arc<RwLock<AgentConfig>>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    /// Snapshot of the config plus an engine using its `top_k`.
    pub async fn engine_for_request(&self) -> (AgentConfig, DeepSearch) {
        let config = *self.config.read().await;
        (config, self.engine.with_top_k(config.top_k))
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;
