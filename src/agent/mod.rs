pub mod decompose;
pub mod dedup;
pub mod prompts;
pub mod reflect;
pub mod search;
pub mod synthesize;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::embedding::Embedder;
use crate::llm::{strip_thinking, ChatModel, Message};
use crate::store::types::RetrievalResult;
use crate::store::VectorStore;

use decompose::decompose;
use dedup::dedupe;
use reflect::reflect;
use synthesize::synthesize;

pub const DEFAULT_MAX_ITER: u32 = 3;
pub const DEFAULT_TOP_K: usize = 5;

/// Evidence gathered for one query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Retrieval {
    pub results: Vec<RetrievalResult>,
    pub sub_queries: Vec<String>,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub results: Vec<RetrievalResult>,
    pub sub_queries: Vec<String>,
    pub total_tokens: u64,
}

/// Working state of one `retrieve_only` call.
#[derive(Debug, Default)]
struct IterationState {
    all_sub_queries: Vec<String>,
    all_results: Vec<RetrievalResult>,
    total_tokens: u64,
    current_gap_queries: Vec<String>,
}

impl IterationState {
    fn absorb(&mut self, round: Vec<RetrievalResult>) {
        let mut merged = std::mem::take(&mut self.all_results);
        merged.extend(dedupe(round));
        self.all_results = dedupe(merged);
    }

    fn finish(self) -> Retrieval {
        Retrieval {
            results: dedupe(self.all_results),
            sub_queries: self.all_sub_queries,
            total_tokens: self.total_tokens,
        }
    }
}

/// Iterative retrieval agent: decompose, search, reflect, repeat, then report.
#[derive(Clone)]
pub struct DeepSearch {
    llm: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl DeepSearch {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        top_k: usize,
    ) -> Self {
        Self {
            llm,
            embedder,
            store,
            top_k: top_k.max(1),
        }
    }

    /// Same gateways, different number of chunks per collection search.
    pub fn with_top_k(&self, top_k: usize) -> Self {
        Self {
            top_k: top_k.max(1),
            ..self.clone()
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `query` with a report built from the retrieved evidence.
    pub async fn run_query(&self, query: &str, max_iter: u32) -> Result<QueryOutcome> {
        let retrieval = self.retrieve_only(query, max_iter).await?;
        if retrieval.sub_queries.is_empty() {
            return Ok(QueryOutcome {
                total_tokens: retrieval.total_tokens,
                ..Default::default()
            });
        }

        info!("Generating final answer");
        let (answer, tokens) = synthesize(
            self.llm.as_ref(),
            query,
            &retrieval.sub_queries,
            &retrieval.results,
        )
        .await?;

        let total_tokens = retrieval.total_tokens + tokens;
        info!(total_tokens, "Query complete");
        Ok(QueryOutcome {
            answer,
            results: retrieval.results,
            sub_queries: retrieval.sub_queries,
            total_tokens,
        })
    }

    /// Gather evidence for `query` in at most `max_iter` search rounds.
    pub async fn retrieve_only(&self, query: &str, max_iter: u32) -> Result<Retrieval> {
        info!(query, max_iter, "Starting deep search");
        let mut state = IterationState::default();

        let (sub_queries, tokens) = decompose(self.llm.as_ref(), query).await?;
        state.total_tokens += tokens;
        if sub_queries.is_empty() {
            warn!(query, "No sub-queries generated, nothing to search");
            return Ok(state.finish());
        }
        state.all_sub_queries.extend(sub_queries.iter().cloned());
        state.current_gap_queries = sub_queries;

        for iteration in 1..=max_iter {
            info!(iteration, queries = ?state.current_gap_queries, "Search round");

            let outcomes = join_all(
                state
                    .current_gap_queries
                    .iter()
                    .map(|q| self.search_one(q, &state.all_sub_queries)),
            )
            .await;

            let mut round = Vec::new();
            for outcome in outcomes {
                let (hits, tokens) = outcome?;
                state.total_tokens += tokens;
                round.extend(hits);
            }
            state.absorb(round);
            info!(iteration, results = state.all_results.len(), "Round complete");

            let (gaps, tokens) = reflect(
                self.llm.as_ref(),
                query,
                &state.all_sub_queries,
                &state.all_results,
            )
            .await?;
            state.total_tokens += tokens;
            if gaps.is_empty() {
                info!(iteration, "No further queries, stopping");
                break;
            }
            state.all_sub_queries.extend(gaps.iter().cloned());
            state.current_gap_queries = gaps;
        }

        let retrieval = state.finish();
        info!(
            results = retrieval.results.len(),
            sub_queries = retrieval.sub_queries.len(),
            total_tokens = retrieval.total_tokens,
            "Deep search finished"
        );
        Ok(retrieval)
    }

    /// Plain similarity search: the named collection, or every collection with
    /// the budget split evenly between them.
    pub async fn naive_retrieve(
        &self,
        query: &str,
        collection: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let vector = self.embedder.embed_query(query).await?;

        if let Some(collection) = collection.filter(|c| !c.trim().is_empty()) {
            return self.store.search(collection, &vector, top_k).await;
        }

        let collections = self.store.list_collections().await?;
        if collections.is_empty() {
            return Ok(Vec::new());
        }
        let per_collection = (top_k / collections.len()).max(1);
        let mut results = Vec::new();
        for info in &collections {
            results.extend(self.store.search(&info.name, &vector, per_collection).await?);
        }
        Ok(dedupe(results))
    }

    /// One retrieval, one summarization call.
    pub async fn naive_rag_query(
        &self,
        query: &str,
        collection: Option<&str>,
        top_k: usize,
    ) -> Result<(String, Vec<RetrievalResult>, u64)> {
        let results = self.naive_retrieve(query, collection, top_k).await?;
        let chunks: Vec<&str> = results.iter().map(RetrievalResult::wider_text).collect();
        let resp = self
            .llm
            .chat(&[Message::user(prompts::naive_summary_prompt(query, &chunks))])
            .await?;
        let answer = strip_thinking(&resp.content).trim().to_string();
        info!(query, chunks = results.len(), tokens = resp.total_tokens, "Naive RAG answered");
        Ok((answer, results, resp.total_tokens))
    }
}
