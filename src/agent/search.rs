use anyhow::Result;
use tracing::{debug, info, warn};

use super::{prompts, DeepSearch};
use crate::llm::{parse_list_literal, strip_thinking, Message};
use crate::store::types::{CollectionInfo, RetrievalResult};

/// Collections to search for one query, in first-seen order without repeats:
/// the model's picks, then every collection lacking a description, then the default.
pub(crate) fn working_set(
    selected: Vec<String>,
    collections: &[CollectionInfo],
    default_collection: &str,
) -> Vec<String> {
    let mut set: Vec<String> = Vec::new();
    let mut add = |name: &str| {
        let name = name.trim();
        if !name.is_empty() && !set.iter().any(|n| n == name) {
            set.push(name.to_string());
        }
    };
    for name in &selected {
        add(name);
    }
    for info in collections {
        if info.description.trim().is_empty() || info.name == default_collection {
            add(&info.name);
        }
    }
    set
}

pub(crate) fn is_relevant(reply: &str) -> bool {
    strip_thinking(reply).trim_start().starts_with("YES")
}

impl DeepSearch {
    /// Route `query` to collections, search each one and keep the chunks the
    /// model judges helpful for the query or any sub-query seen so far.
    pub(crate) async fn search_one(
        &self,
        query: &str,
        all_sub_queries: &[String],
    ) -> Result<(Vec<RetrievalResult>, u64)> {
        let mut tokens = 0u64;
        let collections = self.store.list_collections().await?;

        let resp = self
            .llm
            .chat(&[Message::user(prompts::collection_route_prompt(
                query,
                &collections,
            ))])
            .await?;
        tokens += resp.total_tokens;
        let selected = match parse_list_literal(&resp.content) {
            Ok(names) => names,
            Err(e) => {
                debug!(error = %e, "Routing reply is not a list, using it as a collection name");
                vec![strip_thinking(&resp.content).trim().to_string()]
            }
        };

        let targets = working_set(selected, &collections, self.store.default_collection());
        info!(query, collections = ?targets, "Searching vector store");
        if targets.is_empty() {
            return Ok((Vec::new(), tokens));
        }

        let vector = self.embedder.embed_query(query).await?;
        let joined = std::iter::once(query)
            .chain(all_sub_queries.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(", ");

        let mut accepted = Vec::new();
        for collection in &targets {
            let hits = match self.store.search(collection, &vector, self.top_k).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(collection = %collection, error = %e, "Search failed, skipping collection");
                    continue;
                }
            };
            debug!(collection = %collection, hits = hits.len(), "Retrieved chunks");

            let mut references = Vec::new();
            for hit in hits {
                let resp = self
                    .llm
                    .chat(&[Message::user(prompts::rerank_prompt(&joined, &hit.text))])
                    .await?;
                tokens += resp.total_tokens;
                if is_relevant(&resp.content) {
                    references.push(hit.reference.clone());
                    accepted.push(hit);
                }
            }
            if !references.is_empty() {
                info!(
                    collection = %collection,
                    accepted = references.len(),
                    ?references,
                    "Accepted chunks"
                );
            }
        }

        Ok((accepted, tokens))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::testing::{FakeEmbedder, FakeStore, ScriptedLlm};

    fn info(name: &str, description: &str) -> CollectionInfo {
        CollectionInfo {
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    fn engine(llm: Arc<ScriptedLlm>, store: Arc<FakeStore>) -> DeepSearch {
        DeepSearch::new(llm, Arc::new(FakeEmbedder), store, 5)
    }

    #[test]
    fn test_working_set_is_inclusive_and_unique() {
        let collections = vec![
            info("papers", "Research papers"),
            info("notes", ""),
            info("deepsearcher", "Default"),
            info("manuals", "Product manuals"),
        ];
        let set = working_set(
            vec!["papers".into(), " ".into(), "papers".into(), "deepsearcher".into()],
            &collections,
            "deepsearcher",
        );
        assert_eq!(set, vec!["papers", "deepsearcher", "notes"]);
    }

    #[test]
    fn test_relevance_reply() {
        assert!(is_relevant("YES"));
        assert!(is_relevant("<think>it mentions GPUs</think>\n YES, it helps"));
        assert!(!is_relevant("NO"));
        assert!(!is_relevant("yes"));
        assert!(!is_relevant("The answer is YES"));
    }

    #[tokio::test]
    async fn test_search_one_filters_chunks() {
        let store = Arc::new(
            FakeStore::new("deepsearcher")
                .with_collection(
                    "deepsearcher",
                    "General",
                    vec![
                        RetrievalResult::new("GPUs train networks", "gpu.md"),
                        RetrievalResult::new("Cooking pasta", "food.md"),
                    ],
                )
                .with_collection("papers", "Research papers", vec![
                    RetrievalResult::new("Backpropagation explained", "bp.md"),
                ]),
        );
        let llm = Arc::new(ScriptedLlm::replying(2, |p| {
            if p.contains("Is the chunk helpful") {
                let verdict = if p.contains("Cooking") { "NO" } else { "YES" };
                verdict.to_string()
            } else {
                r#"["papers"]"#.to_string()
            }
        }));
        let engine = engine(llm.clone(), store.clone());

        let (accepted, tokens) = engine
            .search_one("How are networks trained?", &["What is deep learning?".to_string()])
            .await
            .unwrap();

        assert_eq!(store.searches(), vec!["papers", "deepsearcher"]);
        let refs: Vec<&str> = accepted.iter().map(|r| r.reference.as_str()).collect();
        assert_eq!(refs, vec!["bp.md", "gpu.md"]);
        // 1 routing call + 3 relevance calls
        assert_eq!(llm.call_count(), 4);
        assert_eq!(tokens, 8);
        assert!(llm.prompts()[1]
            .contains("How are networks trained?, What is deep learning?"));
    }

    #[tokio::test]
    async fn test_unparsable_route_uses_raw_reply() {
        let store = Arc::new(
            FakeStore::new("deepsearcher")
                .with_collection("deepsearcher", "General", vec![])
                .with_collection("papers", "Research papers", vec![
                    RetrievalResult::new("Attention is all you need", "attn.md"),
                ]),
        );
        let llm = Arc::new(ScriptedLlm::replying(1, |p| {
            if p.contains("Is the chunk helpful") {
                "YES".to_string()
            } else {
                "  papers \n".to_string()
            }
        }));
        let (accepted, _) = engine(llm, store.clone())
            .search_one("transformers", &[])
            .await
            .unwrap();
        assert_eq!(store.searches(), vec!["papers", "deepsearcher"]);
        assert_eq!(accepted.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_collection_does_not_stop_others() {
        let store = Arc::new(
            FakeStore::new("deepsearcher")
                .with_collection("deepsearcher", "General", vec![
                    RetrievalResult::new("kept", "a.md"),
                ])
                .with_collection("broken", "Broken", vec![])
                .failing_search("broken"),
        );
        let llm = Arc::new(ScriptedLlm::replying(1, |p| {
            if p.contains("Is the chunk helpful") {
                "YES".to_string()
            } else {
                r#"["broken", "invented_name"]"#.to_string()
            }
        }));
        let (accepted, tokens) = engine(llm, store.clone())
            .search_one("q", &[])
            .await
            .unwrap();
        assert_eq!(store.searches(), vec!["broken", "invented_name", "deepsearcher"]);
        assert_eq!(accepted.len(), 1);
        assert_eq!(tokens, 2);
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let store = Arc::new(FakeStore::new("deepsearcher").failing_listing());
        let llm = Arc::new(ScriptedLlm::replying(1, |_| "[]".to_string()));
        assert!(engine(llm.clone(), store).search_one("q", &[]).await.is_err());
        assert_eq!(llm.call_count(), 0);
    }
}
