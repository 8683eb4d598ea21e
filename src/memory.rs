// ABOUTME: Memory store interface for assistant recall, plus an in-process impl.
// ABOUTME: The production vector database sits behind the trait; the core never sees it.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

/// One search hit, best match first
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub id: String,
    pub content: String,
    pub metadata: Value,
    pub score: f32,
}

/// Narrow interface to the assistant's long-term memory
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store a memory, returning its id
    async fn store(&self, content: &str, metadata: Value) -> Result<String>;

    /// Search memories by relevance to the query
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>>;
}

#[derive(Debug, Clone)]
struct StoredMemory {
    id: String,
    content: String,
    metadata: Value,
    stored_at: DateTime<Utc>,
}

/// In-process memory store scoring by token overlap.
///
/// Stands in for the external vector database in the binary's default wiring
/// and in tests; contents live only for the process lifetime.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<StoredMemory>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, content: &str, metadata: Value) -> Result<String> {
        let record = StoredMemory {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            metadata,
            stored_at: Utc::now(),
        };
        let id = record.id.clone();
        self.records.write().await.push(record);
        tracing::debug!(memory_id = %id, "memory stored");
        Ok(id)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.records.read().await;
        let mut scored: Vec<(f32, DateTime<Utc>, MemoryHit)> = records
            .iter()
            .filter_map(|record| {
                let tokens = tokenize(&record.content);
                let overlap = query_tokens.iter().filter(|t| tokens.contains(t)).count();
                if overlap == 0 {
                    return None;
                }
                let score = overlap as f32 / query_tokens.len() as f32;
                let hit = MemoryHit {
                    id: record.id.clone(),
                    content: record.content.clone(),
                    metadata: record.metadata.clone(),
                    score,
                };
                Some((score, record.stored_at, hit))
            })
            .collect();

        // Best score first; ties broken by recency.
        scored.sort_by(|(a_score, a_at, _), (b_score, b_at, _)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b_at.cmp(a_at))
        });
        Ok(scored.into_iter().take(limit).map(|(_, _, hit)| hit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_store_and_search() {
        let store = InMemoryStore::new();
        store
            .store("quarterly report arrived from accounting", json!({"kind": "mail"}))
            .await
            .unwrap();
        store
            .store("dentist appointment on friday", json!({"kind": "calendar"}))
            .await
            .unwrap();

        let hits = store.search("quarterly report", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("accounting"));
        assert!(hits[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_search_respects_limit_and_order() {
        let store = InMemoryStore::new();
        store.store("rust dispatch engine notes", json!({})).await.unwrap();
        store.store("dispatch queue sizing", json!({})).await.unwrap();
        store.store("grocery list", json!({})).await.unwrap();

        let hits = store.search("dispatch engine", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "rust dispatch engine notes");
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let store = InMemoryStore::new();
        store.store("anything", json!({})).await.unwrap();
        assert!(store.search("", 5).await.unwrap().is_empty());
        assert!(store.search("!!!", 5).await.unwrap().is_empty());
    }
}
