//! Backend-agnostic vector search trait, narrowed from the teacher's
//! `VectorDb` trait to the operations the Memory Store actually needs.

use async_trait::async_trait;

use agentcore_store::Store;
use agentcore_types::{AgentCoreError, Memory, MemoryType, ScoredMemory, UserId};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Cosine-similarity search over a user's live memories, optionally
    /// restricted to a set of types. Returns at most `limit` results, each
    /// scoring `>= min_score`, ordered by descending score.
    async fn cosine_search(
        &self,
        user_id: UserId,
        query_embedding: &[f32],
        types: Option<&[MemoryType]>,
        limit: usize,
        min_score: f32,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<ScoredMemory>, AgentCoreError>;
}

/// Brute-force cosine scan against `agentcore-store`'s `memories` table.
/// Acceptable at the scale this system targets (a single user's memory set,
/// not a shared corpus) and avoids an external vector database dependency —
/// the same embedded-by-default rationale the teacher applies to its own
/// `LanceDbBackend`. An HNSW-backed `VectorIndex` is the production-scale
/// successor named in spec.md §6 and can be dropped in without touching
/// callers.
pub struct SqliteVectorIndex {
    store: std::sync::Arc<Store>,
}

impl SqliteVectorIndex {
    pub fn new(store: std::sync::Arc<Store>) -> Self {
        Self { store }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn cosine_search(
        &self,
        user_id: UserId,
        query_embedding: &[f32],
        types: Option<&[MemoryType]>,
        limit: usize,
        min_score: f32,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<ScoredMemory>, AgentCoreError> {
        let candidates = self
            .store
            .live_memory_candidates(user_id, types, now)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;

        let mut scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .filter_map(|memory: Memory| {
                let score = cosine_similarity(query_embedding, &memory.embedding);
                (score >= min_score).then_some(ScoredMemory { memory, score })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

