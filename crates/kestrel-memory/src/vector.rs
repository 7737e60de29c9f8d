//! Semantic index over message content.

use async_trait::async_trait;
use kestrel_core::{BackendResult, Message};
use std::cmp::Ordering;
use tokio::sync::RwLock;

/// An indexed message.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub session_id: String,
    pub message: Message,
    pub embedding: Vec<f32>,
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub session_id: String,
    pub message: Message,
    pub score: f32,
}

/// Similarity index backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, entry: VectorEntry) -> BackendResult<()>;

    /// Best `limit` matches for `query`, optionally restricted to one session,
    /// highest score first.
    async fn search(
        &self,
        query: &[f32],
        session_id: Option<&str>,
        limit: usize,
    ) -> BackendResult<Vec<VectorMatch>>;

    /// Drop every entry of a session; returns how many were removed.
    async fn delete_session(&self, session_id: &str) -> BackendResult<usize>;
}

/// Brute-force cosine similarity index.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<VectorEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, entry: VectorEntry) -> BackendResult<()> {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.message.id == entry.message.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        session_id: Option<&str>,
        limit: usize,
    ) -> BackendResult<Vec<VectorMatch>> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .filter(|entry| session_id.is_none_or(|id| entry.session_id == id))
            .map(|entry| (cosine_similarity(query, &entry.embedding), entry))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, entry)| VectorMatch {
                session_id: entry.session_id.clone(),
                message: entry.message.clone(),
                score,
            })
            .collect())
    }

    async fn delete_session(&self, session_id: &str) -> BackendResult<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.session_id != session_id);
        Ok(before - entries.len())
    }
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
