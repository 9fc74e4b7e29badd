//! In-memory episode store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::sync::Arc;
use tasksmith_core::error::MemoryError;
use tasksmith_core::memory::{Episode, EpisodeFilter, EpisodeStats, MemoryStore, ScoredEpisode};
use tokio::sync::RwLock;
use crate::vector::rank_episodes;

/// An episode store backed by a `Vec`. Nothing survives the process.
#[derive(Clone)]
pub struct InMemoryStore {
    episodes: Arc<RwLock<Vec<Episode>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            episodes: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Snapshot of every stored episode, oldest first.
    pub async fn episodes(&self) -> Vec<Episode> {
        self.episodes.read().await.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&self, episode: Episode) -> Result<(), MemoryError> {
        self.episodes.write().await.push(episode);
        Ok(())
    }

    async fn query_similar(
        &self,
        embedding: &[f32],
        filter: &EpisodeFilter,
        k: usize,
    ) -> Result<Vec<ScoredEpisode>, MemoryError> {
        let episodes = self.episodes.read().await;
        Ok(rank_episodes(episodes.iter(), embedding, filter, k))
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.episodes.read().await.len())
    }

    async fn stats(&self) -> Result<EpisodeStats, MemoryError> {
        let episodes = self.episodes.read().await;
        Ok(EpisodeStats::from_episodes(episodes.iter()))
    }
}
