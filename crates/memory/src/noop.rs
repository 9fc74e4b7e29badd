//! No-op episode store — disables long-term memory entirely.

use async_trait::async_trait;
use tasksmith_core::error::MemoryError;
use tasksmith_core::memory::{Episode, EpisodeFilter, EpisodeStats, MemoryStore, ScoredEpisode};

/// Accepts every write and remembers nothing.
pub struct NoopStore;

#[async_trait]
impl MemoryStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn write(&self, _episode: Episode) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn query_similar(
        &self,
        _embedding: &[f32],
        _filter: &EpisodeFilter,
        _k: usize,
    ) -> Result<Vec<ScoredEpisode>, MemoryError> {
        Ok(Vec::new())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(0)
    }

    async fn stats(&self) -> Result<EpisodeStats, MemoryError> {
        Ok(EpisodeStats::default())
    }
}
