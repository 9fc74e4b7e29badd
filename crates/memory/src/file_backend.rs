//! File-based episode store — append-only JSON lines.
//!
//! Each line is one JSON-encoded [`Episode`]. Episodes are loaded into
//! memory on open; every write appends exactly one line under the write
//! lock, so concurrent tasks never interleave partial records.
//!
//! Storage location: `~/.tasksmith/memory/episodes.jsonl`

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tasksmith_core::error::MemoryError;
use tasksmith_core::memory::{Episode, EpisodeFilter, EpisodeStats, MemoryStore, ScoredEpisode};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use crate::vector::rank_episodes;

/// A file-backed, append-only episode store.
pub struct FileStore {
    path: PathBuf,
    episodes: Arc<RwLock<Vec<Episode>>>,
}

impl FileStore {
    /// Open the store at `path`, loading any episodes already there.
    ///
    /// A missing file starts empty; it is created on first write.
    pub fn open(path: PathBuf) -> Self {
        let episodes = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = episodes.len(), "Episode file loaded");
        Self {
            path,
            episodes: Arc::new(RwLock::new(episodes)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<Episode> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Episode>(line) {
                Ok(episode) => Some(episode),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted episode line");
                    None
                }
            })
            .collect()
    }

    async fn append_line(&self, line: &str) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open episode file: {e}")))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to append episode: {e}")))?;
        file.flush()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to flush episode file: {e}")))
    }
}

#[async_trait]
impl MemoryStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn write(&self, episode: Episode) -> Result<(), MemoryError> {
        let mut line = serde_json::to_string(&episode)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize episode: {e}")))?;
        line.push('\n');

        // Hold the lock across the append so lines and the in-memory order agree.
        let mut episodes = self.episodes.write().await;
        self.append_line(&line).await?;
        episodes.push(episode);
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
