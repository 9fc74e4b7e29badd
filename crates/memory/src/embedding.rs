//! Offline feature-hashing embedder.
//!
//! Text is split into sections by the `task:`, `tools:` and `outcome:` line
//! prefixes that [`Episode::embedding_text`] emits. Each section's word
//! unigrams and bigrams are hashed (SHA-256) into a fixed number of signed
//! buckets, weighted by section, then L2-normalized. Task words dominate,
//! so a task-only query still lands close to the full episode it matches.
//!
//! [`Episode::embedding_text`]: tasksmith_core::memory::Episode::embedding_text

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tasksmith_core::error::MemoryError;
use tasksmith_core::memory::Embedder;

const TASK_WEIGHT: f32 = 1.0;
const TOOLS_WEIGHT: f32 = 0.3;
const OUTCOME_WEIGHT: f32 = 0.15;

/// Deterministic embedder with no network access.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous core of [`Embedder::embed`].
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for (section, weight, body) in sections(text) {
            let words = tokenize(body);
            for word in &words {
                self.add_feature(&mut vector, section, word, weight);
            }
            for pair in words.windows(2) {
                let bigram = format!("{} {}", pair[0], pair[1]);
                self.add_feature(&mut vector, section, &bigram, weight * 0.5);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], section: &str, feature: &str, weight: f32) {
        let digest = Sha256::new()
            .chain_update(section.as_bytes())
            .chain_update(b":")
            .chain_update(feature.as_bytes())
            .finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(bytes);
        let index = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        Ok(self.embed_text(text))
    }
}

/// Split structured text into `(section, weight, body)`. Unprefixed lines
/// belong to the task section.
fn sections(text: &str) -> Vec<(&'static str, f32, &str)> {
    text.lines()
        .map(|line| {
            if let Some(rest) = line.strip_prefix("task:") {
                ("task", TASK_WEIGHT, rest)
            } else if let Some(rest) = line.strip_prefix("tools:") {
                ("tools", TOOLS_WEIGHT, rest)
            } else if let Some(rest) = line.strip_prefix("outcome:") {
                ("outcome", OUTCOME_WEIGHT, rest)
            } else {
                ("task", TASK_WEIGHT, line)
            }
        })
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(|w| w.to_lowercase())
        .collect()
}
