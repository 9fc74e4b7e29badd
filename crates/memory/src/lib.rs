//! Episode memory implementations for Tasksmith.

pub mod noop;
pub mod in_memory;
pub mod file_backend;
pub mod embedding;
pub mod vector;

pub use noop::NoopStore;
pub use in_memory::InMemoryStore;
pub use file_backend::FileStore;
pub use embedding::HashEmbedder;
pub use vector::{cosine_similarity, rank_episodes};
