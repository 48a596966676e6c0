//! Long-term memory: vector-indexed, user-scoped semantic memories with
//! deduplication, redaction, retention, and an audit-event trail. See
//! SPEC_FULL.md §4.B.

pub mod config;
pub mod embedding;
pub mod store;
pub mod vector;

pub use config::MemoryStoreConfig;
pub use embedding::{provider_from_config, EmbeddingConfig, EmbeddingProvider, EmbeddingProviderKind};
pub use store::MemoryStore;
pub use vector::{SqliteVectorIndex, VectorIndex};
