//! Memory Store tunables, named per SPEC_FULL.md 4.B so the two retrieval
//! thresholds spec.md left unexplained stay separately adjustable rather
//! than unified into one constant.

#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Minimum cosine similarity for a generic `retrieve()` call.
    pub default_min_score: f32,
    pub default_limit: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            default_min_score: 0.70,
            default_limit: 10,
        }
    }
}
