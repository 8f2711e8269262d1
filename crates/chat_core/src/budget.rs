//! Size budget consulted by the context optimizer.

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_BYTES: usize = 50_000;
const DEFAULT_IMPORTANCE_THRESHOLD: f64 = 0.3;
const DEFAULT_COMPRESSION_RATIO: f64 = 0.7;

/// Context budget configuration. Never mutated by the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Hard ceiling on the cumulative byte size of the transcript
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    /// Messages scored below this are candidates for compression
    #[serde(default = "default_importance_threshold")]
    pub importance_threshold: f64,
    /// Fraction of the original size compaction aims to keep
    #[serde(default = "default_compression_ratio")]
    pub target_compression_ratio: f64,
}

fn default_max_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

fn default_importance_threshold() -> f64 {
    DEFAULT_IMPORTANCE_THRESHOLD
}

fn default_compression_ratio() -> f64 {
    DEFAULT_COMPRESSION_RATIO
}

impl ContextBudget {
    pub fn new(max_bytes: usize, importance_threshold: f64, target_compression_ratio: f64) -> Self {
        Self {
            max_bytes,
            importance_threshold: importance_threshold.clamp(0.0, 1.0),
            target_compression_ratio,
        }
    }

    /// Byte size compaction aims for when it has to shrink a transcript.
    pub fn target_bytes(&self) -> usize {
        (self.max_bytes as f64 * self.target_compression_ratio) as usize
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_BYTES,
            DEFAULT_IMPORTANCE_THRESHOLD,
            DEFAULT_COMPRESSION_RATIO,
        )
    }
}
