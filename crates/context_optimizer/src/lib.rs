//! Context compaction for chat transcripts.
//!
//! Keeps an ever-growing transcript inside a byte budget without breaking
//! conversational order. The pipeline runs in four stages:
//!
//! - [`scorer`]: per-message importance from role, recency and content signals
//! - [`dedup`]: collapses whitespace-equivalent bodies, keeping the best-scored copy
//! - [`compressor`]: shrinks low-importance bodies, summarising injected context
//! - [`truncator`]: greedy selection by importance under the hard budget
//!
//! [`ContextOptimizer`] composes the stages and decides when they need to run.

pub mod compressor;
pub mod dedup;
pub mod hashing;
pub mod optimizer;
pub mod scorer;
pub mod truncator;
pub mod types;

pub use compressor::Compressor;
pub use dedup::Deduplicator;
pub use hashing::content_hash;
pub use optimizer::ContextOptimizer;
pub use scorer::ContextScorer;
pub use truncator::Truncator;
pub use types::{ContextAnalysis, OptimizationResult};
