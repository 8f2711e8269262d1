//! chat_core - Core types shared by the chat crates
//!
//! - `message` - transcript entries and their context kinds
//! - `budget` - size budget consulted by context compaction
//! - `models` - model alias table
//! - `config` - file and environment configuration

pub mod budget;
pub mod config;
pub mod message;
pub mod models;
pub mod paths;

pub use budget::ContextBudget;
pub use config::{Config, HeaderOverrides};
pub use message::{transcript_bytes, ContextKind, Message, WireRole};
pub use models::{aliases, display_name, resolve_model, DEFAULT_MODEL};
