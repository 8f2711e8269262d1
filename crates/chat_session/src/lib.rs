//! chat_session - one conversation with the upstream
//!
//! - `session` - transcript, protocol manager, compaction and analytics in one value
//! - `history` - gzip JSON persistence of session snapshots
//! - `snapshot` - the persisted shape

pub mod error;
pub mod history;
pub mod session;
pub mod snapshot;

pub use error::{PersistenceError, SessionError, SessionResult};
pub use history::HistoryManager;
pub use session::{ChatSession, SharedSession};
pub use snapshot::{SessionSnapshot, SNAPSHOT_VERSION};
