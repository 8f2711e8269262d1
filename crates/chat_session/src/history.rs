//! Gzip-compressed session history on disk.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::fs;

use crate::error::PersistenceError;
use crate::snapshot::SessionSnapshot;

const MAX_SESSIONS: usize = 100;
const RETENTION_DAYS: u64 = 30;
const FILE_PREFIX: &str = "session_";

type Result<T> = std::result::Result<T, PersistenceError>;

#[derive(Debug, Clone)]
pub struct HistoryManager {
    base_path: PathBuf,
    max_sessions: usize,
    retention: Duration,
}

impl HistoryManager {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            max_sessions: MAX_SESSIONS,
            retention: Duration::from_secs(RETENTION_DAYS * 24 * 60 * 60),
        }
    }

    pub fn with_limits(mut self, max_sessions: usize, retention: Duration) -> Self {
        self.max_sessions = max_sessions;
        self.retention = retention;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub async fn save_session(&self, snapshot: &SessionSnapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.base_path).await?;

        let json = serde_json::to_vec(snapshot)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;

        let path = self.gzip_path(&snapshot.id);
        fs::write(&path, compressed).await?;
        log::info!(
            "Session saved: {} ({} -> {} bytes)",
            path.display(),
            json.len(),
            fs::metadata(&path).await?.len()
        );
        Ok(path)
    }

    /// Reads `session_<id>.json.gz`, falling back to plain `session_<id>.json`.
    pub async fn load_session(&self, id: &str) -> Result<SessionSnapshot> {
        let gzip = self.gzip_path(id);
        match fs::read(&gzip).await {
            Ok(bytes) => return decode_gzip(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        match fs::read(self.plain_path(id)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All readable sessions, most recently saved first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSnapshot>> {
        let mut sessions = Vec::new();
        for path in self.session_files().await? {
            let loaded = match fs::read(&path).await {
                Ok(bytes) if is_gzip(&path) => decode_gzip(&bytes),
                Ok(bytes) => serde_json::from_slice(&bytes).map_err(PersistenceError::from),
                Err(e) => Err(e.into()),
            };
            match loaded {
                Ok(snapshot) => sessions.push(snapshot),
                Err(e) => log::warn!("Skipping unreadable session {}: {}", path.display(), e),
            }
        }
        sessions.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(sessions)
    }

    pub async fn delete_session(&self, id: &str) -> Result<()> {
        let mut deleted_any = false;
        for path in [self.gzip_path(id), self.plain_path(id)] {
            match fs::remove_file(&path).await {
                Ok(()) => deleted_any = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if deleted_any {
            Ok(())
        } else {
            Err(PersistenceError::NotFound(id.to_string()))
        }
    }

    /// Remove files past the retention window, then the oldest beyond the
    /// session cap. Returns how many files were removed.
    pub async fn cleanup_old_sessions(&self) -> Result<usize> {
        let now = SystemTime::now();
        let mut files = Vec::new();
        for path in self.session_files().await? {
            let modified = fs::metadata(&path).await?.modified()?;
            files.push((path, modified));
        }
        files.sort_by(|a, b| b.1.cmp(&a.1));

        let mut removed = 0;
        for (index, (path, modified)) in files.iter().enumerate() {
            let expired = now
                .duration_since(*modified)
                .map(|age| age > self.retention)
                .unwrap_or(false);
            if expired || index >= self.max_sessions {
                fs::remove_file(path).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("Cleaned up {} old sessions", removed);
        }
        Ok(removed)
    }

    async fn session_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(FILE_PREFIX) && (name.ends_with(".json.gz") || name.ends_with(".json"))
            {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn gzip_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{}{}.json.gz", FILE_PREFIX, id))
    }

    fn plain_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{}{}.json", FILE_PREFIX, id))
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|ext| ext == "gz").unwrap_or(false)
}

fn decode_gzip(bytes: &[u8]) -> Result<SessionSnapshot> {
    let mut json = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}
