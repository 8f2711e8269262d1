use std::path::PathBuf;

/// Base directory for local state (~/.duckchat)
pub fn duckchat_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".duckchat")
}

/// config.json path
pub fn config_json_path() -> PathBuf {
    duckchat_dir().join("config.json")
}

/// Default directory for saved sessions
pub fn history_dir() -> PathBuf {
    duckchat_dir().join("history")
}
