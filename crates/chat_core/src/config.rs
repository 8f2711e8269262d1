use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::budget::ContextBudget;
use crate::models::{resolve_model, DEFAULT_MODEL};
use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http_proxy: String,
    #[serde(default)]
    pub https_proxy: String,
    /// Overrides the upstream origin for the status and chat endpoints
    #[serde(default)]
    pub api_base: Option<String>,
    /// Model alias or full upstream id
    #[serde(default)]
    pub model: Option<String>,
    /// Prepended to the first user turn of every session
    #[serde(default)]
    pub global_prompt: Option<String>,
    #[serde(default)]
    pub history_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub save_history: bool,
    #[serde(default)]
    pub context: ContextBudget,
    /// Last-known-good anti-automation header values
    #[serde(default)]
    pub headers: Option<HeaderOverrides>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderOverrides {
    pub fe_signals: Option<String>,
    pub fe_version: Option<String>,
    pub vqd_hash_1: Option<String>,
}

const CONFIG_FILE_PATH: &str = "config.toml";

fn default_true() -> bool {
    true
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_proxy: String::new(),
            https_proxy: String::new(),
            api_base: None,
            model: None,
            global_prompt: None,
            history_dir: None,
            save_history: true,
            context: ContextBudget::default(),
            headers: None,
            debug: false,
        }
    }
}

impl Config {
    /// Load from `~/.duckchat/config.json`, then `./config.toml`, then apply
    /// environment overrides. Unreadable files fall back to defaults.
    pub fn new() -> Self {
        let mut config = Self::from_json_file(&paths::config_json_path())
            .or_else(|| Self::from_toml_file(Path::new(CONFIG_FILE_PATH)))
            .unwrap_or_default();

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    fn from_json_file(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Config>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Ignoring invalid config at {}: {}", path.display(), e);
                None
            }
        }
    }

    fn from_toml_file(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str::<Config>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Ignoring invalid config at {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(http_proxy) = lookup("HTTP_PROXY") {
            self.http_proxy = http_proxy;
        }
        if let Some(https_proxy) = lookup("HTTPS_PROXY") {
            self.https_proxy = https_proxy;
        }
        if let Some(api_base) = lookup("DUCKCHAT_API_BASE") {
            self.api_base = Some(api_base);
        }
        if let Some(model) = lookup("DUCKCHAT_MODEL") {
            self.model = Some(model);
        }
        if let Some(prompt) = lookup("DUCKCHAT_GLOBAL_PROMPT") {
            self.global_prompt = Some(prompt);
        }

        let signals = lookup("DUCKCHAT_FE_SIGNALS");
        let version = lookup("DUCKCHAT_FE_VERSION");
        let hash = lookup("DUCKCHAT_VQD_HASH");
        if signals.is_some() || version.is_some() || hash.is_some() {
            let headers = self.headers.get_or_insert_with(HeaderOverrides::default);
            if signals.is_some() {
                headers.fe_signals = signals;
            }
            if version.is_some() {
                headers.fe_version = version;
            }
            if hash.is_some() {
                headers.vqd_hash_1 = hash;
            }
        }

        if let Some(debug) = lookup("DUCKCHAT_DEBUG") {
            self.debug = parse_bool_env(&debug);
        }
    }

    /// Upstream model id for the configured alias.
    pub fn model_id(&self) -> String {
        resolve_model(self.model.as_deref().unwrap_or(DEFAULT_MODEL))
    }

    pub fn history_dir(&self) -> PathBuf {
        self.history_dir.clone().unwrap_or_else(paths::history_dir)
    }
}
