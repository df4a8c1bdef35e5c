use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::vocabulary::DEFAULT_VOCABULARY;

/// Static game settings. Every field falls back to its default when missing
/// from the stored file, so older config files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub session_secs: u64,
    pub jokers: u32,
    pub brush_size: u32,
    pub brush_min: u32,
    pub brush_max: u32,
    pub brush_step: u32,
    pub vocabulary: String,
    pub model: String,
    pub endpoint: String,
    pub request_timeout_secs: u64,
    pub reward_millis: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_secs: 60,
            jokers: 3,
            brush_size: 6,
            brush_min: 2,
            brush_max: 40,
            brush_step: 2,
            vocabulary: DEFAULT_VOCABULARY.to_string(),
            model: "mistral-small-latest".to_string(),
            endpoint: "https://api.mistral.ai/v1/chat/completions".to_string(),
            request_timeout_secs: 30,
            reward_millis: 1300,
        }
    }
}

impl Config {
    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reward_duration(&self) -> Duration {
        Duration::from_millis(self.reward_millis)
    }

    /// Brush bounds, repaired so that `min <= size <= max` always holds.
    pub fn brush_bounds(&self) -> (u32, u32) {
        let min = self.brush_min.max(1);
        (min, self.brush_max.max(min))
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "croquis") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("croquis_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable config");
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
