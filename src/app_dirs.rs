use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("croquis"),
            )
        } else {
            ProjectDirs::from("", "", "croquis").map(|pd| pd.data_local_dir().to_path_buf())
        }
    }

    /// Log file location; the terminal itself belongs to the TUI.
    pub fn log_path() -> PathBuf {
        Self::state_dir()
            .map(|dir| dir.join("croquis.log"))
            .unwrap_or_else(|| PathBuf::from("croquis.log"))
    }
}
