//! Persistent CLI configuration.

use std::path::{Path, PathBuf};

use inkwell_core::config::{ProviderAppConfigs, SyncSettings};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR_NAME: &str = "inkwell";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub providers: ProviderAppConfigs,
    /// Directory holding one folder of page files per note
    #[serde(default)]
    pub notes_root: Option<PathBuf>,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub conflict_dir: Option<PathBuf>,
}

const fn default_config_version() -> u32 {
    1
}

fn app_dir(root: Option<PathBuf>) -> PathBuf {
    root.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    app_dir(dirs::config_dir()).join(CONFIG_FILE_NAME)
}

fn data_path(configured: Option<&PathBuf>, fallback: &str) -> PathBuf {
    configured
        .cloned()
        .unwrap_or_else(|| app_dir(dirs::data_dir()).join(fallback))
}

fn io_failure(action: &str, path: &Path, error: impl std::fmt::Display) -> String {
    format!("Failed to {action} {}: {error}", path.display())
}

impl AppConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    version: default_config_version(),
                    ..Self::default()
                });
            }
            Err(error) => return Err(io_failure("read config at", path, error)),
        };

        let mut config: Self = serde_json::from_str(&raw)
            .map_err(|error| io_failure("parse config at", path, error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| io_failure("create config directory", parent, error))?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized).map_err(|error| io_failure("write config at", path, error))
    }

    pub fn notes_root(&self) -> PathBuf {
        data_path(self.notes_root.as_ref(), "notes")
    }

    pub fn database_path(&self) -> PathBuf {
        data_path(self.database_path.as_ref(), "inkwell.db")
    }

    pub fn conflict_dir(&self) -> PathBuf {
        data_path(self.conflict_dir.as_ref(), "conflicts")
    }

    fn normalize(&mut self) {
        self.version = self.version.max(default_config_version());
        self.sync = self.sync.clone().validated();
        self.providers.normalize();
        for path in [
            &mut self.notes_root,
            &mut self.database_path,
            &mut self.conflict_dir,
        ] {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                *path = None;
            }
        }
    }
}
