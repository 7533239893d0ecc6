use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const APP_DIR: &str = "remote_dashboard";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Deployment base the remote default configuration is read from. Either
    /// an `http(s)://` / `file://` URL or a local directory. Defaults to the
    /// working directory.
    #[serde(default)]
    pub remote_base: Option<String>,
    /// Directory holding the persisted configuration. Defaults to the
    /// platform data directory.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    /// Where downloaded plugin libraries are kept. Defaults to the platform
    /// cache directory.
    #[serde(default)]
    pub plugin_cache_dir: Option<PathBuf>,
    /// Target directory for configuration exports. Defaults to the download
    /// directory.
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
    /// Largest configuration document that may be persisted, in bytes.
    #[serde(default = "default_storage_quota")]
    pub storage_quota: Option<usize>,
    /// When enabled the application initialises the logger at debug level.
    /// Defaults to `false` when the field is missing in the settings file.
    #[serde(default)]
    pub debug_logging: bool,
    /// Write logs to this file instead of stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Enable toast notifications in the UI.
    #[serde(default = "default_toasts")]
    pub enable_toasts: bool,
    /// Duration of toast notifications in seconds.
    #[serde(default = "default_toast_duration")]
    pub toast_duration: f32,
    /// Initial window size. If absent, a default size is used.
    #[serde(default)]
    pub window_size: Option<(i32, i32)>,
}

fn default_storage_quota() -> Option<usize> {
    Some(5 * 1024 * 1024)
}

fn default_toasts() -> bool {
    true
}

fn default_toast_duration() -> f32 {
    3.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_base: None,
            storage_dir: None,
            plugin_cache_dir: None,
            export_dir: None,
            storage_quota: default_storage_quota(),
            debug_logging: false,
            log_file: None,
            enable_toasts: default_toasts(),
            toast_duration: default_toast_duration(),
            window_size: Some((1024, 720)),
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing or empty file yields the defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn remote_base(&self) -> &str {
        self.remote_base.as_deref().unwrap_or(".")
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| platform_dir(dirs_next::data_dir()).join("storage"))
    }

    pub fn plugin_cache_dir(&self) -> PathBuf {
        self.plugin_cache_dir
            .clone()
            .unwrap_or_else(|| platform_dir(dirs_next::cache_dir()).join("plugins"))
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(|| {
            dirs_next::download_dir()
                .or_else(dirs_next::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }
}

fn platform_dir(base: Option<PathBuf>) -> PathBuf {
    base.map(|b| b.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}
