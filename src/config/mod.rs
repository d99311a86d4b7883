use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Plugin system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one subdirectory per plugin category
    #[serde(default = "default_plugin_root")]
    pub plugin_root: PathBuf,

    /// File suffix identifying plugin libraries, matched case-insensitively
    #[serde(default = "default_plugin_suffix")]
    pub plugin_suffix: String,

    /// Close native libraries on unload. Turn off when running under a memory
    /// debugger that needs plugin code to stay mapped.
    #[serde(default = "default_true")]
    pub release_native_handle: bool,
}

// Default value functions
fn default_plugin_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".kiln").join("plugins"))
        .unwrap_or_else(|| PathBuf::from("plugins"))
}

fn default_plugin_suffix() -> String {
    std::env::consts::DLL_SUFFIX.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugin_root: default_plugin_root(),
            plugin_suffix: default_plugin_suffix(),
            release_native_handle: true,
        }
    }
}

impl Config {
    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file {}", path.as_ref().display())
        })?;

        let config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = serde_yaml::to_string(self).context("Failed to serialize config")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        fs::write(path.as_ref(), contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get default configuration path
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;

        Ok(home.join(".kiln").join("config.yaml"))
    }
}
