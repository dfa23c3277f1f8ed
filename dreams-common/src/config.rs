//! Configuration loading and root folder resolution
//!
//! Priority for every setting: command line > environment > TOML file >
//! compiled default. Command line and environment are handled by clap in the
//! binaries; this module covers the TOML file and the defaults.

use crate::fade_curves::FadeCurve;
use crate::timing::{
    CrossfadeTiming, DEFAULT_CLIP_DURATION_S, DEFAULT_CROSSFADE_S, DEFAULT_FADE_IN_S,
    DEFAULT_STOP_FADE_S,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Where play counts are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    /// Settings table in the SQLite database; survives restarts
    Sqlite,
    /// Process memory only
    Memory,
}

impl FromStr for Persistence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "database" | "db" => Ok(Persistence::Sqlite),
            "memory" | "mem" => Ok(Persistence::Memory),
            other => Err(Error::Config(format!("Unknown persistence '{}'", other))),
        }
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Persistence::Sqlite => write!(f, "sqlite"),
            Persistence::Memory => write!(f, "memory"),
        }
    }
}

/// `[timing]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingConfig {
    pub clip_duration_s: Option<f64>,
    pub crossfade_s: Option<f64>,
    pub fade_in_s: Option<f64>,
    pub stop_fade_s: Option<f64>,
    /// Crossfade curve (linear by default)
    pub curve: Option<String>,
}

/// `[logging]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter directive used when RUST_LOG is unset
    pub level: Option<String>,
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub port: Option<u16>,
    pub audio_dir: Option<PathBuf>,
    pub catalog_file: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub persistence: Option<Persistence>,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the platform config file, or an empty config when none exists
    pub fn load_default() -> Result<Self> {
        match default_config_file() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load `explicit` when given, otherwise the platform config file
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    /// Audio directory, defaulting to `<root>/audio/ogg`
    pub fn audio_dir(&self, root: &Path) -> PathBuf {
        match &self.audio_dir {
            Some(dir) => resolve_relative(root, dir),
            None => root.join("audio").join("ogg"),
        }
    }

    /// Database file, defaulting to `<root>/dreams.db`
    pub fn database_path(&self, root: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) => resolve_relative(root, path),
            None => root.join("dreams.db"),
        }
    }

    pub fn catalog_file(&self, root: &Path) -> Option<PathBuf> {
        self.catalog_file.as_ref().map(|p| resolve_relative(root, p))
    }

    /// Validated timing with defaults for unset values
    pub fn crossfade_timing(&self) -> Result<CrossfadeTiming> {
        let t = &self.timing;
        CrossfadeTiming::new(
            t.clip_duration_s.unwrap_or(DEFAULT_CLIP_DURATION_S),
            t.crossfade_s.unwrap_or(DEFAULT_CROSSFADE_S),
            t.fade_in_s.unwrap_or(DEFAULT_FADE_IN_S),
            t.stop_fade_s.unwrap_or(DEFAULT_STOP_FADE_S),
        )
    }

    pub fn fade_curve(&self) -> Result<FadeCurve> {
        match &self.timing.curve {
            Some(name) => FadeCurve::from_str(name)
                .ok_or_else(|| Error::Config(format!("Unknown fade curve '{}'", name))),
            None => Ok(FadeCurve::default()),
        }
    }
}

fn resolve_relative(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Root folder resolution:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` in the TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Platform config file location, if one exists
///
/// Linux checks `~/.config/dreams/config.toml` then `/etc/dreams/config.toml`.
pub fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("dreams").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/dreams/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/dreams
        dirs::data_local_dir()
            .map(|d| d.join("dreams"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/dreams"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("dreams"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/dreams"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("dreams"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\dreams"))
    } else {
        PathBuf::from("./dreams_data")
    }
}
