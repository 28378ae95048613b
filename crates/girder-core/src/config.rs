//! Configuration file support.
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/girder/config.toml`
//! - macOS: `~/Library/Application Support/girder/config.toml`
//! - Windows: `%APPDATA%\girder\config.toml`
//!
//! Every field has a default, so an empty file is a valid configuration.

use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Well-known name of the bootstrap program.
pub const DEFAULT_BOOTSTRAP: &str = "bootstrap.rhai";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Virtual filesystem setup
    pub vfs: VfsSettings,
    /// Interpreter run loop settings
    pub interpreter: InterpreterSettings,
}

/// Virtual filesystem settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsSettings {
    /// Mount the base directory at the virtual root.
    pub mount_base_dir: bool,
    /// Base directory; the current directory when unset.
    pub base_dir: Option<PathBuf>,
    /// Extra directories appended to the search path.
    pub directories: Vec<PathBuf>,
    /// Tar archives prepended to the search path (searched first).
    pub archives: Vec<PathBuf>,
    /// Directory that saves are written into.
    pub write_dir: Option<PathBuf>,
    /// Also make the write directory readable through the search path.
    pub mount_write_dir: bool,
    /// Virtual location of the write directory when it is mounted.
    pub write_mount_point: String,
}

impl Default for VfsSettings {
    fn default() -> Self {
        Self {
            mount_base_dir: true,
            base_dir: None,
            directories: Vec::new(),
            archives: Vec::new(),
            write_dir: Some(PathBuf::from("save")),
            mount_write_dir: false,
            write_mount_point: "writedir".to_string(),
        }
    }
}

/// Interpreter run loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterSettings {
    /// Virtual path of the bootstrap program.
    pub bootstrap: String,
    /// Nominal frames per second; the frame delta handed to extensions.
    pub frame_rate: f64,
    /// Sleep out the rest of each nominal frame instead of spinning.
    pub pace_frames: bool,
    /// Maximum script call depth.
    pub max_call_levels: usize,
    /// Maximum script expression nesting.
    pub max_expr_depth: usize,
}

impl Default for InterpreterSettings {
    fn default() -> Self {
        Self {
            bootstrap: DEFAULT_BOOTSTRAP.to_string(),
            frame_rate: 60.0,
            pace_frames: true,
            max_call_levels: 1024,
            max_expr_depth: 1024,
        }
    }
}

impl InterpreterSettings {
    /// Nominal frame delta in seconds.
    pub fn frame_delta(&self) -> f64 {
        if self.frame_rate > 0.0 && self.frame_rate.is_finite() {
            1.0 / self.frame_rate
        } else {
            1.0 / 60.0
        }
    }
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(Error::Config(format!("Config file not found at {:?}", path)))
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_from_or_default(&path),
            Err(e) => {
                log::warn!("[config] {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Load `path` if it exists. A file that cannot be read or parsed is
    /// logged and replaced by the defaults.
    pub fn load_from_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::load_from(path).unwrap_or_else(|e| {
            log::error!("[config] ignoring {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Save configuration to a file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content).map_err(|e| Error::io(path, e))
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "girder") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Create a default config file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let content = r#"# girder configuration file

[vfs]
# Mount the base directory (current directory unless base_dir is set) at /
mount_base_dir = true
# base_dir = "/path/to/project"

# Extra directories searched after the base directory
directories = []

# Tar archives searched before everything else
archives = []

# Saves are written here
write_dir = "save"

# Make saved files readable under /writedir
mount_write_dir = false
write_mount_point = "writedir"

[interpreter]
# Bootstrap program, resolved through the virtual filesystem
bootstrap = "bootstrap.rhai"

# Nominal frame rate; extensions receive 1 / frame_rate as their delta
frame_rate = 60.0

# Sleep out the remainder of each frame instead of spinning
pace_frames = true

max_call_levels = 1024
max_expr_depth = 1024
"#;

        fs::write(&path, content).map_err(|e| Error::io(&path, e))?;
        Ok(path)
    }
}
