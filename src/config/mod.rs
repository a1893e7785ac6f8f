//! Configuration module for voxflow
//!
//! This module handles engine configuration:
//! - Execution settings (threads, splitting, abort polling, memory policy)
//! - Plan cache settings (whether, where and how rigorously plans are cached)
//! - Environment variable overrides
//!
//! # Config Location
//!
//! The configuration file lives in the platform config directory:
//! - **Linux**: `~/.config/voxflow/voxflow.toml`
//! - **macOS**: `~/Library/Application Support/voxflow/voxflow.toml`
//! - **Windows**: `%APPDATA%\voxflow\voxflow.toml`
//!
//! # Environment
//!
//! | Variable | Effect |
//! |---|---|
//! | `VOXFLOW_NUMBER_OF_THREADS` | default work items per generation |
//! | `VOXFLOW_PLAN_RIGOR` | `estimate`, `measure`, `patient` or `exhaustive` |
//! | `VOXFLOW_USE_WISDOM_CACHE` | `yes`, `on` or `1` enables the plan cache |
//! | `VOXFLOW_WISDOM_CACHE_BASE` | directory of the hardware-named cache file |
//! | `VOXFLOW_WISDOM_CACHE_FILE` | explicit cache file |
//!
//! # Example
//!
//! ```ignore
//! use voxflow::config::EngineConfig;
//!
//! let mut config = EngineConfig::load_or_default();
//! config.execution.number_of_threads = 4;
//! config.save(EngineConfig::default_path().unwrap())?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, VoxflowError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config and cache directories
pub const APP_ID: &str = "voxflow";

/// Config filename
pub const CONFIG_FILE: &str = "voxflow.toml";

/// Upper bound on work items per generation
pub const MAX_THREADS: usize = 128;

pub const ENV_NUMBER_OF_THREADS: &str = "VOXFLOW_NUMBER_OF_THREADS";
pub const ENV_PLAN_RIGOR: &str = "VOXFLOW_PLAN_RIGOR";
pub const ENV_USE_WISDOM_CACHE: &str = "VOXFLOW_USE_WISDOM_CACHE";
pub const ENV_WISDOM_CACHE_BASE: &str = "VOXFLOW_WISDOM_CACHE_BASE";
pub const ENV_WISDOM_CACHE_FILE: &str = "VOXFLOW_WISDOM_CACHE_FILE";

// ==================== Defaults ====================

/// Threads the hardware offers, clamped to `1..=MAX_THREADS`
pub fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_THREADS)
}

/// Default work items per generation: `VOXFLOW_NUMBER_OF_THREADS` if it
/// holds a positive number, the hardware parallelism otherwise
pub fn default_number_of_threads() -> usize {
    env_threads().unwrap_or_else(available_threads)
}

fn env_threads() -> Option<usize> {
    let raw = std::env::var(ENV_NUMBER_OF_THREADS).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Some(n.min(MAX_THREADS)),
        _ => {
            tracing::warn!("Ignoring {}={:?}: expected a positive integer", ENV_NUMBER_OF_THREADS, raw);
            None
        }
    }
}

/// Whether an environment flag value means "enabled"
pub fn parse_env_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "on" | "1" | "true"
    )
}

// ==================== Config Paths ====================

/// Get the application config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Ensure the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| {
        VoxflowError::Config("Could not determine config directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            VoxflowError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    Ok(dir)
}

// ==================== Engine Config ====================

/// Complete engine configuration
///
/// Read once at startup; a running [`EngineContext`](crate::context::EngineContext)
/// never changes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// How pipelines execute
    pub execution: ExecutionSettings,

    /// Plan cache
    pub wisdom: WisdomSettings,
}

impl EngineConfig {
    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Defaults with the environment applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Load a configuration file, then apply the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VoxflowError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| {
            VoxflowError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.apply_env_overrides();
        config.validate()?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path().filter(|p| p.exists()) else {
            return Self::from_env();
        };
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load configuration, using defaults: {}", e);
            Self::from_env()
        })
    }

    /// Save to `path`, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| VoxflowError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            VoxflowError::Config(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    /// Apply `VOXFLOW_*` environment variables on top of the current values
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(threads) = env_threads() {
            self.execution.number_of_threads = threads;
        }

        if let Ok(raw) = std::env::var(ENV_PLAN_RIGOR) {
            match raw.parse::<PlanRigor>() {
                Ok(rigor) => self.wisdom.plan_rigor = rigor,
                Err(e) => tracing::warn!(
                    "Ignoring {}: {}; keeping {}",
                    ENV_PLAN_RIGOR,
                    e,
                    self.wisdom.plan_rigor
                ),
            }
        }

        if let Ok(raw) = std::env::var(ENV_USE_WISDOM_CACHE) {
            self.wisdom.use_cache = parse_env_flag(&raw);
        }

        if let Ok(base) = std::env::var(ENV_WISDOM_CACHE_BASE) {
            if !base.is_empty() {
                self.wisdom.cache_base = Some(PathBuf::from(base));
            }
        }

        if let Ok(file) = std::env::var(ENV_WISDOM_CACHE_FILE) {
            if !file.is_empty() {
                self.wisdom.cache_file = Some(PathBuf::from(file));
            }
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.execution.number_of_threads == 0 {
            return Err(VoxflowError::Config(
                "number_of_threads must be at least 1".to_string(),
            ));
        }
        if self.execution.number_of_threads > MAX_THREADS {
            return Err(VoxflowError::Config(format!(
                "number_of_threads must be at most {}",
                MAX_THREADS
            )));
        }
        if self.execution.abort_check_rows == 0 {
            return Err(VoxflowError::Config(
                "abort_check_rows must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== Tests ====================
