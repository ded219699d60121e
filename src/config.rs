use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.json";

/// Engine configuration.
///
/// Loaded from the user's config directory, then overridden by environment
/// variables. Every field has a default so a partial file is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Apply the conjunctive default rollup when declared rollup rules exist
    /// but none of them fire.
    pub default_rollup_fallback: bool,
    /// Run rollup after every progress notification.
    pub rollup_on_progress_update: bool,
    /// Check limit conditions before activating an activity.
    pub enforce_limit_conditions: bool,
    /// `tracing` filter used by the `ctest` binary when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_rollup_fallback: true,
            rollup_on_progress_update: true,
            enforce_limit_conditions: true,
            log_filter: "course_tester=info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the user's config directory and the environment.
    /// Falls back to defaults if the file doesn't exist or fails to parse, and
    /// hands the failure back so the caller can log it once logging is set up.
    pub fn load_or_default() -> (Self, Option<anyhow::Error>) {
        match default_config_path() {
            Ok(path) => Self::load_or_default_from(&path),
            Err(e) => (Self::default().with_env_overrides(), Some(e)),
        }
    }

    /// Load `path` if it exists. A missing file yields the defaults with no
    /// error; an unreadable or malformed one yields the defaults and the error.
    pub fn load_or_default_from(path: &Path) -> (Self, Option<anyhow::Error>) {
        let (config, error) = match Self::try_load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        };
        (config.with_env_overrides(), error)
    }

    /// Load configuration from an explicit file. A missing file is an error here.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config.with_env_overrides())
    }

    fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_flag("COURSE_TESTER_ROLLUP_FALLBACK") {
            self.default_rollup_fallback = v;
        }
        if let Some(v) = env_flag("COURSE_TESTER_AUTO_ROLLUP") {
            self.rollup_on_progress_update = v;
        }
        if let Some(v) = env_flag("COURSE_TESTER_ENFORCE_LIMITS") {
            self.enforce_limit_conditions = v;
        }
        if let Ok(filter) = std::env::var("COURSE_TESTER_LOG") {
            self.log_filter = filter;
        }
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `<config dir>/course-tester/config.json`.
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "course-tester")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(dirs.config_dir().join(CONFIG_FILE))
}
