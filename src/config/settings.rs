//! Engine settings shared by every project.
//!
//! Read from `~/.config/riptide/config.yml` when present, then overridden by
//! `RIPTIDE_*` environment variables.

use super::duration::parse_duration_string;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HEALTH_CHECK_DELAY: Duration = Duration::from_secs(3);
const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(10);
const DEFAULT_MAX_PARALLEL: usize = 8;
const DEFAULT_LOG_TAIL_LINES: usize = 100;

pub const ENV_HEALTH_CHECK_DELAY: &str = "RIPTIDE_HEALTH_CHECK_DELAY";
pub const ENV_MAX_PARALLEL: &str = "RIPTIDE_MAX_PARALLEL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Wait between starting a container and checking it is still alive.
    pub health_check_delay: String,

    /// Upper bound on concurrently running service workers.
    pub max_parallel: usize,

    /// Log lines captured when a container crashes on start.
    pub log_tail_lines: usize,

    pub stop_grace_period: String,

    /// Run hook commands as the invoking user instead of the image default.
    pub run_as_current_user: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            health_check_delay: "3s".to_string(),
            max_parallel: DEFAULT_MAX_PARALLEL,
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
            stop_grace_period: "10s".to_string(),
            run_as_current_user: true,
        }
    }
}

impl EngineSettings {
    /// Default settings file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("riptide").join("config.yml"))
    }

    /// Load settings from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut settings = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read settings file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let settings: EngineSettings = serde_yaml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `RIPTIDE_*` overrides. The lookup is injected so tests do not
    /// have to mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(delay) = lookup(ENV_HEALTH_CHECK_DELAY) {
            self.health_check_delay = delay;
        }
        if let Some(max) = lookup(ENV_MAX_PARALLEL) {
            self.max_parallel = max.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a positive integer, got '{}'", ENV_MAX_PARALLEL, max))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if parse_duration_string(&self.health_check_delay).is_none() {
            return Err(Error::Config(format!(
                "Invalid health_check_delay '{}'",
                self.health_check_delay
            )));
        }
        if parse_duration_string(&self.stop_grace_period).is_none() {
            return Err(Error::Config(format!(
                "Invalid stop_grace_period '{}'",
                self.stop_grace_period
            )));
        }
        if self.max_parallel == 0 {
            return Err(Error::Config("max_parallel must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn health_check_delay(&self) -> Duration {
        parse_duration_string(&self.health_check_delay).unwrap_or(DEFAULT_HEALTH_CHECK_DELAY)
    }

    pub fn stop_grace_period(&self) -> Duration {
        parse_duration_string(&self.stop_grace_period).unwrap_or(DEFAULT_STOP_GRACE_PERIOD)
    }
}
