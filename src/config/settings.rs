//! Tool-level settings, layered: defaults < settings file < environment.
//!
//! CLI flags are applied last by the binary through [`SettingsOverrides`].

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProvisionError, Result};

pub const SETTINGS_ENV: &str = "DRUDOCK_SETTINGS";
pub const UTIL_ROOT_ENV: &str = "DRUDOCK_UTIL_ROOT";
pub const COMPOSE_ENV: &str = "DRUDOCK_COMPOSE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    /// Root holding `bundles/{default,d7,d8,d8prod,behat}`.
    pub utility_root: PathBuf,
    /// Compose binary, e.g. `docker-compose` or `docker compose`.
    pub compose_command: String,
    pub process_timeout_secs: u64,
    pub sync_timeout_secs: u64,
    pub readiness_timeout_secs: u64,
    pub readiness_interval_ms: u64,
    pub readiness_max_interval_ms: u64,
    pub settle_delay_secs: u64,
    pub strict_stages: bool,
    pub fetch_fail_fast: bool,
    pub install_helpers: bool,
    pub open_browser: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            utility_root: default_utility_root(),
            compose_command: "docker-compose".to_string(),
            process_timeout_secs: 3600,
            sync_timeout_secs: 1800,
            readiness_timeout_secs: 300,
            readiness_interval_ms: 1000,
            readiness_max_interval_ms: 5000,
            settle_delay_secs: 2,
            strict_stages: false,
            fetch_fail_fast: false,
            install_helpers: true,
            open_browser: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsToml {
    utility_root: Option<PathBuf>,
    compose_command: Option<String>,
    process_timeout_secs: Option<u64>,
    sync_timeout_secs: Option<u64>,
    readiness_timeout_secs: Option<u64>,
    readiness_interval_ms: Option<u64>,
    readiness_max_interval_ms: Option<u64>,
    settle_delay_secs: Option<u64>,
    strict_stages: Option<bool>,
    fetch_fail_fast: Option<bool>,
    install_helpers: Option<bool>,
    open_browser: Option<bool>,
}

/// Values given on the command line; `None` leaves the lower layer alone.
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    pub utility_root: Option<PathBuf>,
    pub readiness_timeout_secs: Option<u64>,
    pub strict_stages: bool,
    pub no_open: bool,
}

impl ToolSettings {
    /// Resolve settings from the default file location and the environment.
    pub fn load() -> Result<Self> {
        let path = env::var_os(SETTINGS_ENV)
            .map(PathBuf::from)
            .or_else(default_settings_path);
        let mut settings = match path {
            Some(path) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| ProvisionError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let parsed: SettingsToml = toml::from_str(&raw).map_err(|e| ProvisionError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut settings = Self::default();
        if let Some(v) = parsed.utility_root {
            settings.utility_root = v;
        }
        if let Some(v) = parsed.compose_command {
            settings.compose_command = v;
        }
        if let Some(v) = parsed.process_timeout_secs {
            settings.process_timeout_secs = v;
        }
        if let Some(v) = parsed.sync_timeout_secs {
            settings.sync_timeout_secs = v;
        }
        if let Some(v) = parsed.readiness_timeout_secs {
            settings.readiness_timeout_secs = v;
        }
        if let Some(v) = parsed.readiness_interval_ms {
            settings.readiness_interval_ms = v;
        }
        if let Some(v) = parsed.readiness_max_interval_ms {
            settings.readiness_max_interval_ms = v;
        }
        if let Some(v) = parsed.settle_delay_secs {
            settings.settle_delay_secs = v;
        }
        if let Some(v) = parsed.strict_stages {
            settings.strict_stages = v;
        }
        if let Some(v) = parsed.fetch_fail_fast {
            settings.fetch_fail_fast = v;
        }
        if let Some(v) = parsed.install_helpers {
            settings.install_helpers = v;
        }
        if let Some(v) = parsed.open_browser {
            settings.open_browser = v;
        }

        if settings.readiness_interval_ms == 0 {
            return Err(ProvisionError::Settings {
                path: path.to_path_buf(),
                reason: "readiness_interval_ms must be greater than zero".to_string(),
            });
        }
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Some(root) = env::var_os(UTIL_ROOT_ENV) {
            self.utility_root = PathBuf::from(root);
        }
        if let Ok(compose) = env::var(COMPOSE_ENV) {
            if !compose.trim().is_empty() {
                self.compose_command = compose.trim().to_string();
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(root) = &overrides.utility_root {
            self.utility_root = root.clone();
        }
        if let Some(secs) = overrides.readiness_timeout_secs {
            self.readiness_timeout_secs = secs;
        }
        if overrides.strict_stages {
            self.strict_stages = true;
        }
        if overrides.no_open {
            self.open_browser = false;
        }
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn readiness_max_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_max_interval_ms.max(self.readiness_interval_ms))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn bundle_dir(&self, name: &str) -> PathBuf {
        self.utility_root.join("bundles").join(name)
    }
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("drudock").join("settings.toml"))
}

fn default_utility_root() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("drudock"))
        .unwrap_or_else(|| PathBuf::from("/usr/local/share/drudock"))
}
