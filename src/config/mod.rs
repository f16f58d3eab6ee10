//! Per-project app configuration (`.config.yml`).
//!
//! The file is owned by the surrounding tool's init/update flows; provisioning
//! only reads it. Loose strings from the file are parsed into closed enums
//! here so the rest of the crate matches on variants instead of tags.

pub mod settings;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::builds::BuildId;
use crate::error::{ProvisionError, Result};

pub use settings::ToolSettings;

/// File name of the project config, looked up in the project directory.
pub const CONFIG_FILENAME: &str = ".config.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppType {
    Default,
    D7,
    D8,
}

impl AppType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DEFAULT" => Some(AppType::Default),
            "D7" => Some(AppType::D7),
            "D8" => Some(AppType::D8),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppType::Default => "DEFAULT",
            AppType::D7 => "D7",
            AppType::D8 => "D8",
        }
    }

    /// Human label used in the final "opening" notice.
    pub fn label(&self) -> &'static str {
        match self {
            AppType::Default => "Default APP",
            AppType::D7 => "Drupal 7 base Installation",
            AppType::D8 => "Drupal 8 base Installation",
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceMode {
    Git,
    Local,
    None,
}

impl SourceMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "git" => Some(SourceMode::Git),
            "local" => Some(SourceMode::Local),
            "none" | "new" | "" => Some(SourceMode::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementsTier {
    Basic,
    Full,
    Prod,
    Stage,
}

impl RequirementsTier {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(RequirementsTier::Basic),
            "full" => Some(RequirementsTier::Full),
            "prod" => Some(RequirementsTier::Prod),
            "stage" => Some(RequirementsTier::Stage),
            _ => None,
        }
    }

    /// Basic and Full run on the developer's machine; Prod and Stage run
    /// on shared hosts and must never get world-writable permissions.
    pub fn is_local(&self) -> bool {
        matches!(self, RequirementsTier::Basic | RequirementsTier::Full)
    }
}

impl fmt::Display for RequirementsTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequirementsTier::Basic => "Basic",
            RequirementsTier::Full => "Full",
            RequirementsTier::Prod => "Prod",
            RequirementsTier::Stage => "Stage",
        };
        f.write_str(name)
    }
}

/// A required config field that is absent or empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    AppName,
    AppType,
    Host,
    Repo,
}

impl MissingField {
    /// Key as written in `.config.yml`.
    pub fn key(&self) -> &'static str {
        match self {
            MissingField::AppName => "appname",
            MissingField::AppType => "apptype",
            MissingField::Host => "host",
            MissingField::Repo => "repo",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigYaml {
    appname: Option<String>,
    apptype: Option<String>,
    host: Option<String>,
    appsrc: Option<String>,
    repo: Option<String>,
    reqs: Option<String>,
    #[serde(default)]
    builds: Option<Vec<String>>,
}

/// Config as read from disk, before required fields are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub app_name: Option<String>,
    pub app_type: Option<AppType>,
    pub host: Option<String>,
    pub source: SourceMode,
    pub repo_url: Option<String>,
    pub tier: RequirementsTier,
    pub builds: Vec<BuildId>,
}

/// Validated config: every field provisioning depends on is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub app_name: String,
    pub app_type: AppType,
    pub host: String,
    pub source: SourceMode,
    pub repo_url: Option<String>,
    pub tier: RequirementsTier,
    pub builds: Vec<BuildId>,
}

impl AppConfig {
    /// Lowercased app name with spaces removed. Always derived, never stored.
    pub fn system_app_name(&self) -> String {
        system_app_name(&self.app_name)
    }

    /// The last build recorded in the config, if any.
    pub fn current_build(&self) -> Option<&BuildId> {
        self.builds.last()
    }
}

pub fn system_app_name(app_name: &str) -> String {
    app_name.to_lowercase().replace(' ', "")
}

/// Reads the project config from a project directory.
pub struct ConfigStore {
    project_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.project_dir.join(CONFIG_FILENAME)
    }

    pub fn exists(&self) -> bool {
        self.config_path().is_file()
    }

    /// Load the config, failing with `ConfigMissing` when there is no file.
    pub fn load(&self) -> Result<LoadedConfig> {
        let path = self.config_path();
        if !path.is_file() {
            return Err(ProvisionError::ConfigMissing { path });
        }
        let raw = fs::read_to_string(&path).map_err(|e| ProvisionError::fs("reading", &path, e))?;
        parse_config(&path, &raw)
    }

    /// Load and require every field provisioning needs.
    pub fn load_validated(&self) -> Result<AppConfig> {
        self.load()?.require()
    }
}

impl LoadedConfig {
    pub fn validate(&self) -> Vec<MissingField> {
        let mut missing = Vec::new();
        if self.app_name.is_none() {
            missing.push(MissingField::AppName);
        }
        if self.app_type.is_none() {
            missing.push(MissingField::AppType);
        }
        if self.host.is_none() {
            missing.push(MissingField::Host);
        }
        if self.source == SourceMode::Git && self.repo_url.is_none() {
            missing.push(MissingField::Repo);
        }
        missing
    }

    pub fn require(self) -> Result<AppConfig> {
        let missing = self.validate();
        match (self.app_name, self.app_type, self.host) {
            (Some(app_name), Some(app_type), Some(host)) if missing.is_empty() => Ok(AppConfig {
                app_name,
                app_type,
                host,
                source: self.source,
                repo_url: self.repo_url,
                tier: self.tier,
                builds: self.builds,
            }),
            _ => Err(ProvisionError::ConfigIncomplete { missing }),
        }
    }
}

fn parse_config(path: &Path, raw: &str) -> Result<LoadedConfig> {
    let parsed: ConfigYaml = if raw.trim().is_empty() {
        ConfigYaml::default()
    } else {
        serde_yaml::from_str(raw).map_err(|e| ProvisionError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };

    let invalid = |field: &str, value: &str, expected: &str| ProvisionError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: format!("unsupported {field} '{value}' (expected {expected})"),
    };

    let app_type = match non_empty(parsed.apptype) {
        Some(value) => Some(
            AppType::parse(&value).ok_or_else(|| invalid("apptype", &value, "D7, D8 or DEFAULT"))?,
        ),
        None => None,
    };
    let source = match parsed.appsrc {
        Some(value) => SourceMode::parse(&value)
            .ok_or_else(|| invalid("appsrc", &value, "Git, Local or None"))?,
        None => SourceMode::None,
    };
    let tier = match non_empty(parsed.reqs) {
        Some(value) => RequirementsTier::parse(&value)
            .ok_or_else(|| invalid("reqs", &value, "Basic, Full, Prod or Stage"))?,
        None => RequirementsTier::Basic,
    };
    let builds = parsed
        .builds
        .unwrap_or_default()
        .into_iter()
        .filter_map(|id| BuildId::from_config(&id))
        .collect();

    Ok(LoadedConfig {
        path: path.to_path_buf(),
        app_name: non_empty(parsed.appname),
        app_type,
        host: non_empty(parsed.host),
        source,
        repo_url: non_empty(parsed.repo),
        tier,
        builds,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
