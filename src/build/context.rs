//! Build context passed explicitly into every component.

use std::path::{Path, PathBuf};

use crate::build::layout::AppLayout;
use crate::builds::BuildId;
use crate::config::{AppConfig, ToolSettings};
use crate::console::Console;

/// Everything one provisioning session needs to know about the app it is
/// building. Constructed once by the command and borrowed by components.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Directory holding `.config.yml`; `app/` and `docker_<name>/` live here.
    pub project_dir: PathBuf,
    pub config: AppConfig,
    pub settings: ToolSettings,
    /// Identifier minted for this session. Names the D7 build artifact.
    pub session_build: BuildId,
    pub console: Console,
}

impl BuildContext {
    pub fn new(
        project_dir: PathBuf,
        config: AppConfig,
        settings: ToolSettings,
        console: Console,
    ) -> Self {
        Self {
            project_dir,
            config,
            settings,
            session_build: BuildId::now(),
            console,
        }
    }

    pub fn with_session_build(mut self, id: BuildId) -> Self {
        self.session_build = id;
        self
    }

    pub fn layout(&self) -> AppLayout {
        AppLayout::new(self.project_dir.join("app"))
    }

    pub fn system_app_name(&self) -> String {
        self.config.system_app_name()
    }

    /// Build id used to name per-build compose projects: the last build
    /// recorded in the config, else this session's id.
    pub fn compose_build(&self) -> &BuildId {
        self.config.current_build().unwrap_or(&self.session_build)
    }

    /// `docker_<systemAppName>/` holding the app's compose files.
    pub fn docker_dir(&self) -> PathBuf {
        self.project_dir
            .join(format!("docker_{}", self.system_app_name()))
    }

    pub fn bundle(&self, name: &str) -> PathBuf {
        self.settings.bundle_dir(name)
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }
}
