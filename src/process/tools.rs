//! Argument builders for the external tools provisioning drives.

use std::path::{Path, PathBuf};

use super::CommandSpec;

/// Label compose puts on every container it starts.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// One compose project: its files and `--project-name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    prefix: String,
    files: Vec<PathBuf>,
    project_name: Option<String>,
}

impl ComposeProject {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            files: Vec::new(),
            project_name: None,
        }
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.project_name.as_deref()
    }

    pub fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::from_prefix(&self.prefix);
        for file in &self.files {
            spec = spec.arg("-f").arg(file.display().to_string());
        }
        if let Some(name) = &self.project_name {
            spec = spec.arg(format!("--project-name={name}"));
        }
        spec.args(args)
    }

    pub fn up_detached(&self) -> CommandSpec {
        self.command(["up", "-d"])
    }

    pub fn up_service(&self, service: &str) -> CommandSpec {
        self.command(["up", "-d", service])
    }

    pub fn build_no_cache(&self) -> CommandSpec {
        self.command(["build", "--no-cache"])
    }

    pub fn run_service(&self, service: &str) -> CommandSpec {
        self.command(["run", service])
    }

    /// `exec -T <service> <args...>`; no TTY so output can be captured.
    pub fn exec<I, S>(&self, service: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(["exec", "-T", service]).args(args)
    }

    pub fn ps_quiet(&self) -> CommandSpec {
        self.command(["ps", "-q"])
    }

    pub fn port(&self, service: &str, port: u16) -> CommandSpec {
        self.command(["port".to_string(), service.to_string(), port.to_string()])
    }

    pub fn restart(&self) -> CommandSpec {
        self.command(["restart"])
    }

    pub fn stop(&self) -> CommandSpec {
        self.command(["stop"])
    }
}

/// Running container ids, optionally limited to one compose project.
pub fn docker_ps_ids(project: Option<&str>) -> CommandSpec {
    let spec = CommandSpec::new("docker").args(["ps", "-q"]);
    match project {
        Some(name) => spec
            .arg("--filter")
            .arg(format!("label={COMPOSE_PROJECT_LABEL}={name}")),
        None => spec,
    }
}

pub fn docker_kill<I, S>(ids: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("docker").arg("kill").args(ids)
}

pub fn docker_port(container: &str, port: u16) -> CommandSpec {
    CommandSpec::new("docker").args(["port".to_string(), container.to_string(), port.to_string()])
}

/// `git clone <url> <dest>` run from `cwd`.
pub fn git_clone(url: &str, dest: &Path, cwd: &Path) -> CommandSpec {
    CommandSpec::new("git")
        .args(["clone".to_string(), url.to_string(), dest.display().to_string()])
        .current_dir(cwd)
}

pub fn drush_make(makefile: &Path, build_dir: &Path, cwd: &Path) -> CommandSpec {
    CommandSpec::new("drush")
        .args([
            "make".to_string(),
            makefile.display().to_string(),
            build_dir.display().to_string(),
        ])
        .current_dir(cwd)
}

pub const DRUPAL_PROJECT_TEMPLATE: &str = "drupal-composer/drupal-project:8.x-dev";

pub fn composer_create_project(dest: &Path, cwd: &Path) -> CommandSpec {
    CommandSpec::new("composer")
        .args([
            "create-project".to_string(),
            DRUPAL_PROJECT_TEMPLATE.to_string(),
            dest.display().to_string(),
            "--stability".to_string(),
            "dev".to_string(),
            "--no-interaction".to_string(),
        ])
        .current_dir(cwd)
}

pub fn composer_install(app_root: &Path) -> CommandSpec {
    CommandSpec::new("composer")
        .arg("install")
        .current_dir(app_root)
}

/// Platform URL opener.
pub fn open_url(os: &str, url: &str) -> CommandSpec {
    let program = if os == "macos" { "open" } else { "xdg-open" };
    CommandSpec::new(program).arg(url)
}
