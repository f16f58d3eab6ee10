//! Obtaining the application codebase.
//!
//! Three strategies, picked from the source mode and what is on disk:
//! clone a Git repository (only when `app/` is absent), create a fresh D8
//! project with composer, or use the tree already in place.

use std::io::IsTerminal;
use std::path::Path;

use crate::build::context::BuildContext;
use crate::config::{AppType, MissingField, SourceMode};
use crate::error::{ProvisionError, Result};
use crate::executor::files;
use crate::process::{tools, FailurePolicy, ProcessRunner};

/// Asks where the web root lives inside a cloned repository.
pub trait Prompt {
    fn docroot(&self, default: &str) -> Result<String>;
}

/// Terminal prompt. Falls back to the default when stdin is not a TTY.
pub struct InteractivePrompt;

impl Prompt for InteractivePrompt {
    fn docroot(&self, default: &str) -> Result<String> {
        if !std::io::stdin().is_terminal() {
            tracing::info!(default, "stdin is not a terminal; using default docroot");
            return Ok(default.to_string());
        }
        dialoguer::Input::<String>::new()
            .with_prompt(
                "Please specify repository relative path to site docroot [./web/] [./docroot/] [./]",
            )
            .default(default.to_string())
            .interact_text()
            .map_err(|e| ProvisionError::Prompt(e.to_string()))
    }
}

/// Answer given up front (`--docroot`).
pub struct FixedAnswer(pub String);

impl Prompt for FixedAnswer {
    fn docroot(&self, _default: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Where the codebase came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRoot {
    /// Cloned from Git; `www` already points at `docroot`.
    Cloned { docroot: String },
    /// Created by `composer create-project`.
    Created,
    /// `app/` was already there and was left untouched.
    Existing,
    /// Nothing fetched; the bundle scaffolds a fresh tree.
    Absent,
}

impl SourceRoot {
    pub fn sets_docroot(&self) -> bool {
        matches!(self, SourceRoot::Cloned { .. })
    }
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub root: SourceRoot,
    /// Fail-soft command failures; later stages may still run.
    pub failures: Vec<ProvisionError>,
}

impl FetchOutcome {
    fn new(root: SourceRoot) -> Self {
        Self {
            root,
            failures: Vec::new(),
        }
    }
}

pub struct SourceFetcher<'a> {
    ctx: &'a BuildContext,
    runner: &'a dyn ProcessRunner,
    prompt: &'a dyn Prompt,
}

impl<'a> SourceFetcher<'a> {
    pub fn new(ctx: &'a BuildContext, runner: &'a dyn ProcessRunner, prompt: &'a dyn Prompt) -> Self {
        Self {
            ctx,
            runner,
            prompt,
        }
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::fail_fast(self.ctx.settings.fetch_fail_fast)
    }

    pub fn fetch(&self) -> Result<FetchOutcome> {
        let layout = self.ctx.layout();
        let config = &self.ctx.config;
        let mut failures = Vec::new();

        if config.source == SourceMode::Git && !layout.exists() {
            if let Some(outcome) = self.clone_repository(&mut failures)? {
                return Ok(outcome);
            }
        }

        if layout.exists() {
            return Ok(FetchOutcome {
                root: SourceRoot::Existing,
                failures,
            });
        }

        if config.app_type == AppType::D8 {
            self.ctx
                .console
                .note("Download and configure Drupal 8.... This may take a few minutes....");
            let spec = tools::composer_create_project(Path::new("app"), self.ctx.project_dir());
            let output = self.runner.run(&spec, self.policy())?;
            if !output.success {
                failures.push(output.to_error());
            }
            return Ok(FetchOutcome {
                root: SourceRoot::Created,
                failures,
            });
        }

        Ok(FetchOutcome {
            root: SourceRoot::Absent,
            failures,
        })
    }

    /// Returns `None` when the clone failed and the caller should fall back.
    fn clone_repository(&self, failures: &mut Vec<ProvisionError>) -> Result<Option<FetchOutcome>> {
        let config = &self.ctx.config;
        let Some(url) = config.repo_url.as_deref() else {
            return Err(ProvisionError::ConfigIncomplete {
                missing: vec![MissingField::Repo],
            });
        };

        self.ctx
            .console
            .info("Downloading app from repo.... This may take a few minutes....");
        let spec = tools::git_clone(url, Path::new("app"), self.ctx.project_dir());
        let output = self.runner.run(&spec, self.policy())?;
        let layout = self.ctx.layout();
        if !output.success || !layout.exists() {
            if output.success {
                tracing::warn!(%url, "clone reported success but app/ is missing");
            }
            failures.push(output.to_error());
            return Ok(None);
        }

        self.ctx.console.title("SET APP DOCROOT");
        let default = match config.app_type {
            AppType::D8 => "./web/",
            AppType::D7 | AppType::Default => "./",
        };
        let answer = self.prompt.docroot(default)?;
        let docroot = match answer.trim() {
            "" => default.to_string(),
            trimmed => trimmed.to_string(),
        };
        files::relink(Path::new(&docroot), &layout.www())?;

        let mut outcome = FetchOutcome::new(SourceRoot::Cloned { docroot });

        if config.app_type == AppType::D8 {
            let output = self
                .runner
                .run(&tools::composer_install(layout.root()), self.policy())?;
            if !output.success {
                outcome.failures.push(output.to_error());
            }
        }
        Ok(Some(outcome))
    }
}
