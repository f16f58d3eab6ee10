//! Preflight checks for the host tools a build will invoke.
//!
//! Catches a missing `drush` or `composer` before the app tree is half
//! written instead of halfway through scaffolding.

use crate::build::context::BuildContext;
use crate::config::{AppConfig, AppType, SourceMode, ToolSettings};
use crate::error::{ProvisionError, Result};

/// A host command and how to get it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredTool {
    pub command: String,
    pub hint: &'static str,
}

impl RequiredTool {
    fn new(command: impl Into<String>, hint: &'static str) -> Self {
        Self {
            command: command.into(),
            hint,
        }
    }
}

/// Check if a command exists on PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Tools the selected app type, source mode and compose setup will run.
pub fn required_tools(config: &AppConfig, settings: &ToolSettings) -> Vec<RequiredTool> {
    let mut tools = vec![RequiredTool::new("docker", "install Docker")];
    let compose = settings
        .compose_command
        .split_whitespace()
        .next()
        .unwrap_or("docker-compose");
    if compose != "docker" {
        tools.push(RequiredTool::new(compose, "install Docker Compose"));
    }
    if config.source == SourceMode::Git {
        tools.push(RequiredTool::new("git", "install git"));
    }
    match config.app_type {
        AppType::D7 => tools.push(RequiredTool::new("drush", "install drush 8")),
        AppType::D8 => tools.push(RequiredTool::new("composer", "install composer")),
        AppType::Default => {}
    }
    tools
}

/// Report missing tools. With `strict_stages` a missing tool stops the build.
pub fn check_host_tools(ctx: &BuildContext) -> Result<Vec<RequiredTool>> {
    check_with(ctx, command_exists)
}

fn check_with(ctx: &BuildContext, exists: impl Fn(&str) -> bool) -> Result<Vec<RequiredTool>> {
    let missing: Vec<RequiredTool> = required_tools(&ctx.config, &ctx.settings)
        .into_iter()
        .filter(|tool| !exists(&tool.command))
        .collect();
    if missing.is_empty() {
        return Ok(missing);
    }

    let listing = missing
        .iter()
        .map(|t| format!("{} ({})", t.command, t.hint))
        .collect::<Vec<_>>()
        .join(", ");
    if ctx.settings.strict_stages {
        return Err(ProvisionError::StageGated {
            stage: "provisioning".to_string(),
            cause: format!("missing host tools: {listing}"),
        });
    }
    for tool in &missing {
        tracing::warn!(command = %tool.command, "host tool not found");
        ctx.console
            .warning(&format!("{} not found on PATH: {}", tool.command, tool.hint));
    }
    Ok(missing)
}
