//! `docker:restart`: restart the containers described by the compose file in
//! the current directory.

use std::path::Path;

use crate::config::ToolSettings;
use crate::console::Console;
use crate::error::Result;
use crate::process::tools::ComposeProject;
use crate::process::{FailurePolicy, ProcessRunner};

pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Returns false when there was no compose file to restart from.
pub fn restart(
    dir: &Path,
    settings: &ToolSettings,
    console: &Console,
    runner: &dyn ProcessRunner,
) -> Result<bool> {
    console.section("RESTARTING CONTAINERS");
    if !dir.join(COMPOSE_FILE).is_file() {
        console.warning(&format!("{COMPOSE_FILE} : Not Found"));
        return Ok(false);
    }

    let spec = ComposeProject::new(settings.compose_command.clone())
        .restart()
        .current_dir(dir);
    let output = runner.run(&spec, FailurePolicy::FailFast)?;
    let printed = output.combined();
    if !printed.is_empty() {
        console.info(&printed);
    }
    Ok(true)
}
