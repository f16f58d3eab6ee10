//! `redis:ping`: check the app's redis answers.

use crate::build::context::BuildContext;
use crate::containers::{app_project, containers_running};
use crate::error::Result;
use crate::process::{FailurePolicy, ProcessRunner};

/// The reply, or `None` when the app's containers are not running.
pub fn ping(ctx: &BuildContext, runner: &dyn ProcessRunner) -> Result<Option<String>> {
    ctx.console.section("REDIS ::: Ping");
    let project = app_project(ctx);
    if !containers_running(runner, &project)? {
        ctx.console
            .warning("App containers are not running; start them with build:init");
        return Ok(None);
    }

    let output = runner.run(
        &project.exec("redis", ["redis-cli", "ping"]),
        FailurePolicy::FailSoft,
    )?;
    let reply = output.combined();
    if output.success {
        ctx.console.info(&reply);
    } else {
        ctx.console.error(&format!("redis did not answer: {reply}"));
    }
    Ok(Some(reply))
}
