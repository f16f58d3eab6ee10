//! Compose bring-up for one app, ending with a reachable database.
//!
//! Local tiers (Basic, Full) first run the file-sync sidecar until it reports
//! that propagation finished. The sidecar never exits on its own, so its
//! project's containers are killed before the stack starts for real. Shared
//! tiers (Prod, Stage) start the proxy and data services, then build and start
//! a compose project named `<systemAppName>--<buildId>` so builds coexist.
//!
//! Concurrent sessions for the same app are not guarded against: they share
//! a project name and will interfere.

mod mysql;
pub mod readiness;

use std::fmt;

use crate::build::context::BuildContext;
use crate::cancel::CancelToken;
use crate::config::RequirementsTier;
use crate::error::{ProvisionError, Result};
use crate::process::tools::{self, ComposeProject};
use crate::process::{CommandSpec, FailurePolicy, ProcessRunner};
use readiness::{parse_port, wait_ready, DbTarget, ReadinessProbe, WaitPolicy, DEFAULT_DB_PORT};

/// Output lines that mean the sync sidecar finished its first pass.
pub const SYNC_MARKERS: [&str; 2] = ["Synchronization complete", "finished propagating changes"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContainerState {
    Down,
    SyncBarrierRunning,
    Up,
    WaitingForDatabase,
    Ready,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The compose project the app's own services run in.
pub fn app_project(ctx: &BuildContext) -> ComposeProject {
    let sys = ctx.system_app_name();
    let name = if ctx.config.tier.is_local() {
        sys
    } else {
        format!("{sys}--{}", ctx.compose_build())
    };
    ComposeProject::new(ctx.settings.compose_command.clone())
        .file(ctx.docker_dir().join("docker-compose.yml"))
        .project_name(name)
}

/// Whether `project` has any running container (`compose ps -q` prints ids).
pub fn containers_running(runner: &dyn ProcessRunner, project: &ComposeProject) -> Result<bool> {
    let ps = runner.run(&project.ps_quiet(), FailurePolicy::FailSoft)?;
    Ok(ps.success && !ps.stdout.trim().is_empty())
}

fn aux_project(ctx: &BuildContext, file: &str, name: String) -> ComposeProject {
    ComposeProject::new(ctx.settings.compose_command.clone())
        .file(ctx.docker_dir().join(file))
        .project_name(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringUp {
    pub project: String,
    pub target: DbTarget,
    pub probe_attempts: u32,
}

pub struct ContainerOrchestrator<'a> {
    ctx: &'a BuildContext,
    runner: &'a dyn ProcessRunner,
    probe: &'a dyn ReadinessProbe,
    cancel: CancelToken,
    state: ContainerState,
    history: Vec<ContainerState>,
}

impl<'a> ContainerOrchestrator<'a> {
    pub fn new(
        ctx: &'a BuildContext,
        runner: &'a dyn ProcessRunner,
        probe: &'a dyn ReadinessProbe,
        cancel: CancelToken,
    ) -> Self {
        Self {
            ctx,
            runner,
            probe,
            cancel,
            state: ContainerState::Down,
            history: vec![ContainerState::Down],
        }
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[ContainerState] {
        &self.history
    }

    fn enter(&mut self, state: ContainerState) {
        tracing::info!(from = %self.state, to = %state, "containers");
        self.state = state;
        self.history.push(state);
    }

    pub fn bring_up(&mut self) -> Result<BringUp> {
        self.ctx
            .console
            .note("Creating and configure DockerDrupal containers.... This may take a moment....");
        let project = app_project(self.ctx);

        let result = self.start_and_wait(&project);
        if let Err(ProvisionError::Cancelled { .. }) = &result {
            self.ctx.console.warning("Cancelled; stopping containers");
            if let Err(e) = self.runner.run_cleanup(&project.stop()) {
                tracing::warn!(error = %e, "stop after cancel failed");
            }
        }
        result
    }

    fn start_and_wait(&mut self, project: &ComposeProject) -> Result<BringUp> {
        let ctx = self.ctx;
        let tier = ctx.config.tier;
        let port = match tier {
            RequirementsTier::Basic | RequirementsTier::Full => {
                self.local_up(project)?;
                DEFAULT_DB_PORT
            }
            RequirementsTier::Prod => {
                ctx.console.section("Docker ::: Build prod environment");
                let proxy = aux_project(ctx, "docker-compose-nginx-proxy.yml", "proxy".into());
                let data = aux_project(ctx, "docker-compose-data.yml", "data".into());
                self.run(&proxy.up_detached())?;
                self.run(&data.up_detached())?;
                self.shared_up(project)?;
                self.discover_port(&tools::docker_port("mysql", DEFAULT_DB_PORT))?
            }
            RequirementsTier::Stage => {
                ctx.console.section("Docker ::: Build staging environment");
                let data = aux_project(
                    ctx,
                    "docker-compose-data.yml",
                    format!("{}_data", ctx.system_app_name()),
                );
                self.run(&data.up_detached())?;
                self.shared_up(project)?;
                self.discover_port(&data.port("db", DEFAULT_DB_PORT))?
            }
        };

        let target = DbTarget::for_tier(tier, port);
        self.enter(ContainerState::WaitingForDatabase);
        ctx.console.warning("Waiting for mySQL service.");
        let settings = &ctx.settings;
        let policy = WaitPolicy {
            timeout: settings.readiness_timeout(),
            interval: settings.readiness_interval(),
            max_interval: settings.readiness_max_interval(),
        };
        let probe_attempts = wait_ready(self.probe, &target, &policy, &self.cancel)?;

        if !tier.is_local() && !self.cancel.sleep(settings.settle_delay()) {
            return Err(ProvisionError::Cancelled {
                stage: "database settle delay".to_string(),
            });
        }

        ctx.console.success("mySQL CONNECTED");
        self.enter(ContainerState::Ready);
        Ok(BringUp {
            project: project.name().unwrap_or_default().to_string(),
            target,
            probe_attempts,
        })
    }

    fn local_up(&mut self, project: &ComposeProject) -> Result<()> {
        self.enter(ContainerState::SyncBarrierRunning);
        let hit = self.runner.run_until_marker(
            &project.run_service("app"),
            &SYNC_MARKERS,
            self.ctx.settings.sync_timeout(),
        )?;
        tracing::info!(marker = %hit.marker, attempts = hit.attempts, "sync barrier passed");

        let ps = self
            .runner
            .run(&tools::docker_ps_ids(project.name()), FailurePolicy::FailSoft)?;
        let ids: Vec<&str> = ps
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if !ids.is_empty() {
            self.run(&tools::docker_kill(ids))?;
        }

        self.run(&project.up_detached())?;
        self.enter(ContainerState::Up);
        Ok(())
    }

    fn shared_up(&mut self, project: &ComposeProject) -> Result<()> {
        self.run(&project.build_no_cache())?;
        self.run(&project.up_service("app"))?;
        self.run(&project.up_detached())?;
        self.enter(ContainerState::Up);
        Ok(())
    }

    fn discover_port(&self, spec: &CommandSpec) -> Result<u16> {
        let output = self.runner.run(spec, FailurePolicy::FailSoft)?;
        Ok(parse_port(&output.stdout).unwrap_or_else(|| {
            self.ctx.console.warning(&format!(
                "could not read database port from `{}`; assuming {DEFAULT_DB_PORT}",
                output.command
            ));
            DEFAULT_DB_PORT
        }))
    }

    fn run(&self, spec: &CommandSpec) -> Result<()> {
        self.runner.run(spec, FailurePolicy::FailSoft).map(|_| ())
    }
}
