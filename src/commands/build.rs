//! `build:init`: provision an app end to end.
//!
//! Config, then host checks, then the bundle state machine, then containers,
//! then the Drupal install. Fetch and scaffold failures do not stop the flow
//! unless `strict_stages` is set; they are listed before bring-up starts.

use std::path::PathBuf;

use super::Services;
use crate::build::context::BuildContext;
use crate::builds::BuildId;
use crate::bundle::{BundleInstaller, BundleReport};
use crate::config::{AppType, ConfigStore, ToolSettings};
use crate::console::Console;
use crate::containers::{BringUp, ContainerOrchestrator};
use crate::error::{ProvisionError, Result};
use crate::host;
use crate::install::{AppInstaller, InstallResult};
use crate::preflight::{self, RequiredTool};

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub project_dir: PathBuf,
    pub settings: ToolSettings,
    /// `--type`; must match the configured app type when given.
    pub requested_type: Option<AppType>,
    /// Overrides the build id minted for this session.
    pub session_build: Option<BuildId>,
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub missing_tools: Vec<RequiredTool>,
    pub bundle: BundleReport,
    pub containers: BringUp,
    pub install: InstallResult,
}

pub fn build_init(request: BuildRequest, console: Console, services: &Services<'_>) -> Result<BuildOutcome> {
    let store = ConfigStore::new(&request.project_dir);
    let config = store.load_validated()?;
    if let Some(requested) = request.requested_type {
        if requested != config.app_type {
            return Err(ProvisionError::AppTypeMismatch {
                configured: config.app_type.to_string(),
                requested: requested.to_string(),
            });
        }
    }

    let mut ctx = BuildContext::new(request.project_dir, config, request.settings, console);
    if let Some(id) = request.session_build {
        ctx = ctx.with_session_build(id);
    }
    tracing::info!(
        app = %ctx.system_app_name(),
        app_type = %ctx.config.app_type,
        tier = %ctx.config.tier,
        build = %ctx.session_build,
        "provisioning"
    );

    let missing_tools = preflight::check_host_tools(&ctx)?;
    host::check_host_entry(&ctx);

    let bundle = BundleInstaller::new(&ctx, services.runner, services.prompt).install()?;
    gate(&ctx, &bundle)?;

    let containers =
        ContainerOrchestrator::new(&ctx, services.runner, services.probe, services.cancel.clone())
            .bring_up()?;
    let install = AppInstaller::new(&ctx, services.runner).install()?;

    host::open_app(&ctx, services.runner);
    Ok(BuildOutcome {
        missing_tools,
        bundle,
        containers,
        install,
    })
}

/// Decide whether bring-up may run on a tree with recorded failures.
fn gate(ctx: &BuildContext, bundle: &BundleReport) -> Result<()> {
    let failures: Vec<&ProvisionError> = bundle
        .fetch_failures
        .iter()
        .chain(&bundle.scaffold_failures)
        .collect();
    if failures.is_empty() {
        return Ok(());
    }

    let listing = failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("\n  ");
    if ctx.settings.strict_stages {
        return Err(ProvisionError::StageGated {
            stage: "container bring-up".to_string(),
            cause: format!("{} earlier failure(s):\n  {listing}", failures.len()),
        });
    }
    tracing::warn!(failures = failures.len(), "continuing with an incomplete app tree");
    ctx.console.warning(&format!(
        "Continuing with {} earlier failure(s); the app tree may be incomplete:\n  {listing}",
        failures.len()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::containers::readiness::tests::ScriptedProbe;
    use crate::process::testing::FakeRunner;
    use crate::source::FixedAnswer;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const D8_BASIC: &str = "appname: My App\napptype: D8\nhost: myapp.local\nappsrc: Local\nreqs: Basic\n";

    fn request(project: &Path) -> BuildRequest {
        BuildRequest {
            project_dir: project.to_path_buf(),
            settings: ToolSettings {
                utility_root: project.join("util"),
                ..ToolSettings::default()
            },
            requested_type: None,
            session_build: BuildId::from_config("2017-03-04--05-06-07"),
        }
    }

    fn write_d8_bundle(project: &Path) {
        let bundle = project.join("util/bundles/d8");
        fs::create_dir_all(&bundle).unwrap();
        for name in [
            "composer.json",
            "development.services.yml",
            "services.yml",
            "robots.txt",
            "settings.php",
            "settings.local.php",
            "drushrc.php",
        ] {
            fs::write(bundle.join(name), format!("{name}\n")).unwrap();
        }
    }

    fn run(request: BuildRequest, runner: &FakeRunner) -> Result<BuildOutcome> {
        let probe = ScriptedProbe::failing(0);
        let services = Services {
            runner,
            prompt: &FixedAnswer("./web/".into()),
            probe: &probe,
            cancel: CancelToken::new(),
        };
        build_init(request, Console::quiet(), &services)
    }

    #[test]
    fn test_missing_config_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::new();

        let err = run(request(temp.path()), &runner).unwrap_err();

        assert!(matches!(err, ProvisionError::ConfigMissing { .. }));
        assert_eq!(err.exit_code(), 0);
        assert!(runner.calls().is_empty());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_type_mismatch_is_rejected_before_any_work() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".config.yml"), D8_BASIC).unwrap();
        let runner = FakeRunner::new();
        let mut req = request(temp.path());
        req.requested_type = Some(AppType::D7);

        let err = run(req, &runner).unwrap_err();

        assert!(matches!(err, ProvisionError::AppTypeMismatch { .. }));
        assert!(runner.calls().is_empty());
        assert!(!temp.path().join("app").exists());
    }

    #[test]
    fn test_d8_basic_end_to_end() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".config.yml"), D8_BASIC).unwrap();
        fs::create_dir_all(temp.path().join("app/web")).unwrap();
        write_d8_bundle(temp.path());
        let runner = FakeRunner::new().respond("ps -q", 0, "abc123\n");

        let outcome = run(request(temp.path()), &runner).unwrap();

        assert!(outcome.bundle.is_clean(), "{:?}", outcome.bundle.scaffold_failures);
        assert_eq!(outcome.containers.project, "myapp");
        assert!(outcome.install.installed);
        let barrier = runner.position("run app").unwrap();
        let up = runner.position("up -d").unwrap();
        let install = runner.position("drush site-install").unwrap();
        let open = runner.position("http://myapp.local").unwrap();
        assert!(barrier < up && up < install && install < open);
        assert!(temp.path().join("app/web/sites/default/settings.php").is_file());
    }

    #[test]
    fn test_incomplete_tree_continues_by_default() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".config.yml"), D8_BASIC).unwrap();
        fs::create_dir_all(temp.path().join("app/web")).unwrap();
        let runner = FakeRunner::new();

        let outcome = run(request(temp.path()), &runner).unwrap();

        assert!(!outcome.bundle.is_clean());
        assert_eq!(runner.count("up -d"), 1);
    }

    #[test]
    fn test_strict_stages_gate_bring_up() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".config.yml"), D8_BASIC).unwrap();
        fs::create_dir_all(temp.path().join("app/web")).unwrap();
        let runner = FakeRunner::new();
        let mut req = request(temp.path());
        req.settings.strict_stages = true;

        let err = run(req, &runner).unwrap_err();

        assert!(matches!(err, ProvisionError::StageGated { .. }));
        assert_eq!(runner.count("up -d"), 0);
        assert_eq!(runner.count("run app"), 0);
    }

    #[test]
    fn test_readiness_gates_install() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".config.yml"), D8_BASIC).unwrap();
        fs::create_dir_all(temp.path().join("app/web")).unwrap();
        write_d8_bundle(temp.path());
        let runner = FakeRunner::new().respond("ps -q", 0, "abc123\n");
        let probe = ScriptedProbe::failing(2);
        let services = Services {
            runner: &runner,
            prompt: &FixedAnswer("./web/".into()),
            probe: &probe,
            cancel: CancelToken::new(),
        };
        let mut req = request(temp.path());
        req.settings.readiness_interval_ms = 1;
        req.settings.readiness_max_interval_ms = 2;

        let outcome = build_init(req, Console::quiet(), &services).unwrap();

        assert_eq!(outcome.containers.probe_attempts, 3);
        assert_eq!(probe.attempts.get(), 3);
        assert_eq!(runner.count("site-install"), 1);
    }
}
