//! Drupal site install inside the running `php` container.
//!
//! Every tier shares one `drush site-install standard` invocation; the tier
//! only picks its parameters. Full adds a behat dependency update before the
//! install and, when helpers are enabled, a starter module set after it.

use crate::build::context::BuildContext;
use crate::config::{AppType, RequirementsTier};
use crate::containers::{app_project, containers_running};
use crate::error::{ProvisionError, Result};
use crate::process::{CommandSpec, FailurePolicy, ProcessRunner};

const DEV_DB_URL: &str = "mysql://dev:DEVPASSWORD@db:3306/dev_db";
const SHARED_DB_URL: &str = "mysql://dev:DRUPALPASSENV@db:3306/prod";

/// Contrib modules enabled on Full builds.
pub const HELPER_MODULES: [&str; 8] = [
    "admin_toolbar",
    "ctools",
    "redis",
    "token",
    "adminimal_admin_toolbar",
    "devel",
    "pathauto",
    "webprofiler",
];

/// Parameters of the site-install command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallProfile {
    pub account_name: &'static str,
    pub account_pass: &'static str,
    pub site_name: &'static str,
    pub site_mail: &'static str,
    pub db_url: &'static str,
    pub quiet: bool,
}

impl InstallProfile {
    /// `None` for the example app, which has nothing to install.
    pub fn for_app(app_type: AppType, tier: RequirementsTier) -> Option<Self> {
        let dev = Self {
            account_name: "dev",
            account_pass: "admin",
            site_name: "DockerDrupal",
            site_mail: "drupalD8@docker.dev",
            db_url: DEV_DB_URL,
            quiet: true,
        };
        match (app_type, tier) {
            (AppType::Default, _) => None,
            (AppType::D7, _) => Some(Self {
                site_mail: "drupalD7@docker.dev",
                quiet: false,
                ..dev
            }),
            (AppType::D8, RequirementsTier::Basic | RequirementsTier::Full) => Some(dev),
            (AppType::D8, RequirementsTier::Prod) => Some(Self {
                account_name: "prod",
                site_mail: "drupalD8@docker.prod",
                db_url: SHARED_DB_URL,
                ..dev
            }),
            (AppType::D8, RequirementsTier::Stage) => Some(Self {
                account_name: "stage",
                site_mail: "drupalD8@docker.prod",
                db_url: SHARED_DB_URL,
                ..dev
            }),
        }
    }

    /// Arguments after `exec -T php`.
    pub fn site_install_args(&self) -> Vec<String> {
        let mut args = vec![
            "drush".to_string(),
            "site-install".to_string(),
            "standard".to_string(),
            format!("--account-name={}", self.account_name),
            format!("--account-pass={}", self.account_pass),
            format!("--site-name={}", self.site_name),
            format!("--site-mail={}", self.site_mail),
            format!("--db-url={}", self.db_url),
        ];
        if self.quiet {
            args.push("--quiet".to_string());
        }
        args.push("-y".to_string());
        args
    }
}

#[derive(Debug, Default)]
pub struct InstallResult {
    /// False when install was skipped (no profile or no running containers).
    pub installed: bool,
    pub commands_run: usize,
    pub failures: Vec<ProvisionError>,
}

impl InstallResult {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct AppInstaller<'a> {
    ctx: &'a BuildContext,
    runner: &'a dyn ProcessRunner,
}

impl<'a> AppInstaller<'a> {
    pub fn new(ctx: &'a BuildContext, runner: &'a dyn ProcessRunner) -> Self {
        Self { ctx, runner }
    }

    pub fn install(&self) -> Result<InstallResult> {
        let mut result = InstallResult::default();
        let app_type = self.ctx.config.app_type;
        let tier = self.ctx.config.tier;
        let Some(profile) = InstallProfile::for_app(app_type, tier) else {
            tracing::info!(%app_type, "nothing to install");
            return Ok(result);
        };
        let project = app_project(self.ctx);
        let d8 = app_type == AppType::D8;

        if d8 && tier == RequirementsTier::Full {
            self.step(&mut result, project.exec("behat", ["composer", "update"]))?;
        }

        let console = &self.ctx.console;
        console.note("Run Drupal Installation.... This may take a few minutes....");
        if !containers_running(self.runner, &project)? {
            console.warning("App containers are not running; skipping Drupal installation");
            return Ok(result);
        }

        if d8 && tier.is_local() {
            self.step(&mut result, project.exec("php", ["chmod", "-R", "777", "../vendor/"]))?;
        }
        self.step(&mut result, project.exec("php", profile.site_install_args()))?;
        result.installed = true;

        if d8 && tier == RequirementsTier::Full && self.ctx.settings.install_helpers {
            console.note("Run APP composer update");
            self.step(&mut result, project.exec("php", ["composer", "update"]))?;
            console.note("Enable useful starter contrib modules");
            let mut enable = vec!["drush", "en"];
            enable.extend(HELPER_MODULES);
            enable.push("-y");
            self.step(&mut result, project.exec("php", enable))?;
            self.step(&mut result, project.exec("php", ["drush", "entity-updates", "-y"]))?;
        }
        Ok(result)
    }

    fn step(&self, result: &mut InstallResult, spec: CommandSpec) -> Result<()> {
        let output = self.runner.run(&spec, FailurePolicy::FailSoft)?;
        result.commands_run += 1;
        if !output.success {
            result.failures.push(output.to_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::context::tests::{config, context};
    use crate::process::testing::FakeRunner;
    use std::path::Path;

    fn running() -> FakeRunner {
        FakeRunner::new().respond("ps -q", 0, "abc123\n")
    }

    fn install(app_type: AppType, tier: RequirementsTier, runner: &FakeRunner) -> InstallResult {
        let ctx = context(Path::new("/srv/proj"), config(app_type, tier));
        AppInstaller::new(&ctx, runner).install().unwrap()
    }

    #[test]
    fn test_full_updates_before_install_and_enables_after() {
        let runner = running();

        let result = install(AppType::D8, RequirementsTier::Full, &runner);

        let update = runner.position("exec -T behat composer update").unwrap();
        let site_install = runner.position("drush site-install").unwrap();
        let enable = runner.position("drush en admin_toolbar").unwrap();
        let entity = runner.position("drush entity-updates -y").unwrap();
        assert!(update < site_install);
        assert!(site_install < enable);
        assert!(enable < entity);
        assert!(result.installed);
        assert!(result.is_ok());
    }

    #[test]
    fn test_basic_install_command() {
        let runner = running();

        install(AppType::D8, RequirementsTier::Basic, &runner);

        let calls = runner.calls();
        assert!(calls.iter().any(|c| c.ends_with("exec -T php chmod -R 777 ../vendor/")));
        assert!(calls.iter().any(|c| c.ends_with(
            "exec -T php drush site-install standard --account-name=dev --account-pass=admin \
             --site-name=DockerDrupal --site-mail=drupalD8@docker.dev \
             --db-url=mysql://dev:DEVPASSWORD@db:3306/dev_db --quiet -y"
        )));
        assert_eq!(runner.count("composer update"), 0);
        assert_eq!(runner.count("drush en"), 0);
    }

    #[test]
    fn test_shared_tiers_never_open_vendor() {
        for tier in [RequirementsTier::Prod, RequirementsTier::Stage] {
            let runner = running();
            install(AppType::D8, tier, &runner);
            assert_eq!(runner.count("chmod"), 0);
            assert_eq!(runner.count("--db-url=mysql://dev:DRUPALPASSENV@db:3306/prod"), 1);
        }
    }

    #[test]
    fn test_d7_install_has_no_quiet_flag() {
        let runner = running();

        install(AppType::D7, RequirementsTier::Full, &runner);

        let calls = runner.calls();
        let site_install = calls.iter().find(|c| c.contains("site-install")).unwrap();
        assert!(site_install.contains("--site-mail=drupalD7@docker.dev"));
        assert!(!site_install.contains("--quiet"));
        assert_eq!(runner.count("drush en"), 0);
    }

    #[test]
    fn test_no_containers_skips_install() {
        let runner = FakeRunner::new();

        let result = install(AppType::D8, RequirementsTier::Basic, &runner);

        assert!(!result.installed);
        assert_eq!(runner.count("site-install"), 0);
    }

    #[test]
    fn test_default_app_installs_nothing() {
        let runner = running();
        let result = install(AppType::Default, RequirementsTier::Basic, &runner);
        assert!(!result.installed);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_failed_install_is_recorded() {
        let runner = running().respond("site-install", 1, "");

        let result = install(AppType::D8, RequirementsTier::Prod, &runner);

        assert_eq!(result.failures.len(), 1);
        assert!(matches!(result.failures[0], ProvisionError::ProcessFailed { .. }));
    }

    #[test]
    fn test_profiles() {
        let stage = InstallProfile::for_app(AppType::D8, RequirementsTier::Stage).unwrap();
        assert_eq!(stage.account_name, "stage");
        assert_eq!(stage.site_mail, "drupalD8@docker.prod");
        assert!(InstallProfile::for_app(AppType::Default, RequirementsTier::Full).is_none());
    }
}
