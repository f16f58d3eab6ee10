//! Variant-specific app setup.
//!
//! Each app type is a [`BundleVariant`] that describes its states as
//! [`Step`]s. [`BundleInstaller`] fetches the source, then walks the steps in
//! order through the [`Scaffolder`], so a re-run on a partly built tree only
//! redoes what is missing.

mod d7;
mod d8;
mod default;

pub use d7::Drupal7;
pub use d8::{bundle_name, cache_prefix_line, Drupal8};
pub use default::ExampleApp;

use crate::build::context::BuildContext;
use crate::component::{mirror, BundleState, Op, Step};
use crate::config::{AppType, RequirementsTier};
use crate::error::{ProvisionError, Result};
use crate::executor::Scaffolder;
use crate::process::ProcessRunner;
use crate::source::{FetchOutcome, Prompt, SourceFetcher, SourceRoot};

pub trait BundleVariant {
    fn app_type(&self) -> AppType;

    /// Whether the codebase is fetched before scaffolding.
    fn fetches_source(&self) -> bool {
        true
    }

    /// Steps from `Scaffolded` through `PermissionsSet`, in order.
    fn steps(&self, ctx: &BuildContext, source: &SourceRoot) -> Vec<Step>;
}

pub fn variant_for(app_type: AppType) -> Box<dyn BundleVariant> {
    match app_type {
        AppType::Default => Box::new(ExampleApp),
        AppType::D7 => Box::new(Drupal7),
        AppType::D8 => Box::new(Drupal8),
    }
}

/// File modes for the paths Drupal writes to at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionProfile {
    pub writable_dir: u32,
    pub settings_file: u32,
}

impl PermissionProfile {
    /// Local tiers keep the loose dev modes; shared tiers never get world write.
    pub fn for_app(app_type: AppType, tier: RequirementsTier) -> Self {
        if !tier.is_local() {
            return Self {
                writable_dir: 0o775,
                settings_file: 0o644,
            };
        }
        match app_type {
            AppType::D7 => Self {
                writable_dir: 0o777,
                settings_file: 0o777,
            },
            AppType::D8 | AppType::Default => Self {
                writable_dir: 0o777,
                settings_file: 0o755,
            },
        }
    }
}

/// Behat bundle mirror, only for the Full tier.
pub(crate) fn behat_op(ctx: &BuildContext) -> Option<Op> {
    (ctx.config.tier == RequirementsTier::Full)
        .then(|| mirror(ctx.bundle("behat"), ctx.layout().behat()))
}

#[derive(Debug)]
pub struct BundleReport {
    pub source: SourceRoot,
    /// Last state reached.
    pub reached: BundleState,
    /// States found already satisfied.
    pub skipped: Vec<BundleState>,
    pub mutations: usize,
    pub fetch_failures: Vec<ProvisionError>,
    pub scaffold_failures: Vec<ProvisionError>,
}

impl BundleReport {
    pub fn is_clean(&self) -> bool {
        self.fetch_failures.is_empty() && self.scaffold_failures.is_empty()
    }
}

pub struct BundleInstaller<'a> {
    ctx: &'a BuildContext,
    runner: &'a dyn ProcessRunner,
    prompt: &'a dyn Prompt,
}

impl<'a> BundleInstaller<'a> {
    pub fn new(ctx: &'a BuildContext, runner: &'a dyn ProcessRunner, prompt: &'a dyn Prompt) -> Self {
        Self {
            ctx,
            runner,
            prompt,
        }
    }

    pub fn install(&self) -> Result<BundleReport> {
        let variant = variant_for(self.ctx.config.app_type);
        self.ctx
            .console
            .section(&format!("Setting up {} app", variant.app_type()));

        let fetched = if variant.fetches_source() {
            SourceFetcher::new(self.ctx, self.runner, self.prompt).fetch()?
        } else {
            let root = if self.ctx.layout().exists() {
                SourceRoot::Existing
            } else {
                SourceRoot::Absent
            };
            FetchOutcome {
                root,
                failures: Vec::new(),
            }
        };

        let mut report = BundleReport {
            source: fetched.root,
            reached: BundleState::Fetched,
            skipped: Vec::new(),
            mutations: 0,
            fetch_failures: fetched.failures,
            scaffold_failures: Vec::new(),
        };

        let scaffolder = Scaffolder::new(self.runner, &self.ctx.console);
        for step in variant.steps(self.ctx, &report.source) {
            if step.skip_reason.is_some() {
                report.skipped.push(step.state);
            }
            let applied = scaffolder.apply_step(&step)?;
            tracing::info!(
                state = %step.state,
                mutations = applied.mutations,
                failures = applied.failures.len(),
                "bundle state reached"
            );
            report.mutations += applied.mutations;
            report.scaffold_failures.extend(applied.failures);
            if applied.halted {
                // The tree stays at the last complete state; a re-run retries.
                return Ok(report);
            }
            report.reached = step.state;
        }
        report.reached = BundleState::Done;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::context::tests::{config, context};
    use crate::config::AppConfig;
    use crate::process::testing::FakeRunner;
    use crate::source::FixedAnswer;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn write_bundles(util: &Path) {
        let bundles = util.join("bundles");
        let files: &[(&str, &[&str])] = &[
            ("default", &["index.html"]),
            (
                "d7",
                &[
                    "robots.txt",
                    "settings.php",
                    "project.make.yml",
                    ".gitignore",
                    "settings.local.php",
                ],
            ),
            (
                "d8",
                &[
                    "composer.json",
                    "development.services.yml",
                    "services.yml",
                    "robots.txt",
                    "settings.php",
                    "settings.local.php",
                    "drushrc.php",
                ],
            ),
            ("behat", &["behat.yml"]),
        ];
        for (bundle, names) in files {
            let dir = bundles.join(bundle);
            fs::create_dir_all(&dir).unwrap();
            for name in *names {
                fs::write(dir.join(name), format!("{bundle}/{name}\n")).unwrap();
            }
        }
    }

    fn install_in(ctx: &BuildContext, runner: &FakeRunner) -> BundleReport {
        write_bundles(&ctx.project_dir().join("util"));
        BundleInstaller::new(ctx, runner, &FixedAnswer("./".into()))
            .install()
            .unwrap()
    }

    fn install(project: &Path, cfg: AppConfig, runner: &FakeRunner) -> BundleReport {
        install_in(&context(project, cfg), runner)
    }

    /// Runner whose `drush make` lays down a docroot like the real tool would.
    fn making_runner() -> FakeRunner {
        FakeRunner::new().on_run(|spec| {
            let args = spec.arguments();
            if spec.program() != "drush" || args.first().map(String::as_str) != Some("make") {
                return;
            }
            let public = spec.cwd().unwrap_or(Path::new(".")).join(&args[2]);
            for dir in ["sites/default", "modules", "profiles", "themes"] {
                fs::create_dir_all(public.join(dir)).unwrap();
            }
            fs::write(public.join("index.php"), "<?php").unwrap();
            fs::write(public.join("robots.txt"), "core robots").unwrap();
        })
    }

    fn dangling_links(root: &Path) -> Vec<String> {
        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path_is_symlink() && !e.path().exists())
            .map(|e| e.path().display().to_string())
            .collect()
    }

    #[test]
    fn test_d7_local_basic_scaffolds_without_clone() {
        let temp = TempDir::new().unwrap();
        let runner = making_runner();

        let report = install(
            temp.path(),
            config(AppType::D7, RequirementsTier::Basic),
            &runner,
        );

        let app = temp.path().join("app");
        for dir in [
            "repository/libraries/custom",
            "repository/modules/custom",
            "repository/themes/custom",
            "shared/files",
            "builds",
        ] {
            assert!(app.join(dir).is_dir(), "missing {dir}");
        }
        assert_eq!(runner.count("git clone"), 0);
        assert_eq!(runner.count("drush make"), 1);
        assert_eq!(report.reached, BundleState::Done);
        assert!(report.is_clean(), "{:?}", report.scaffold_failures);
    }

    #[test]
    fn test_d7_links_resolve_and_rerun_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let runner = making_runner();
        let cfg = config(AppType::D7, RequirementsTier::Full);

        let first = install(temp.path(), cfg.clone(), &runner);
        assert!(first.is_clean(), "{:?}", first.scaffold_failures);
        let app = temp.path().join("app");
        assert!(dangling_links(&app).is_empty(), "{:?}", dangling_links(&app));
        assert_eq!(
            fs::read_link(app.join("www")).unwrap(),
            Path::new("builds/2017-03-04--05-06-07/public")
        );
        let www = app.join("www");
        assert_eq!(
            fs::read_to_string(www.join("sites/default/settings.php")).unwrap(),
            "d7/settings.php\n"
        );
        assert_eq!(
            fs::read_to_string(www.join("robots.txt")).unwrap(),
            "d7/robots.txt\n"
        );
        assert_eq!(
            fs::canonicalize(www.join("sites/default/files")).unwrap(),
            fs::canonicalize(app.join("shared/files")).unwrap()
        );
        assert!(www.join("modules/custom").is_dir());
        assert!(app.join("behat/behat.yml").is_file());

        let second = install(temp.path(), cfg, &runner);
        assert_eq!(second.mutations, 0);
        assert!(second.skipped.contains(&BundleState::LinksRewired));
        assert_eq!(runner.count("drush make"), 1);
    }

    #[test]
    fn test_d7_failed_make_leaves_www_unset_and_is_retried() {
        let temp = TempDir::new().unwrap();
        let cfg = config(AppType::D7, RequirementsTier::Basic);
        let failing = FakeRunner::new().respond("drush make", 1, "");

        let first = install(temp.path(), cfg.clone(), &failing);

        let app = temp.path().join("app");
        assert!(fs::symlink_metadata(app.join("www")).is_err());
        assert!(!app.join("builds/2017-03-04--05-06-07/public").exists());
        assert_eq!(first.reached, BundleState::TemplatesPlaced);
        assert!(first
            .scaffold_failures
            .iter()
            .any(|f| matches!(f, ProvisionError::ProcessFailed { .. })));

        let runner = making_runner();
        let retry_id = crate::builds::BuildId::from_config("2017-03-05--00-00-00").unwrap();
        let ctx = context(temp.path(), cfg).with_session_build(retry_id);
        let second = install_in(&ctx, &runner);

        assert_eq!(runner.count("drush make"), 1);
        assert!(!second.skipped.contains(&BundleState::LinksRewired));
        assert!(second.is_clean(), "{:?}", second.scaffold_failures);
        assert_eq!(second.reached, BundleState::Done);
        assert_eq!(
            fs::read_link(app.join("www")).unwrap(),
            Path::new("builds/2017-03-05--00-00-00/public")
        );
        assert!(ctx.layout().www_serves_site());
    }

    #[test]
    fn test_d8_existing_tree_places_templates_and_links_web() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app/web")).unwrap();
        let runner = FakeRunner::new();

        let report = install(
            temp.path(),
            config(AppType::D8, RequirementsTier::Basic),
            &runner,
        );

        let app = temp.path().join("app");
        assert_eq!(report.source, SourceRoot::Existing);
        assert!(runner.calls().is_empty());
        assert!(app.join("config/sync").is_dir());
        assert!(app.join("web/sites/development.services.yml").is_file());
        let local = fs::read_to_string(app.join("web/sites/default/settings.local.php")).unwrap();
        assert!(local.ends_with("$settings['cache_prefix'] = 'myapp_';\n"));
        assert_eq!(fs::read_link(app.join("www")).unwrap(), Path::new("./web"));
        assert!(dangling_links(&app).is_empty());
    }

    #[test]
    fn test_d8_rerun_is_idempotent() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app/web")).unwrap();
        let runner = FakeRunner::new();
        let cfg = config(AppType::D8, RequirementsTier::Full);

        install(temp.path(), cfg.clone(), &runner);
        let second = install(temp.path(), cfg, &runner);

        assert_eq!(second.mutations, 0);
        let local = fs::read_to_string(
            temp.path()
                .join("app/web/sites/default/settings.local.php"),
        )
        .unwrap();
        assert_eq!(local.matches("cache_prefix").count(), 1);
    }

    #[test]
    fn test_d8_prod_missing_bundle_is_reported() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app/web")).unwrap();

        let report = install(
            temp.path(),
            config(AppType::D8, RequirementsTier::Prod),
            &FakeRunner::new(),
        );

        assert!(!report.is_clean());
        assert!(report
            .scaffold_failures
            .iter()
            .any(|f| matches!(f, ProvisionError::BundleMissing { .. })));
        assert_eq!(report.reached, BundleState::Done);
    }

    #[test]
    fn test_default_app_mirrors_example_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let cfg = config(AppType::Default, RequirementsTier::Basic);

        let first = install(temp.path(), cfg.clone(), &runner);
        let app = temp.path().join("app");
        assert!(app.join("repository/index.html").is_file());
        assert_eq!(fs::read_link(app.join("www")).unwrap(), Path::new("repository"));
        assert!(first.mutations > 0);

        let second = install(temp.path(), cfg, &runner);
        assert_eq!(second.mutations, 0);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_permission_profiles() {
        let local = PermissionProfile::for_app(AppType::D8, RequirementsTier::Basic);
        assert_eq!((local.writable_dir, local.settings_file), (0o777, 0o755));
        let d7 = PermissionProfile::for_app(AppType::D7, RequirementsTier::Full);
        assert_eq!(d7.settings_file, 0o777);
        for tier in [RequirementsTier::Prod, RequirementsTier::Stage] {
            let shared = PermissionProfile::for_app(AppType::D7, tier);
            assert_eq!(shared.writable_dir & 0o002, 0);
            assert_eq!(shared.settings_file & 0o002, 0);
        }
    }
}
