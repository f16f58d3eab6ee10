//! Drupal 7: repository + shared + timestamped drush make builds.

use std::path::{Path, PathBuf};

use super::{behat_op, BundleVariant, PermissionProfile};
use crate::build::context::BuildContext;
use crate::build::layout::AppLayout;
use crate::builds::{list_builds, BuildId};
use crate::component::{chmod, command, dirs, place_new, relink, BundleState, Op, Step};
use crate::config::AppType;
use crate::executor::files::relative_path;
use crate::process::{tools, FailurePolicy};
use crate::source::SourceRoot;

/// Repository files linked into every build: (path under the build's
/// public root, path under the app root).
const BUILD_LINKS: &[(&str, &str)] = &[
    ("robots.txt", "repository/robots.txt"),
    ("sites/default/settings.php", "repository/settings.php"),
    ("sites/default/settings.local.php", "shared/settings.local.php"),
    ("sites/default/files", "shared/files"),
    ("modules/custom", "repository/modules/custom"),
    ("profiles/custom", "repository/profiles/custom"),
    ("themes/custom", "repository/themes/custom"),
];

pub struct Drupal7;

impl BundleVariant for Drupal7 {
    fn app_type(&self) -> AppType {
        AppType::D7
    }

    fn steps(&self, ctx: &BuildContext, source: &SourceRoot) -> Vec<Step> {
        let layout = ctx.layout();
        let managed = *source == SourceRoot::Absent || layout.repository().is_dir();

        if !managed {
            let reason = "app/ holds a tree not scaffolded by drudock";
            return vec![
                Step::skipped(BundleState::Scaffolded, reason),
                Step::skipped(BundleState::TemplatesPlaced, reason),
                Step::skipped(BundleState::LinksRewired, reason),
                Step::skipped(BundleState::PermissionsSet, reason),
            ];
        }

        let mut steps = vec![
            Step::new(BundleState::Scaffolded, vec![scaffold(&layout)]),
            Step::new(BundleState::TemplatesPlaced, templates(ctx, &layout)),
        ];

        if layout.www_serves_site() {
            let existing = list_builds(&layout.builds()).unwrap_or_default();
            tracing::info!(
                builds = existing.len(),
                latest = ?existing.last().map(BuildId::as_str),
                "keeping current build"
            );
            let reason = "app/www already points at a build";
            steps.push(Step::skipped(BundleState::LinksRewired, reason));
            steps.push(Step::skipped(BundleState::PermissionsSet, reason));
        } else {
            let build = build_and_link(ctx, &layout);
            steps.push(Step::new(BundleState::LinksRewired, build).halting());
            steps.push(Step::new(BundleState::PermissionsSet, permissions(ctx, &layout)));
        }
        steps
    }
}

fn scaffold(layout: &AppLayout) -> Op {
    let repository = layout.repository();
    dirs([
        repository.join("libraries/custom"),
        repository.join("modules/custom"),
        repository.join("profiles/custom"),
        repository.join("scripts"),
        repository.join("themes/custom"),
        layout.shared_files(),
        layout.builds(),
    ])
}

fn templates(ctx: &BuildContext, layout: &AppLayout) -> Vec<Op> {
    let bundle = ctx.bundle("d7");
    let repository = layout.repository();
    let mut ops: Vec<Op> = ["robots.txt", "settings.php", "project.make.yml", ".gitignore"]
        .iter()
        .map(|name| place_new(bundle.join(name), repository.join(name)))
        .collect();
    ops.push(place_new(
        bundle.join("settings.local.php"),
        layout.shared().join("settings.local.php"),
    ));
    ops.extend(behat_op(ctx));
    ops
}

fn build_and_link(ctx: &BuildContext, layout: &AppLayout) -> Vec<Op> {
    let id = &ctx.session_build;
    let public_rel = AppLayout::build_public_rel(id);
    let public = layout.build_public(id);

    let make = tools::drush_make(
        Path::new("app/repository/project.make.yml"),
        &Path::new("app").join(&public_rel),
        ctx.project_dir(),
    );
    // www moves last, so it only ever points at a build that finished.
    let mut ops = vec![command(make, FailurePolicy::FailSoft)];
    for (in_build, in_app) in BUILD_LINKS {
        let link_rel = public_rel.join(in_build);
        ops.push(relink(public.join(in_build), link_target(&link_rel, Path::new(in_app))));
    }
    ops.push(relink(layout.www(), &public_rel));
    ops
}

/// Relative target for a link at `link_rel` pointing at `target_rel`, both
/// relative to the app root.
fn link_target(link_rel: &Path, target_rel: &Path) -> PathBuf {
    let dir = link_rel.parent().unwrap_or(Path::new(""));
    relative_path(dir, target_rel)
}

fn permissions(ctx: &BuildContext, layout: &AppLayout) -> Vec<Op> {
    let profile = PermissionProfile::for_app(AppType::D7, ctx.config.tier);
    let default = layout.build_public(&ctx.session_build).join("sites/default");
    vec![
        chmod(default.join("files"), profile.writable_dir),
        chmod(default.join("settings.php"), profile.settings_file),
        chmod(default.join("settings.local.php"), profile.settings_file),
    ]
}
