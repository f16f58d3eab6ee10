//! Drupal 8: composer-managed tree with the docroot in `web/`.

use super::{behat_op, BundleVariant, PermissionProfile};
use crate::build::context::BuildContext;
use crate::build::layout::AppLayout;
use crate::component::{chmod, dirs, place, place_with_line, relink, BundleState, Op, Step};
use crate::config::{AppType, RequirementsTier};
use crate::source::SourceRoot;

pub struct Drupal8;

impl BundleVariant for Drupal8 {
    fn app_type(&self) -> AppType {
        AppType::D8
    }

    fn steps(&self, ctx: &BuildContext, source: &SourceRoot) -> Vec<Step> {
        let layout = ctx.layout();
        if !layout.exists() {
            let reason = "app/ was not fetched";
            return vec![
                Step::skipped(BundleState::Scaffolded, reason),
                Step::skipped(BundleState::TemplatesPlaced, reason),
                Step::skipped(BundleState::LinksRewired, reason),
                Step::skipped(BundleState::PermissionsSet, reason),
            ];
        }

        let links = if source.sets_docroot() {
            Step::skipped(BundleState::LinksRewired, "docroot chosen at clone time")
        } else {
            Step::new(BundleState::LinksRewired, vec![relink(layout.www(), "./web")])
        };

        vec![
            Step::new(BundleState::Scaffolded, vec![scaffold(&layout)]),
            Step::new(BundleState::TemplatesPlaced, templates(ctx, &layout)),
            links,
            Step::new(BundleState::PermissionsSet, permissions(ctx, &layout)),
        ]
    }
}

/// Bundle holding the D8 templates for `tier`.
pub fn bundle_name(tier: RequirementsTier) -> &'static str {
    match tier {
        RequirementsTier::Prod => "d8prod",
        RequirementsTier::Basic | RequirementsTier::Full | RequirementsTier::Stage => "d8",
    }
}

/// Line appended to `settings.local.php` so apps sharing one redis do not
/// read each other's cache.
pub fn cache_prefix_line(system_app_name: &str) -> String {
    format!("$settings['cache_prefix'] = '{system_app_name}_';")
}

fn scaffold(layout: &AppLayout) -> Op {
    let web = layout.web();
    dirs([
        layout.config_sync(),
        layout.sites_default().join("files"),
        web.join("themes/custom"),
        web.join("modules/custom"),
        layout.shared_files(),
    ])
}

fn templates(ctx: &BuildContext, layout: &AppLayout) -> Vec<Op> {
    let bundle = ctx.bundle(bundle_name(ctx.config.tier));
    let default = layout.sites_default();
    let mut ops = vec![
        place(bundle.join("composer.json"), layout.root().join("composer.json")),
        place(
            bundle.join("development.services.yml"),
            layout.web().join("sites/development.services.yml"),
        ),
        place(bundle.join("services.yml"), default.join("services.yml")),
        place(bundle.join("robots.txt"), layout.web().join("robots.txt")),
        place(bundle.join("settings.php"), default.join("settings.php")),
        place_with_line(
            bundle.join("settings.local.php"),
            default.join("settings.local.php"),
            cache_prefix_line(&ctx.system_app_name()),
        ),
        place(bundle.join("drushrc.php"), default.join("drushrc.php")),
    ];
    ops.extend(behat_op(ctx));
    ops
}

fn permissions(ctx: &BuildContext, layout: &AppLayout) -> Vec<Op> {
    let profile = PermissionProfile::for_app(AppType::D8, ctx.config.tier);
    let default = layout.sites_default();
    vec![
        chmod(layout.config_sync(), profile.writable_dir),
        chmod(default.join("files"), profile.writable_dir),
        chmod(default.join("settings.php"), profile.settings_file),
        chmod(default.join("settings.local.php"), profile.settings_file),
    ]
}
