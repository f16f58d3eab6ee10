//! The static example app.

use super::{behat_op, BundleVariant};
use crate::build::context::BuildContext;
use crate::component::{dirs, mirror, relink, BundleState, Step};
use crate::config::AppType;
use crate::source::SourceRoot;

pub struct ExampleApp;

impl BundleVariant for ExampleApp {
    fn app_type(&self) -> AppType {
        AppType::Default
    }

    fn fetches_source(&self) -> bool {
        false
    }

    fn steps(&self, ctx: &BuildContext, _source: &SourceRoot) -> Vec<Step> {
        let layout = ctx.layout();
        let mut templates = vec![mirror(ctx.bundle("default"), layout.repository())];
        templates.extend(behat_op(ctx));

        vec![
            Step::new(BundleState::Scaffolded, vec![dirs([layout.repository()])]),
            Step::new(BundleState::TemplatesPlaced, templates),
            Step::new(
                BundleState::LinksRewired,
                vec![relink(layout.www(), "repository")],
            ),
            Step::skipped(BundleState::PermissionsSet, "no writable paths"),
        ]
    }
}
