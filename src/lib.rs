//! Provisioning for Drupal apps under Docker Compose.
//!
//! One `build:init` run takes the app described by `.config.yml` from nothing
//! (or a partial tree) to a running, installed site:
//!
//! - **Bundle setup** - fetch the codebase, then walk the variant's states
//!   (scaffold, templates, links, permissions) as declarative ops
//! - **Containers** - sync barrier or shared-tier bring-up, then a bounded
//!   wait for the database
//! - **Install** - one `drush site-install` whose parameters come from the tier
//!
//! # Architecture
//!
//! ```text
//! commands::build
//!     │
//!     ├── config        .config.yml + tool settings
//!     ├── preflight     host tools on PATH
//!     ├── bundle        BundleVariant (DEFAULT | D7 | D8) ──▶ executor
//!     │     └── source  git clone / composer create-project
//!     ├── containers    ComposeProject + ReadinessProbe
//!     └── install       InstallProfile per tier
//!
//! process               every subprocess goes through ProcessRunner
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use drudock::component::{dirs, relink, BundleState, Step};
//!
//! let step = Step::new(
//!     BundleState::LinksRewired,
//!     vec![relink(layout.www(), "repository")],
//! );
//! Scaffolder::new(&runner, &console).apply_step(&step)?;
//! ```

pub mod build;
pub mod builds;
pub mod bundle;
pub mod cancel;
pub mod commands;
pub mod component;
pub mod config;
pub mod console;
pub mod containers;
pub mod error;
pub mod executor;
pub mod host;
pub mod install;
pub mod preflight;
pub mod process;
pub mod source;

pub use build::context::BuildContext;
pub use component::{BundleState, Op, Step};
pub use error::{ProvisionError, Result};
