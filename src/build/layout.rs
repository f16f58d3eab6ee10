//! Fixed on-disk layout under `./app`.
//!
//! D7 keeps source in `repository/`, persistent data in `shared/` and
//! disposable artifacts in `builds/<id>/public`. D8 keeps source and docroot
//! in `web/`. Both expose the served tree through the `www` symlink.

use std::path::{Path, PathBuf};

use crate::builds::BuildId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLayout {
    root: PathBuf,
}

impl AppLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    pub fn repository(&self) -> PathBuf {
        self.root.join("repository")
    }

    pub fn shared(&self) -> PathBuf {
        self.root.join("shared")
    }

    pub fn shared_files(&self) -> PathBuf {
        self.root.join("shared/files")
    }

    pub fn builds(&self) -> PathBuf {
        self.root.join("builds")
    }

    /// `builds/<id>/public`, relative to the app root. Used as the `www` target.
    pub fn build_public_rel(id: &BuildId) -> PathBuf {
        Path::new("builds").join(id.as_str()).join("public")
    }

    pub fn build_public(&self, id: &BuildId) -> PathBuf {
        self.root.join(Self::build_public_rel(id))
    }

    pub fn www(&self) -> PathBuf {
        self.root.join("www")
    }

    pub fn web(&self) -> PathBuf {
        self.root.join("web")
    }

    pub fn sites_default(&self) -> PathBuf {
        self.root.join("web/sites/default")
    }

    pub fn config_sync(&self) -> PathBuf {
        self.root.join("config/sync")
    }

    pub fn behat(&self) -> PathBuf {
        self.root.join("behat")
    }

    /// Whether `www` resolves to a built docroot, not just any directory.
    pub fn www_serves_site(&self) -> bool {
        self.www().join("index.php").is_file()
    }
}
