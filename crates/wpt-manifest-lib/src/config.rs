use std::path::{Path, PathBuf};

use crate::domain::url::normalize_url_base;
use crate::infrastructure::{MANIFEST_FILE_NAME, RepoError, find_root};

/// All startup configuration for an update, resolved once by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the test tree; every manifest path is relative to it.
    pub tests_root: PathBuf,
    pub manifest_path: PathBuf,
    /// Mount-point prefix, always starting and ending with `/`.
    pub url_base: String,
    /// Ignore any stored manifest and index the whole tree.
    pub rebuild: bool,
    /// Leave uncommitted working-tree changes out of the update.
    pub ignore_local: bool,
}

impl Config {
    /// Resolve the tests root and manifest location relative to `cwd`.
    ///
    /// Without an explicit tests root the work tree of the git repository
    /// containing `cwd` is used. The manifest defaults to `MANIFEST.json` in the
    /// tests root.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError`] if no tests root was given and `cwd` is not inside
    /// a git work tree.
    pub fn resolve(
        cwd: &Path,
        tests_root: Option<&Path>,
        manifest_path: Option<&Path>,
    ) -> Result<Self, RepoError> {
        let tests_root = match tests_root {
            Some(root) => cwd.join(root),
            None => find_root(cwd)?,
        };
        let manifest_path = manifest_path.map_or_else(
            || tests_root.join(MANIFEST_FILE_NAME),
            |path| cwd.join(path),
        );

        Ok(Self {
            tests_root,
            manifest_path,
            url_base: "/".to_owned(),
            rebuild: false,
            ignore_local: false,
        })
    }

    #[must_use]
    pub fn with_url_base(mut self, url_base: &str) -> Self {
        self.url_base = normalize_url_base(url_base);
        self
    }

    #[must_use]
    pub fn with_rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    #[must_use]
    pub fn with_ignore_local(mut self, ignore_local: bool) -> Self {
        self.ignore_local = ignore_local;
        self
    }
}
