use log::{debug, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::domain::{ClassifyError, Classifier, Manifest, TestTree, TreeError};
use crate::infrastructure::{FileClassifier, GitTree, NoVcsTree, is_git_repo};

/// Errors that can occur during an update cycle
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The test tree could not report its revision or changes.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The classifier could not be set up.
    #[error(transparent)]
    Classifier(#[from] ClassifyError),
}

/// How the change sets of a cycle are gathered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Leave uncommitted working-tree changes out of the cycle.
    pub ignore_local: bool,
    /// Drop manifest paths whose file is gone from disk.
    pub remove_missing_local: bool,
}

/// A path whose classification failed; it is left unindexed.
#[derive(Debug)]
pub struct ClassificationFailure {
    pub path: String,
    pub error: ClassifyError,
}

/// Outcome of one update cycle
#[derive(Debug, Default)]
pub struct UpdateSummary {
    /// Paths whose items were (re)installed.
    pub indexed: usize,
    /// Paths that were indexed before the cycle and are now absent.
    pub removed: usize,
    pub failures: Vec<ClassificationFailure>,
}

impl fmt::Display for UpdateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} path(s) indexed, {} removed, {} failed",
            self.indexed,
            self.removed,
            self.failures.len()
        )
    }
}

/// Update `manifest` against the tree at `tests_root`.
///
/// Picks the git-backed tree when `tests_root` is inside a git work tree and the
/// unmanaged tree otherwise; that selection is the only place the two differ.
/// A manifest mounted at a different `url_base` is discarded and rebuilt.
///
/// # Errors
///
/// Returns [`UpdateError::Tree`] if the tree cannot be queried, and
/// [`UpdateError::Classifier`] if the classifier cannot be created. The manifest
/// is not modified when the tree cannot be queried.
pub fn update(
    manifest: &mut Manifest,
    tests_root: &Path,
    url_base: &str,
    ignore_local: bool,
) -> Result<UpdateSummary, UpdateError> {
    if manifest.url_base() != url_base {
        warn!(
            "URL base changed from {} to {url_base}, rebuilding the manifest",
            manifest.url_base()
        );
        *manifest = Manifest::new(url_base);
    }

    let classifier = FileClassifier::new(tests_root, url_base)?;

    if is_git_repo(tests_root) {
        debug!("Using git tree at {}", tests_root.display());
        let tree = GitTree::new(tests_root);
        let options = UpdateOptions {
            ignore_local,
            remove_missing_local: false,
        };
        run(manifest, &tree, &classifier, options)
    } else {
        debug!("Using unmanaged tree at {}", tests_root.display());
        let tree = NoVcsTree::new(tests_root);
        let options = UpdateOptions {
            ignore_local,
            remove_missing_local: !ignore_local,
        };
        run(manifest, &tree, &classifier, options)
    }
}

/// Run one update cycle: reclassify every changed path, optionally drop paths
/// missing from disk, then record the tree's current revision.
///
/// # Errors
///
/// Returns [`UpdateError::Tree`] if the tree cannot be queried. All queries run
/// before the manifest is touched.
pub fn run<T, C>(
    manifest: &mut Manifest,
    tree: &T,
    classifier: &C,
    options: UpdateOptions,
) -> Result<UpdateSummary, UpdateError>
where
    T: TestTree,
    C: Classifier,
{
    let local_changes = if options.ignore_local {
        None
    } else {
        tree.local_changes()?
    };
    let current_rev = tree.current_rev()?;
    let committed_changes = tree.committed_changes(manifest.rev())?;

    let changed: BTreeSet<String> = committed_changes
        .into_iter()
        .chain(local_changes.into_iter().flatten())
        .collect();
    debug!("{} path(s) to examine", changed.len());

    let mut summary = UpdateSummary::default();

    for path in &changed {
        let previous = manifest.remove(path);
        let had_items = previous.is_some();

        match classifier.classify(path) {
            Ok(Some(items)) if !items.is_empty() => {
                debug!("+ {path}");
                manifest.replace(path, items);
                summary.indexed += 1;
            }
            Ok(_) => {
                if had_items {
                    debug!("- {path}");
                    summary.removed += 1;
                }
            }
            Err(error) => {
                warn!("Failed to classify {path}: {error}");
                if had_items {
                    summary.removed += 1;
                }
                summary.failures.push(ClassificationFailure {
                    path: path.clone(),
                    error,
                });
            }
        }
    }

    if options.remove_missing_local {
        let missing = manifest.retain_paths(|path| classifier.exists(path));
        for path in &missing {
            debug!("- {path}");
        }
        summary.removed += missing.len();
    }

    manifest.advance_rev(current_rev);
    Ok(summary)
}
