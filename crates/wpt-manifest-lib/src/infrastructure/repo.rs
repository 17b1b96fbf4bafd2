use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when locating the repository holding the tests
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repository has no work tree")]
    BareRepository,

    #[error("no valid git repository could be found")]
    GitRepository(#[source] gix_discover::upwards::Error),
}

/// Find the work tree root of the git repository containing the given path.
///
/// # Errors
///
/// Returns an error if no git repository is found or the repository is bare.
pub fn find_root(start: &Path) -> Result<PathBuf, RepoError> {
    let (repo_path, _trust) = gix_discover::upwards(start).map_err(RepoError::GitRepository)?;

    let (_git_dir, work_tree) = repo_path.into_repository_and_work_tree_directories();

    work_tree.ok_or(RepoError::BareRepository)
}

/// Whether `path` lies inside the work tree of a git repository.
#[must_use]
pub fn is_git_repo(path: &Path) -> bool {
    find_root(path).is_ok()
}
