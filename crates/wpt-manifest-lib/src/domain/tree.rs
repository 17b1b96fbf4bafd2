use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

use super::Revision;

/// Errors raised while querying a test tree for its revision or changes
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("failed to run `git {command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`git {command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("`git {command}` produced non UTF-8 output")]
    Utf8 {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("git reported an invalid revision: {0:?}")]
    InvalidRevision(String),

    #[error("tests root is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("invalid walk pattern")]
    Pattern(#[from] glob::PatternError),

    #[error("failed to walk tests root")]
    Walk(#[from] glob::GlobError),
}

/// Revision identity and change queries for the tree holding the tests.
///
/// Every path is relative to the tests root and `/`-separated.
pub trait TestTree {
    /// The revision the tree is currently at, `None` for unmanaged trees.
    ///
    /// # Errors
    ///
    /// Returns an error if the revision cannot be determined.
    fn current_rev(&self) -> Result<Option<Revision>, TreeError>;

    /// Paths that differ between `old_rev` and the current revision.
    /// With no `old_rev`, every path in the tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the history or the tree cannot be read.
    fn committed_changes(&self, old_rev: Option<&Revision>) -> Result<BTreeSet<String>, TreeError>;

    /// Uncommitted working-tree changes, `None` where the notion does not apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the working tree status cannot be read.
    fn local_changes(&self) -> Result<Option<BTreeSet<String>>, TreeError>;
}
