pub mod manifest;
pub mod repo;
pub mod sourcefile;
pub mod tree;

pub use manifest::{
    FileManifest, MANIFEST_FILE_NAME, ManifestError, parse_manifest, serialize_manifest,
};
pub use repo::{RepoError, find_root, is_git_repo};
pub use sourcefile::FileClassifier;
pub use tree::{GitTree, NoVcsTree};
