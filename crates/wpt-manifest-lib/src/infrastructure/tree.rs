use glob::{MatchOptions, Pattern, glob_with};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::domain::{Revision, TestTree, TreeError};

/// A tests root inside a git work tree, queried through the `git` CLI.
pub struct GitTree {
    root: PathBuf,
}

impl GitTree {
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Run git in the tests root and return its raw stdout.
    fn git(&self, args: &[&str]) -> Result<Vec<u8>, TreeError> {
        let command = args.join(" ");
        debug!("git {command}");

        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()
            .map_err(|source| TreeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TreeError::Command {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(output.stdout)
    }

    /// Run git for a single line of textual output, such as an object id.
    fn git_line(&self, args: &[&str]) -> Result<String, TreeError> {
        let stdout = self.git(args)?;
        let line = String::from_utf8(stdout).map_err(|source| TreeError::Utf8 {
            command: args.join(" "),
            source,
        })?;
        Ok(line.trim().to_owned())
    }

    /// Location of the tests root inside the work tree, e.g. `""` or `"tests/"`.
    fn prefix(&self) -> Result<String, TreeError> {
        self.git_line(&["rev-parse", "--show-prefix"])
    }

    /// Map work-tree relative paths to tests-root relative ones, dropping
    /// paths outside the tests root.
    fn relativize<'a, I>(&self, paths: I) -> Result<BTreeSet<String>, TreeError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let prefix = self.prefix()?;
        Ok(paths
            .into_iter()
            .filter(|path| !path.is_empty())
            .filter_map(|path| path.strip_prefix(prefix.as_str()))
            .map(str::to_owned)
            .collect())
    }
}

/// Split NUL-terminated `git` output into records.
fn nul_records(output: &[u8]) -> impl Iterator<Item = &[u8]> {
    output.split(|byte| *byte == 0).filter(|record| !record.is_empty())
}

/// Decode a path record; paths that are not UTF-8 cannot be manifest keys and are skipped.
fn decode_path(record: &[u8]) -> Option<&str> {
    if let Ok(path) = std::str::from_utf8(record) {
        Some(path)
    } else {
        warn!("Skipping non UTF-8 path {}", String::from_utf8_lossy(record));
        None
    }
}

/// Extract every path from `git status --porcelain -z` output.
///
/// Renames and copies carry their source path as a separate record; both
/// sides are reported since the source no longer holds the same content.
fn parse_porcelain(output: &[u8]) -> Vec<&str> {
    let mut paths = Vec::new();
    let mut records = nul_records(output);
    while let Some(record) = records.next() {
        let Some((status, path)) = record.split_at_checked(3) else {
            continue;
        };
        paths.extend(decode_path(path));
        if matches!(status.first().copied(), Some(b'R' | b'C'))
            && let Some(source) = records.next()
        {
            paths.extend(decode_path(source));
        }
    }
    paths
}

/// Whether `rev` looks like a git object id of any hash algorithm.
fn is_object_id(rev: &str) -> bool {
    !rev.is_empty() && rev.chars().all(|c| c.is_ascii_hexdigit())
}

impl TestTree for GitTree {
    fn current_rev(&self) -> Result<Option<Revision>, TreeError> {
        let rev = self.git_line(&["rev-parse", "--verify", "HEAD"])?;
        if is_object_id(&rev) {
            Ok(Some(Revision::from(rev)))
        } else {
            Err(TreeError::InvalidRevision(rev))
        }
    }

    fn committed_changes(&self, old_rev: Option<&Revision>) -> Result<BTreeSet<String>, TreeError> {
        let output = match old_rev {
            None => self.git(&["ls-tree", "-r", "-z", "--name-only", "--full-tree", "HEAD"])?,
            Some(rev) => self.git(&[
                "diff",
                "--name-only",
                "-z",
                "--no-renames",
                rev.as_str(),
                "HEAD",
            ])?,
        };
        let changed = self.relativize(nul_records(&output).filter_map(decode_path))?;
        debug!("{} committed change(s)", changed.len());
        Ok(changed)
    }

    fn local_changes(&self) -> Result<Option<BTreeSet<String>>, TreeError> {
        let output = self.git(&["status", "--porcelain", "-z", "--untracked-files=all"])?;
        let changed = self.relativize(parse_porcelain(&output))?;
        debug!("{} local change(s)", changed.len());
        Ok(Some(changed))
    }
}

/// A tests root outside version control: every query reports the whole tree.
pub struct NoVcsTree {
    root: PathBuf,
}

impl NoVcsTree {
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// All regular files below the root, relative and `/`-separated.
    fn all_files(&self) -> Result<BTreeSet<String>, TreeError> {
        let root = self
            .root
            .to_str()
            .ok_or_else(|| TreeError::NonUtf8Path(self.root.clone()))?;
        let pattern = format!("{}/**/*", Pattern::escape(root.trim_end_matches('/')));
        let options = MatchOptions {
            require_literal_leading_dot: false,
            ..MatchOptions::new()
        };

        let mut files = BTreeSet::new();
        for entry in glob_with(&pattern, options)? {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            if let Ok(rel) = path.strip_prefix(&self.root)
                && let Some(rel) = rel.to_str()
            {
                files.insert(rel.replace('\\', "/"));
            }
        }
        Ok(files)
    }
}

impl TestTree for NoVcsTree {
    fn current_rev(&self) -> Result<Option<Revision>, TreeError> {
        Ok(None)
    }

    fn committed_changes(
        &self,
        _old_rev: Option<&Revision>,
    ) -> Result<BTreeSet<String>, TreeError> {
        let files = self.all_files()?;
        debug!("{} file(s) under {}", files.len(), self.root.display());
        Ok(files)
    }

    fn local_changes(&self) -> Result<Option<BTreeSet<String>>, TreeError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn porcelain_plain_entries() {
        let output = b" M a/test.html\0?? c/new.html\0";
        assert_eq!(parse_porcelain(output), vec!["a/test.html", "c/new.html"]);
    }

    #[test]
    fn porcelain_rename_reports_both_sides() {
        let output = b"R  b/new.html\0b/old.html\0 D d/gone.html\0";
        assert_eq!(
            parse_porcelain(output),
            vec!["b/new.html", "b/old.html", "d/gone.html"]
        );
    }

    #[test]
    fn porcelain_empty_output() {
        assert!(parse_porcelain(b"").is_empty());
    }

    #[test]
    fn porcelain_skips_non_utf8_paths() {
        let output = b"?? a/bad\xff.png\0 M a/test.html\0";
        assert_eq!(parse_porcelain(output), vec!["a/test.html"]);
    }

    #[test]
    fn porcelain_rename_keeps_record_alignment_around_non_utf8_path() {
        let output = b"R  b/new\xff.html\0b/old.html\0 M a/test.html\0";
        assert_eq!(parse_porcelain(output), vec!["b/old.html", "a/test.html"]);
    }

    #[test]
    fn nul_records_decode_each_path_independently() {
        let output = b"a/test.html\0a/bad\xff.png\0b/test.html\0";
        let paths: Vec<&str> = nul_records(output).filter_map(decode_path).collect();
        assert_eq!(paths, vec!["a/test.html", "b/test.html"]);
    }

    #[test]
    fn object_ids_of_any_length_are_accepted() {
        assert!(is_object_id("a1b2c3d4e5f6789012345678901234567890abcd"));
        assert!(is_object_id(&"0f".repeat(32)));
        assert!(!is_object_id(""));
        assert!(!is_object_id("HEAD"));
    }

    #[test]
    fn no_vcs_tree_lists_every_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/test.html"), "").unwrap();
        fs::write(dir.path().join("a/b/deep.html"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();

        let tree = NoVcsTree::new(dir.path());
        let files = tree.committed_changes(None).unwrap();
        let expected: BTreeSet<String> = ["a/test.html", "a/b/deep.html", ".hidden"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        assert_eq!(files, expected);
    }

    #[test]
    fn no_vcs_tree_ignores_old_rev() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.html"), "").unwrap();

        let tree = NoVcsTree::new(dir.path());
        let rev = Revision::from("0000000000000000000000000000000000000000");
        assert_eq!(tree.committed_changes(Some(&rev)).unwrap().len(), 1);
    }

    #[test]
    fn no_vcs_tree_has_no_revision_or_local_changes() {
        let dir = tempfile::tempdir().unwrap();
        let tree = NoVcsTree::new(dir.path());
        assert!(tree.current_rev().unwrap().is_none());
        assert!(tree.local_changes().unwrap().is_none());
    }
}
