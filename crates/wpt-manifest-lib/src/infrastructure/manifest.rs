use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::domain::{ItemError, ManifestItem, Manifest, Revision};

pub const MANIFEST_FILE_NAME: &str = "MANIFEST.json";

/// Errors that can occur when working with manifest files
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest file: {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "invalid item for {item_path} in manifest file {}; \
         run with --rebuild to regenerate it",
        path.display()
    )]
    Item {
        path: PathBuf,
        item_path: String,
        #[source]
        source: ItemError,
    },

    #[error("failed to write manifest file: {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize manifest to JSON")]
    Serialize(#[source] serde_json::Error),
}

// ---- JSON wire types ----

fn default_url_base() -> String {
    "/".to_owned()
}

/// `item_type → relative path → serialized items`
type WireItems = BTreeMap<String, BTreeMap<String, Vec<Value>>>;

#[derive(Debug, Deserialize, Serialize)]
struct ManifestData {
    #[serde(default)]
    rev: Option<String>,
    #[serde(default = "default_url_base")]
    url_base: String,
    #[serde(default)]
    items: WireItems,
}

// ---- conversion ----

/// Parse manifest JSON content into a `Manifest` domain entity.
///
/// # Errors
///
/// Returns [`ManifestError::Parse`] if the content is not a manifest document, or
/// [`ManifestError::Item`] if a stored record cannot be decoded.
pub fn parse_manifest(content: &str, path: &Path) -> Result<Manifest, ManifestError> {
    let data: ManifestData =
        serde_json::from_str(content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut items: HashMap<String, HashSet<ManifestItem>> = HashMap::new();
    for (tag, by_path) in &data.items {
        for (item_path, records) in by_path {
            for record in records {
                let item = ManifestItem::from_json(tag, &data.url_base, record).map_err(
                    |source| ManifestError::Item {
                        path: path.to_path_buf(),
                        item_path: item_path.clone(),
                        source,
                    },
                )?;
                items.entry(item_path.clone()).or_default().replace(item);
            }
        }
    }

    Ok(Manifest::from_parts(
        data.rev.map(Revision::from),
        &data.url_base,
        items,
    ))
}

fn manifest_to_data(manifest: &Manifest) -> ManifestData {
    let mut items: WireItems = BTreeMap::new();
    for (path, set) in manifest.entries() {
        let mut sorted: Vec<&ManifestItem> = set.iter().collect();
        sorted.sort_unstable();
        for item in sorted {
            items
                .entry(item.item_type().as_str().to_owned())
                .or_default()
                .entry(path.to_owned())
                .or_default()
                .push(item.to_json());
        }
    }

    ManifestData {
        rev: manifest.rev().map(|rev| rev.as_str().to_owned()),
        url_base: manifest.url_base().to_owned(),
        items,
    }
}

/// Render a `Manifest` as pretty-printed JSON with a trailing newline.
///
/// # Errors
///
/// Returns [`ManifestError::Serialize`] if serialization fails.
pub fn serialize_manifest(manifest: &Manifest) -> Result<String, ManifestError> {
    let data = manifest_to_data(manifest);
    let mut content = serde_json::to_string_pretty(&data).map_err(ManifestError::Serialize)?;
    content.push('\n');
    Ok(content)
}

// ---- FileManifest ----

/// Manifest persisted as a JSON file
pub struct FileManifest {
    path: PathBuf,
}

impl FileManifest {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// The path this store reads from and writes to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest, returning an empty one if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(&self) -> Result<Manifest, ManifestError> {
        if !self.path.exists() {
            return Ok(Manifest::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| ManifestError::Read {
            path: self.path.clone(),
            source,
        })?;

        parse_manifest(&content, &self.path)
    }

    /// Write the manifest.
    ///
    /// The content goes to a temporary file next to the target which is then
    /// renamed over it, so readers never see a partially written manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be serialized or written.
    pub fn save(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let content = serialize_manifest(manifest)?;
        let write_error = |source| ManifestError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir).map_err(write_error)?;
        file.write_all(content.as_bytes()).map_err(write_error)?;
        file.persist(&self.path)
            .map_err(|err| write_error(err.error))?;

        info!("Manifest updated: {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemType, RefTest, TestharnessTest, UrlItem, WebdriverSpecTest};
    use tempfile::TempDir;

    fn sample_manifest() -> Manifest {
        let mut manifest = Manifest::new("/");
        manifest.advance_rev(Some(Revision::from(
            "a1b2c3d4e5f6789012345678901234567890abcd",
        )));
        manifest.replace(
            "a/test.html",
            [ManifestItem::Testharness(TestharnessTest::new(
                "/a/test.html",
                "/",
                Some("long"),
            ))],
        );
        manifest.replace(
            "b/box.html",
            [ManifestItem::RefTest(
                RefTest::new("/b/box.html", "/", &[("/b/box-ref.html", "==")]).unwrap(),
            )],
        );
        manifest.replace(
            "c/click-manual.html",
            [ManifestItem::Manual(UrlItem::new("/c/click-manual.html", "/"))],
        );
        manifest.replace(
            "webdriver/test_get.py",
            [ManifestItem::Wdspec(WebdriverSpecTest::new(
                "webdriver/test_get.py",
            ))],
        );
        manifest
    }

    #[test]
    fn load_missing_returns_empty() {
        let store = FileManifest::new(Path::new("/nonexistent/path/MANIFEST.json"));
        let manifest = store.load().unwrap();
        assert!(manifest.is_empty());
        assert!(manifest.rev().is_none());
        assert_eq!(manifest.url_base(), "/");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileManifest::new(&dir.path().join(MANIFEST_FILE_NAME));

        let manifest = sample_manifest();
        store.save(&manifest).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.rev(), manifest.rev());
        assert_eq!(
            loaded
                .items_for("a/test.html")
                .and_then(|set| set.iter().next())
                .and_then(ManifestItem::timeout),
            Some("long")
        );
    }

    #[test]
    fn save_groups_items_by_type_then_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        FileManifest::new(&path).save(&sample_manifest()).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            written["items"]["testharness"]["a/test.html"],
            serde_json::json!([{"url": "/a/test.html", "timeout": "long"}])
        );
        assert_eq!(
            written["items"]["wdspec"]["webdriver/test_get.py"],
            serde_json::json!([{"path": "webdriver/test_get.py"}])
        );
        assert_eq!(written["url_base"], "/");
    }

    #[test]
    fn save_output_is_stable() {
        let first = serialize_manifest(&sample_manifest()).unwrap();
        let reparsed = parse_manifest(&first, Path::new(MANIFEST_FILE_NAME)).unwrap();
        let second = serialize_manifest(&reparsed).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with('\n'));
    }

    #[test]
    fn load_existing_json() {
        let content = r#"{
  "rev": null,
  "url_base": "/mount/",
  "items": {
    "stub": {"a/later-stub.html": [{"url": "/mount/a/later-stub.html"}]}
  }
}"#;
        let manifest = parse_manifest(content, Path::new("MANIFEST.json")).unwrap();
        assert_eq!(manifest.url_base(), "/mount/");
        let stubs = manifest.items_of_type(ItemType::Stub);
        assert_eq!(stubs.len(), 1);
    }

    #[test]
    fn load_defaults_missing_fields() {
        let manifest = parse_manifest("{}", Path::new("MANIFEST.json")).unwrap();
        assert!(manifest.is_empty());
        assert_eq!(manifest.url_base(), "/");
    }

    #[test]
    fn load_unknown_item_type_is_error() {
        let content = r#"{"items": {"crashtest": {"a/crash.html": [{"url": "/a/crash.html"}]}}}"#;
        let err = parse_manifest(content, Path::new("MANIFEST.json")).unwrap_err();
        assert!(matches!(
            &err,
            ManifestError::Item {
                source: ItemError::UnknownItemType { .. },
                ..
            }
        ));
        assert!(err.to_string().contains("a/crash.html"), "got: {err}");
        assert!(err.to_string().contains("--rebuild"), "got: {err}");
    }

    #[test]
    fn load_invalid_json_is_parse_error() {
        let err = parse_manifest("not json", Path::new("MANIFEST.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn save_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        fs::write(&path, "stale").unwrap();

        FileManifest::new(&path).save(&Manifest::default()).unwrap();

        let loaded = FileManifest::new(&path).load().unwrap();
        assert!(loaded.is_empty());
    }
}
