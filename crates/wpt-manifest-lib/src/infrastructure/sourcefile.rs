use log::debug;
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::domain::url::{rel_path_to_url, resolve_href};
use crate::domain::{
    ClassifyError, Classifier, ManifestItem, RefTest, RefType, TestharnessTest, UrlItem,
    WebdriverSpecTest,
};

use super::manifest::MANIFEST_FILE_NAME;

/// Directory names whose contents are never tests.
const NON_TEST_DIRS: [&str; 4] = ["resources", "support", "tools", "common"];

/// File extensions inspected as markup documents.
const MARKUP_EXTENSIONS: [&str; 6] = ["html", "htm", "xhtml", "xht", "svg", "xml"];

/// URL suffixes served for a `.any.js` script.
const ANY_VARIANTS: &[&str] = &[".any.html", ".any.worker.html"];

/// URL suffix served for a `.worker.js` script.
const WORKER_VARIANTS: &[&str] = &[".worker"];

/// Classifier reading test files from disk and applying file name and content heuristics
pub struct FileClassifier {
    tests_root: PathBuf,
    url_base: String,
    tag_re: Regex,
    attr_re: Regex,
    meta_timeout_re: Regex,
}

/// Test markers extracted from a markup document.
#[derive(Debug, Default)]
struct Markup {
    testharness: bool,
    timeout: Option<String>,
    references: Vec<(String, RefType)>,
}

impl FileClassifier {
    /// Create a classifier for the tree at `tests_root` mounted at `url_base`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::Regex`] if a content pattern fails to compile.
    pub fn new(tests_root: &Path, url_base: &str) -> Result<Self, ClassifyError> {
        Ok(Self {
            tests_root: tests_root.to_path_buf(),
            url_base: url_base.to_owned(),
            tag_re: Regex::new(r"(?is)<(meta|link|script)\b([^>]*)>")?,
            attr_re: Regex::new(
                r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
            )?,
            meta_timeout_re: Regex::new(r"(?m)^//\s*META:\s*timeout\s*=\s*(\S+)")?,
        })
    }

    fn url_for(&self, rel_path: &str) -> String {
        rel_path_to_url(rel_path, &self.url_base)
    }

    fn testharness(&self, url: &str, timeout: Option<&str>) -> ManifestItem {
        ManifestItem::Testharness(TestharnessTest::new(url, &self.url_base, timeout))
    }

    fn read(&self, path: &Path) -> Result<String, ClassifyError> {
        let bytes = fs::read(path).map_err(|source| ClassifyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Parse the `<meta>`, `<link>` and `<script>` tags of a document.
    fn scan_markup(&self, content: &str, url: &str) -> Markup {
        let mut markup = Markup::default();

        for tag in self.tag_re.captures_iter(content) {
            let (Some(name), Some(attrs)) = (tag.get(1), tag.get(2)) else {
                continue;
            };
            let attrs = self.attributes(attrs.as_str());
            let attr = |wanted: &str| {
                attrs
                    .iter()
                    .find(|(key, _)| key == wanted)
                    .map(|(_, value)| value.as_str())
            };

            match name.as_str().to_ascii_lowercase().as_str() {
                "meta" => {
                    if attr("name").is_some_and(|n| n.eq_ignore_ascii_case("timeout"))
                        && attr("content").is_some_and(|c| c.eq_ignore_ascii_case("long"))
                    {
                        markup.timeout = Some("long".to_owned());
                    }
                }
                "script" => {
                    if attr("src").is_some_and(|src| src.ends_with("testharness.js")) {
                        markup.testharness = true;
                    }
                }
                "link" => {
                    let (Some(rel), Some(href)) = (attr("rel"), attr("href")) else {
                        continue;
                    };
                    for rel in rel.split_ascii_whitespace() {
                        let ref_type = if rel.eq_ignore_ascii_case("match") {
                            RefType::Match
                        } else if rel.eq_ignore_ascii_case("mismatch") {
                            RefType::Mismatch
                        } else {
                            continue;
                        };
                        markup.references.push((resolve_href(url, href), ref_type));
                    }
                }
                _ => {}
            }
        }

        markup
    }

    /// Lowercased attribute names with their unquoted values, in source order.
    fn attributes(&self, attrs: &str) -> Vec<(String, String)> {
        self.attr_re
            .captures_iter(attrs)
            .filter_map(|cap| {
                let name = cap.get(1)?.as_str().to_ascii_lowercase();
                let value = cap.get(2).or_else(|| cap.get(3)).or_else(|| cap.get(4))?;
                Some((name, value.as_str().to_owned()))
            })
            .collect()
    }

    fn classify_script(
        &self,
        rel_path: &str,
        full_path: &Path,
    ) -> Result<Vec<ManifestItem>, ClassifyError> {
        let (base, variants) = if let Some(base) = rel_path.strip_suffix(".any.js") {
            (base, ANY_VARIANTS)
        } else if let Some(base) = rel_path.strip_suffix(".worker.js") {
            (base, WORKER_VARIANTS)
        } else {
            return Ok(Vec::new());
        };

        let content = self.read(full_path)?;
        let timeout = self
            .meta_timeout_re
            .captures(&content)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str());

        Ok(variants
            .iter()
            .map(|variant| self.testharness(&self.url_for(&format!("{base}{variant}")), timeout))
            .collect())
    }

    fn classify_markup(
        &self,
        rel_path: &str,
        full_path: &Path,
        stem: &str,
        dirs: &[&str],
    ) -> Result<Vec<ManifestItem>, ClassifyError> {
        let url = self.url_for(rel_path);

        if stem.ends_with("-manual") {
            return Ok(vec![ManifestItem::Manual(UrlItem::new(&url, &self.url_base))]);
        }
        if stem.ends_with("-stub") {
            return Ok(vec![ManifestItem::Stub(UrlItem::new(&url, &self.url_base))]);
        }

        let content = self.read(full_path)?;
        let markup = self.scan_markup(&content, &url);
        let item_error = |source| ClassifyError::Item {
            path: rel_path.to_owned(),
            source,
        };

        if markup.testharness {
            return Ok(vec![self.testharness(&url, markup.timeout.as_deref())]);
        }

        if !markup.references.is_empty() {
            let references: Vec<(&str, &str)> = markup
                .references
                .iter()
                .map(|(ref_url, ref_type)| (ref_url.as_str(), ref_type.as_str()))
                .collect();
            let test = RefTest::new(&url, &self.url_base, &references)
                .map_err(item_error)?
                .with_timeout(markup.timeout.as_deref());
            return Ok(vec![ManifestItem::RefTest(test)]);
        }

        let named_as_reference = stem.ends_with("-ref")
            || stem.starts_with("ref-")
            || dirs.iter().any(|dir| *dir == "reference");
        if named_as_reference {
            let references: [(&str, &str); 0] = [];
            let test = RefTest::new(&url, &self.url_base, &references)
                .map_err(item_error)?
                .with_timeout(markup.timeout.as_deref())
                .with_is_reference(true);
            return Ok(vec![ManifestItem::RefTest(test)]);
        }

        Ok(Vec::new())
    }

    fn items_for(
        &self,
        rel_path: &str,
        full_path: &Path,
    ) -> Result<Vec<ManifestItem>, ClassifyError> {
        let components: Vec<&str> = rel_path.split('/').collect();
        let Some((name, dirs)) = components.split_last() else {
            return Ok(Vec::new());
        };

        let hidden = components
            .iter()
            .any(|part| part.starts_with('.') || part.starts_with('_'));
        let support = dirs.iter().any(|dir| NON_TEST_DIRS.contains(dir));
        if hidden || support || *name == MANIFEST_FILE_NAME {
            return Ok(Vec::new());
        }

        let Some((stem, ext)) = name.rsplit_once('.') else {
            return Ok(Vec::new());
        };
        let ext = ext.to_ascii_lowercase();

        if ext == "py" {
            let in_webdriver = dirs.first().is_some_and(|dir| *dir == "webdriver");
            if in_webdriver && name.starts_with("test_") {
                return Ok(vec![ManifestItem::Wdspec(WebdriverSpecTest::new(rel_path))]);
            }
            return Ok(Vec::new());
        }

        if ext == "js" {
            return self.classify_script(rel_path, full_path);
        }

        if MARKUP_EXTENSIONS.contains(&ext.as_str()) {
            return self.classify_markup(rel_path, full_path, stem, dirs);
        }

        Ok(Vec::new())
    }
}

impl Classifier for FileClassifier {
    fn classify(&self, rel_path: &str) -> Result<Option<Vec<ManifestItem>>, ClassifyError> {
        let full_path = self.tests_root.join(rel_path);
        match fs::metadata(&full_path) {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ClassifyError::Read {
                    path: full_path,
                    source,
                });
            }
        }

        let items = self.items_for(rel_path, &full_path)?;
        debug!("{rel_path}: {} item(s)", items.len());
        Ok(Some(items))
    }

    fn exists(&self, rel_path: &str) -> bool {
        self.tests_root.join(rel_path).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemType;
    use tempfile::TempDir;

    fn write(root: &Path, rel_path: &str, content: &str) {
        let path = root.join(rel_path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn classify(root: &TempDir, rel_path: &str) -> Vec<ManifestItem> {
        FileClassifier::new(root.path(), "/")
            .unwrap()
            .classify(rel_path)
            .unwrap()
            .unwrap()
    }

    fn single(root: &TempDir, rel_path: &str) -> ManifestItem {
        let mut items = classify(root, rel_path);
        assert_eq!(items.len(), 1, "expected one item for {rel_path}");
        items.remove(0)
    }

    const TESTHARNESS: &str = r#"<!doctype html>
<meta name="timeout" content="long">
<script src="/resources/testharness.js"></script>
<script src="/resources/testharnessreport.js"></script>
"#;

    #[test]
    fn missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let classifier = FileClassifier::new(dir.path(), "/").unwrap();
        assert!(classifier.classify("a/missing.html").unwrap().is_none());
        assert!(!classifier.exists("a/missing.html"));
    }

    #[test]
    fn testharness_with_long_timeout() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/test.html", TESTHARNESS);

        let item = single(&dir, "a/test.html");
        assert_eq!(item.item_type(), ItemType::Testharness);
        assert_eq!(item.id(), "/a/test.html");
        assert_eq!(item.timeout(), Some("long"));
    }

    #[test]
    fn url_base_prefixes_identity() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/test.html", TESTHARNESS);

        let items = FileClassifier::new(dir.path(), "/mount/")
            .unwrap()
            .classify("a/test.html")
            .unwrap()
            .unwrap();
        assert_eq!(
            items.iter().map(ManifestItem::id).collect::<Vec<_>>(),
            vec!["/mount/a/test.html"]
        );
    }

    #[test]
    fn reftest_references_in_document_order() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "css/box.html",
            r#"<link rel="match" href="box-ref.html">
<link rel='mismatch' href="../other/not-box.html">"#,
        );

        let ManifestItem::RefTest(test) = single(&dir, "css/box.html") else {
            unreachable!("expected a reftest");
        };
        let refs: Vec<(&str, RefType)> = test
            .references()
            .iter()
            .map(|r| (r.url.as_str(), r.ref_type))
            .collect();
        assert_eq!(
            refs,
            vec![
                ("/css/box-ref.html", RefType::Match),
                ("/other/not-box.html", RefType::Mismatch)
            ]
        );
        assert!(!test.is_reference);
    }

    #[test]
    fn reference_file_by_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "css/box-ref.html", "<p>reference</p>");

        let ManifestItem::RefTest(test) = single(&dir, "css/box-ref.html") else {
            unreachable!("expected a reftest");
        };
        assert!(test.is_reference);
        assert!(test.references().is_empty());
    }

    #[test]
    fn manual_and_stub_by_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/click-manual.html", "");
        write(dir.path(), "a/later-stub.html", "");

        assert_eq!(single(&dir, "a/click-manual.html").item_type(), ItemType::Manual);
        assert_eq!(single(&dir, "a/later-stub.html").item_type(), ItemType::Stub);
    }

    #[test]
    fn any_js_yields_window_and_worker_tests() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "fetch/api.any.js", "// META: timeout=long\ntest(() => {});\n");

        let mut ids: Vec<String> = classify(&dir, "fetch/api.any.js")
            .iter()
            .map(|item| item.id().to_owned())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["/fetch/api.any.html", "/fetch/api.any.worker.html"]);
    }

    #[test]
    fn worker_js_drops_extension() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workers/basic.worker.js", "test(() => {});\n");

        let item = single(&dir, "workers/basic.worker.js");
        assert_eq!(item.id(), "/workers/basic.worker");
        assert_eq!(item.timeout(), None);
    }

    #[test]
    fn webdriver_tests_use_path_identity() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "webdriver/navigation/test_get.py", "def test_get(): pass\n");
        write(dir.path(), "webdriver/navigation/helpers.py", "");

        let item = single(&dir, "webdriver/navigation/test_get.py");
        assert_eq!(item.item_type(), ItemType::Wdspec);
        assert_eq!(item.id(), "webdriver/navigation/test_get.py");
        assert!(classify(&dir, "webdriver/navigation/helpers.py").is_empty());
    }

    #[test]
    fn support_and_hidden_files_are_not_tests() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/resources/helper.html", TESTHARNESS);
        write(dir.path(), ".git/config.html", TESTHARNESS);
        write(dir.path(), "a/_private.html", TESTHARNESS);
        write(dir.path(), "MANIFEST.json", "{}");

        for path in [
            "a/resources/helper.html",
            ".git/config.html",
            "a/_private.html",
            "MANIFEST.json",
        ] {
            assert!(classify(&dir, path).is_empty(), "{path} should not be a test");
        }
    }

    #[test]
    fn plain_document_is_not_a_test() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/readme.html", "<p>hello</p>");
        write(dir.path(), "a/notes.txt", "hello");

        assert!(classify(&dir, "a/readme.html").is_empty());
        assert!(classify(&dir, "a/notes.txt").is_empty());
    }
}
