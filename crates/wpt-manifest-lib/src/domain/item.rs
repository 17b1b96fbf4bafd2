use serde::Deserialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

use super::url::url_to_rel_path;

/// Errors raised while building or decoding a single manifest item
#[derive(Debug, Error)]
pub enum ItemError {
    /// A reference used a comparison operator other than `==` or `!=`.
    #[error("unrecognised reference type {ref_type:?} (expected \"==\" or \"!=\")")]
    InvalidReferenceType { ref_type: String },

    /// A serialized record carried a type tag with no matching variant.
    #[error("unknown item type {tag:?}")]
    UnknownItemType { tag: String },

    /// A serialized record is missing fields its variant requires.
    #[error("malformed {item_type} item")]
    MalformedItem {
        item_type: ItemType,
        #[source]
        source: serde_json::Error,
    },
}

/// The harness type of a manifest item, also its serialized tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemType {
    Testharness,
    RefTest,
    Manual,
    Stub,
    Wdspec,
}

impl ItemType {
    /// Every variant, in serialization order.
    pub const ALL: [Self; 5] = [
        Self::Testharness,
        Self::RefTest,
        Self::Manual,
        Self::Stub,
        Self::Wdspec,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Testharness => "testharness",
            Self::RefTest => "reftest",
            Self::Manual => "manual",
            Self::Stub => "stub",
            Self::Wdspec => "wdspec",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = ItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|item_type| item_type.as_str() == s)
            .ok_or_else(|| ItemError::UnknownItemType { tag: s.to_owned() })
    }
}

/// Identity of an item: equality, hashing and ordering all go through this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub item_type: ItemType,
    pub id: String,
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.item_type, self.id)
    }
}

/// How a reftest compares against one of its references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefType {
    /// `==`: rendering must match.
    Match,
    /// `!=`: rendering must differ.
    Mismatch,
}

impl RefType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Match => "==",
            Self::Mismatch => "!=",
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefType {
    type Err = ItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Self::Match),
            "!=" => Ok(Self::Mismatch),
            other => Err(ItemError::InvalidReferenceType {
                ref_type: other.to_owned(),
            }),
        }
    }
}

/// One `(reference_url, comparison)` entry of a reftest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub url: String,
    pub ref_type: RefType,
}

/// A test addressed by URL with no extra attributes (manual tests and stubs).
#[derive(Debug, Clone)]
pub struct UrlItem {
    pub url: String,
    pub url_base: String,
}

impl UrlItem {
    #[must_use]
    pub fn new(url: &str, url_base: &str) -> Self {
        Self {
            url: url.to_owned(),
            url_base: url_base.to_owned(),
        }
    }
}

/// A script-driven test using testharness.js.
#[derive(Debug, Clone)]
pub struct TestharnessTest {
    pub url: String,
    pub url_base: String,
    pub timeout: Option<String>,
}

impl TestharnessTest {
    #[must_use]
    pub fn new(url: &str, url_base: &str, timeout: Option<&str>) -> Self {
        Self {
            url: url.to_owned(),
            url_base: url_base.to_owned(),
            timeout: timeout.map(str::to_owned),
        }
    }
}

/// A visual comparison test, or a reference file used by one.
#[derive(Debug, Clone)]
pub struct RefTest {
    pub url: String,
    pub url_base: String,
    references: Vec<Reference>,
    pub timeout: Option<String>,
    pub is_reference: bool,
}

impl RefTest {
    /// Build a reftest from `(url, operator)` pairs, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::InvalidReferenceType`] if any operator is not `==` or `!=`.
    pub fn new<U, O>(url: &str, url_base: &str, references: &[(U, O)]) -> Result<Self, ItemError>
    where
        U: AsRef<str>,
        O: AsRef<str>,
    {
        let references = references
            .iter()
            .map(|(ref_url, ref_type)| {
                Ok(Reference {
                    url: ref_url.as_ref().to_owned(),
                    ref_type: ref_type.as_ref().parse()?,
                })
            })
            .collect::<Result<Vec<_>, ItemError>>()?;

        Ok(Self {
            url: url.to_owned(),
            url_base: url_base.to_owned(),
            references,
            timeout: None,
            is_reference: false,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<&str>) -> Self {
        self.timeout = timeout.map(str::to_owned);
        self
    }

    #[must_use]
    pub fn with_is_reference(mut self, is_reference: bool) -> Self {
        self.is_reference = is_reference;
        self
    }

    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }
}

/// A webdriver protocol test, identified by its file path rather than a URL.
#[derive(Debug, Clone)]
pub struct WebdriverSpecTest {
    pub path: String,
}

impl WebdriverSpecTest {
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_owned(),
        }
    }
}

/// A single entry of the manifest.
///
/// Two items are equal when their [`ItemKey`]s are equal; every other field
/// (timeouts, references, URL base) is ignored by `Eq`, `Hash` and `Ord`.
#[derive(Debug, Clone)]
pub enum ManifestItem {
    Testharness(TestharnessTest),
    RefTest(RefTest),
    Manual(UrlItem),
    Stub(UrlItem),
    Wdspec(WebdriverSpecTest),
}

// ---- wire records ----

#[derive(Deserialize)]
struct UrlRecord {
    url: String,
}

#[derive(Deserialize)]
struct TestharnessRecord {
    url: String,
    #[serde(default)]
    timeout: Option<String>,
}

#[derive(Deserialize)]
struct RefTestRecord {
    url: String,
    references: Vec<(String, String)>,
    #[serde(default)]
    timeout: Option<String>,
    #[serde(default)]
    is_reference: bool,
}

#[derive(Deserialize)]
struct WdspecRecord {
    path: String,
}

fn decode<'de, T: Deserialize<'de>>(item_type: ItemType, obj: &'de Value) -> Result<T, ItemError> {
    T::deserialize(obj).map_err(|source| ItemError::MalformedItem { item_type, source })
}

impl ManifestItem {
    #[must_use]
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Testharness(_) => ItemType::Testharness,
            Self::RefTest(_) => ItemType::RefTest,
            Self::Manual(_) => ItemType::Manual,
            Self::Stub(_) => ItemType::Stub,
            Self::Wdspec(_) => ItemType::Wdspec,
        }
    }

    /// The external identity: a URL, or the raw path for wdspec tests.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Testharness(test) => &test.url,
            Self::RefTest(test) => &test.url,
            Self::Manual(test) | Self::Stub(test) => &test.url,
            Self::Wdspec(test) => &test.path,
        }
    }

    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey {
            item_type: self.item_type(),
            id: self.id().to_owned(),
        }
    }

    fn key_ref(&self) -> (ItemType, &str) {
        (self.item_type(), self.id())
    }

    /// The URL of URL-addressed variants.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Testharness(test) => Some(test.url.as_str()),
            Self::RefTest(test) => Some(test.url.as_str()),
            Self::Manual(test) | Self::Stub(test) => Some(test.url.as_str()),
            Self::Wdspec(_) => None,
        }
    }

    /// The tests-root relative path of the file the item was found in.
    ///
    /// URL-addressed items strip their URL base; wdspec items store the path.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Testharness(test) => url_to_rel_path(&test.url, &test.url_base),
            Self::RefTest(test) => url_to_rel_path(&test.url, &test.url_base),
            Self::Manual(test) | Self::Stub(test) => url_to_rel_path(&test.url, &test.url_base),
            Self::Wdspec(test) => test.path.clone(),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Option<&str> {
        match self {
            Self::Testharness(test) => test.timeout.as_deref(),
            Self::RefTest(test) => test.timeout.as_deref(),
            Self::Manual(_) | Self::Stub(_) | Self::Wdspec(_) => None,
        }
    }

    /// Serialize the item's own fields. The type tag is carried by the caller.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut record = Map::new();
        match self {
            Self::Testharness(test) => {
                record.insert("url".to_owned(), Value::from(test.url.as_str()));
                if let Some(timeout) = &test.timeout {
                    record.insert("timeout".to_owned(), Value::from(timeout.as_str()));
                }
            }
            Self::RefTest(test) => {
                record.insert("url".to_owned(), Value::from(test.url.as_str()));
                let references = test
                    .references
                    .iter()
                    .map(|reference| {
                        Value::Array(vec![
                            Value::from(reference.url.as_str()),
                            Value::from(reference.ref_type.as_str()),
                        ])
                    })
                    .collect();
                record.insert("references".to_owned(), Value::Array(references));
                if let Some(timeout) = &test.timeout {
                    record.insert("timeout".to_owned(), Value::from(timeout.as_str()));
                }
                if test.is_reference {
                    record.insert("is_reference".to_owned(), Value::Bool(true));
                }
            }
            Self::Manual(test) | Self::Stub(test) => {
                record.insert("url".to_owned(), Value::from(test.url.as_str()));
            }
            Self::Wdspec(test) => {
                record.insert("path".to_owned(), Value::from(test.path.as_str()));
            }
        }
        Value::Object(record)
    }

    /// Decode a record stored under `tag`, using the manifest's `url_base`.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::UnknownItemType`] for an unregistered tag,
    /// [`ItemError::MalformedItem`] if required fields are missing, and
    /// [`ItemError::InvalidReferenceType`] for a reftest with a bad operator.
    pub fn from_json(tag: &str, url_base: &str, obj: &Value) -> Result<Self, ItemError> {
        let item_type: ItemType = tag.parse()?;
        let item = match item_type {
            ItemType::Testharness => {
                let record: TestharnessRecord = decode(item_type, obj)?;
                Self::Testharness(TestharnessTest::new(
                    &record.url,
                    url_base,
                    record.timeout.as_deref(),
                ))
            }
            ItemType::RefTest => {
                let record: RefTestRecord = decode(item_type, obj)?;
                let test = RefTest::new(&record.url, url_base, &record.references)?
                    .with_timeout(record.timeout.as_deref())
                    .with_is_reference(record.is_reference);
                Self::RefTest(test)
            }
            ItemType::Manual => {
                let record: UrlRecord = decode(item_type, obj)?;
                Self::Manual(UrlItem::new(&record.url, url_base))
            }
            ItemType::Stub => {
                let record: UrlRecord = decode(item_type, obj)?;
                Self::Stub(UrlItem::new(&record.url, url_base))
            }
            ItemType::Wdspec => {
                let record: WdspecRecord = decode(item_type, obj)?;
                Self::Wdspec(WebdriverSpecTest::new(&record.path))
            }
        };
        Ok(item)
    }
}

impl PartialEq for ManifestItem {
    fn eq(&self, other: &Self) -> bool {
        self.key_ref() == other.key_ref()
    }
}

impl Eq for ManifestItem {}

impl Hash for ManifestItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_ref().hash(state);
    }
}

impl PartialOrd for ManifestItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ManifestItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key_ref().cmp(&other.key_ref())
    }
}

impl fmt::Display for ManifestItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.item_type(), self.id())
    }
}
