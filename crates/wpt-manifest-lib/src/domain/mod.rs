pub mod classify;
pub mod item;
pub mod manifest;
pub mod revision;
pub mod tree;
pub mod url;

pub use classify::{ClassifyError, Classifier};
pub use item::{
    ItemError, ItemKey, ItemType, ManifestItem, RefTest, RefType, Reference, TestharnessTest,
    UrlItem, WebdriverSpecTest,
};
pub use manifest::Manifest;
pub use revision::Revision;
pub use tree::{TestTree, TreeError};
