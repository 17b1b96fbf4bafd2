use log::info;
use thiserror::Error;

use crate::config::Config;
use crate::domain::Manifest;
use crate::infrastructure::{FileManifest, ManifestError};

use super::update::{UpdateError, UpdateSummary};

/// Errors that can occur during command orchestration
#[derive(Debug, Error)]
pub enum AppError {
    /// The manifest store encountered an error.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The update cycle failed.
    #[error(transparent)]
    Update(#[from] UpdateError),
}

/// Load the manifest, bring it up to date with the tests root and write it back.
///
/// With `rebuild` set, or when no manifest file exists yet, indexing starts from
/// an empty manifest. The file is only written after the cycle succeeds.
///
/// # Errors
///
/// Returns [`AppError::Manifest`] if the manifest cannot be loaded or saved.
/// Returns [`AppError::Update`] if the update cycle fails.
pub fn update(config: &Config) -> Result<UpdateSummary, AppError> {
    let store = FileManifest::new(&config.manifest_path);

    let mut manifest = if config.rebuild || !store.path().exists() {
        info!("Building manifest from scratch");
        Manifest::new(&config.url_base)
    } else {
        store.load()?
    };

    info!("Updating manifest for {}", config.tests_root.display());
    let summary = super::update::update(
        &mut manifest,
        &config.tests_root,
        &config.url_base,
        config.ignore_local,
    )?;

    store.save(&manifest)?;
    info!("{summary}");
    Ok(summary)
}
