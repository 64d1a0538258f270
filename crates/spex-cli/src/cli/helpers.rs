use super::CliError;
use anyhow::Context;
use spex_core::ogip::{Arf, Pha, Rmf};
use spex_core::table::JsonTabularStore;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Normalise an output filename to the expected extension, warning when the
/// user supplied something else.
pub(super) fn ensure_extension(path: &Path, extension: &str) -> PathBuf {
    match path.extension() {
        Some(current) if current == extension => path.to_path_buf(),
        _ => {
            warn!(
                path = %path.display(),
                "output filename does not have the .{extension} extension, renaming"
            );
            path.with_extension(extension)
        }
    }
}

pub(super) fn open_store(path: &Path) -> Result<JsonTabularStore, CliError> {
    JsonTabularStore::open(path)
        .map_err(spex_core::domain::SpexError::from)
        .map_err(CliError::from)
}

pub(super) fn save_store(
    store: &JsonTabularStore,
    path: &Path,
    overwrite: bool,
) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
    }
    store
        .save(path, overwrite)
        .map_err(spex_core::domain::SpexError::from)
        .map_err(CliError::from)
}

pub(super) fn read_pha(path: &Path) -> Result<Pha, CliError> {
    let store = open_store(path)?;
    Pha::read_from(&store).map_err(CliError::from)
}

pub(super) fn read_rmf(path: &Path) -> Result<Rmf, CliError> {
    let store = open_store(path)?;
    Rmf::read_from(&store).map_err(CliError::from)
}

pub(super) fn read_arf(path: &Path) -> Result<Arf, CliError> {
    let store = open_store(path)?;
    Arf::read_from(&store).map_err(CliError::from)
}
