//! Pieces of the `cartlink` command-line tool that are worth testing on their
//! own: configuration, the directory-backed ROM library and the offline patch
//! commands.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cartlink_core::catalog::{CatalogSource, DirCatalog, IdentifyError, LookupError};
use cartlink_core::emulator::EmulatorError;
use cartlink_core::patch::PatchError;
use cartlink_core::save_type::InvalidSaveType;
use cartlink_reader::{HttpCatalog, ReaderError, WorkflowError};
use log::debug;
use thiserror::Error;

pub mod config;
pub mod library;
pub mod patching;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Catalog(#[from] LookupError),

    #[error(transparent)]
    Identify(#[from] IdentifyError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    SaveType(#[from] InvalidSaveType),

    #[error(transparent)]
    Emulator(#[from] EmulatorError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

pub fn read_input(path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `data` to `path`, creating missing parent directories.
pub fn write_output(path: &Path, data: &[u8]) -> Result<(), CliError> {
    let io_err = |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, data).map_err(io_err)?;
    debug!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

/// Opens the catalog at `location`: an existing local directory is read
/// directly, anything else is treated as a server URL.
pub fn open_catalog(
    location: &str,
    timeout: Duration,
) -> Result<Box<dyn CatalogSource>, CliError> {
    let path = Path::new(location);
    if !location.contains("://") && path.is_dir() {
        debug!("Catalog: reading documents from {}", path.display());
        return Ok(Box::new(DirCatalog::new(path)));
    }
    Ok(Box::new(HttpCatalog::new(location, timeout)?))
}
