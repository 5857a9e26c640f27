//! Package manifest support for multi-target builds
//!
//! Reads the handful of `package.json` fields the exclusion policy cares
//! about (`main`, `module`, `browser`) and finds the package that owns a
//! resolved file.

pub mod lookup;
pub mod manifest;

pub use lookup::{
    normalize_path, FsPackageLookup, InMemoryPackageLookup, PackageDescriptor, PackageLookup,
};
pub use manifest::{BrowserField, PackageManifest, MANIFEST_FILE_NAME};

use std::path::PathBuf;

/// Package manifest errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Failed to parse manifest {path}: {error}")]
    ParseError {
        path: PathBuf,
        error: serde_json::Error,
    },

    #[error("IO error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PackageError>;
