//! Owning-package lookup for resolved files
//!
//! The nearest ancestor directory containing a `package.json` owns a file.
//! Lookups never fail: an unreadable or malformed manifest is logged and
//! treated as "no owning package".

use crate::manifest::{PackageManifest, MANIFEST_FILE_NAME};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A package root together with its parsed manifest
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    /// Directory containing the manifest
    pub root: PathBuf,
    /// Parsed manifest
    pub manifest: PackageManifest,
}

impl PackageDescriptor {
    pub fn new(root: impl Into<PathBuf>, manifest: PackageManifest) -> Self {
        Self {
            root: normalize_path(&root.into()),
            manifest,
        }
    }

    /// Absolute paths of the files declared by `main` / `browser`.
    ///
    /// Entries written without an extension also match their `.js` file,
    /// following the node resolution convention.
    pub fn prebuilt_entry_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for entry in self.manifest.prebuilt_entries() {
            let path = normalize_path(&self.root.join(entry));
            if path.extension().is_none() {
                paths.push(path.with_extension("js"));
            }
            paths.push(path);
        }
        paths
    }

    /// Whether `file` is exactly one of the package's pre-built entry files
    pub fn is_prebuilt_entry(&self, file: &Path) -> bool {
        let file = normalize_path(file);
        self.prebuilt_entry_paths().iter().any(|entry| *entry == file)
    }
}

/// Finds the package that owns a resolved file
pub trait PackageLookup: Send + Sync {
    fn lookup(&self, file: &Path) -> Option<Arc<PackageDescriptor>>;
}

/// Lexically normalize a path: drop `.` components and fold `..`
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Filesystem-backed lookup, caching one result per directory
#[derive(Debug, Default)]
pub struct FsPackageLookup {
    cache: Mutex<HashMap<PathBuf, Option<Arc<PackageDescriptor>>>>,
}

impl FsPackageLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all cached manifests (call when a watch cycle sees manifest edits)
    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// `None` when `dir` has no manifest. A manifest that cannot be read
    /// still ends the search, with no owner.
    fn read_dir_manifest(dir: &Path) -> Option<Option<Arc<PackageDescriptor>>> {
        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        if !manifest_path.is_file() {
            return None;
        }
        match PackageManifest::from_file(&manifest_path) {
            Ok(manifest) => Some(Some(Arc::new(PackageDescriptor::new(dir, manifest)))),
            Err(error) => {
                tracing::debug!(%error, "ignoring unreadable package manifest");
                Some(None)
            }
        }
    }
}

impl PackageLookup for FsPackageLookup {
    fn lookup(&self, file: &Path) -> Option<Arc<PackageDescriptor>> {
        let file = normalize_path(file);
        let start = file.parent()?;

        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut visited = Vec::new();
        let mut found = None;
        for dir in start.ancestors() {
            if let Some(cached) = cache.get(dir) {
                found = cached.clone();
                break;
            }
            visited.push(dir.to_path_buf());
            if let Some(descriptor) = Self::read_dir_manifest(dir) {
                found = descriptor;
                break;
            }
        }

        for dir in visited {
            cache.insert(dir, found.clone());
        }
        found
    }
}

/// Lookup over a fixed set of packages, for hosts that already hold
/// package metadata in memory
#[derive(Debug, Default, Clone)]
pub struct InMemoryPackageLookup {
    packages: Vec<Arc<PackageDescriptor>>,
}

impl InMemoryPackageLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package rooted at `root`
    pub fn with_package(mut self, root: impl Into<PathBuf>, manifest: PackageManifest) -> Self {
        self.packages
            .push(Arc::new(PackageDescriptor::new(root, manifest)));
        self
    }
}

impl PackageLookup for InMemoryPackageLookup {
    fn lookup(&self, file: &Path) -> Option<Arc<PackageDescriptor>> {
        let file = normalize_path(file);
        // Deepest root wins, the same way the nearest package.json does.
        self.packages
            .iter()
            .filter(|package| file.starts_with(&package.root))
            .max_by_key(|package| package.root.components().count())
            .cloned()
    }
}
