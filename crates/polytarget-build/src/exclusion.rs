//! Exclusion policy: which resolved modules need a per-target transform
//!
//! Decisions depend only on the resolved path, the owning package manifest
//! and static pattern lists. Rules short-circuit in this order:
//!
//! 1. assets that are never transpiled (stylesheets, markup, media)
//! 2. vendor code known to ship browser-ready, then caller patterns
//! 3. the package's own `main` / `browser` entry files

use crate::error::TargetingResult;
use crate::options::compile_patterns;
use polytarget_package::{PackageDescriptor, PackageLookup};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;

/// Asset classes that never go through a script transform
pub const NEVER_TRANSPILE_PATTERNS: &[&str] = &[
    r"\.(?:css|less|s[ac]ss|styl|pcss)$",
    r"\.(?:html?|json|md|txt)$",
    r"\.(?:png|jpe?g|gif|svg|webp|ico|woff2?|ttf|otf|eot)$",
];

/// Vendor code known to already run in every target
pub const KNOWN_EXCLUDED_PATTERNS: &[&str] = &[
    r"/node_modules/core-js/",
    r"/node_modules/regenerator-runtime/",
    r"/node_modules/@babel/runtime(?:-corejs\d)?/",
    r"/node_modules/tslib/",
    r"/node_modules/webpack/buildin/",
    r"/node_modules/(?:webpack-dev-server|webpack-hot-middleware)/client/",
    r"/node_modules/whatwg-fetch/",
];

/// Why a module was excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    NeverTranspile,
    KnownExcluded,
    CallerExcluded,
    PackageEntry,
}

/// Decides whether a resolved module is eligible for per-target transform
pub struct ExclusionPolicy {
    never_transpile: Vec<Regex>,
    known_excluded: Vec<Regex>,
    caller_excluded: Vec<Regex>,
    lookup: Arc<dyn PackageLookup>,
}

impl ExclusionPolicy {
    /// Create a policy with the built-in lists plus `caller_excluded`
    pub fn new(caller_excluded: Vec<Regex>, lookup: Arc<dyn PackageLookup>) -> TargetingResult<Self> {
        Ok(Self {
            never_transpile: compile_patterns("never-transpile", NEVER_TRANSPILE_PATTERNS)?,
            known_excluded: compile_patterns("known-excluded", KNOWN_EXCLUDED_PATTERNS)?,
            caller_excluded,
            lookup,
        })
    }

    /// Exclusion reason for `path` owned by `package`, or `None` when eligible
    pub fn check(&self, path: &Path, package: Option<&PackageDescriptor>) -> Option<Exclusion> {
        let normalized = path.to_string_lossy().replace('\\', "/");

        let reason = if matches_any(&self.never_transpile, &normalized) {
            Some(Exclusion::NeverTranspile)
        } else if matches_any(&self.known_excluded, &normalized) {
            Some(Exclusion::KnownExcluded)
        } else if matches_any(&self.caller_excluded, &normalized) {
            Some(Exclusion::CallerExcluded)
        } else if package.map_or(false, |p| p.is_prebuilt_entry(path)) {
            Some(Exclusion::PackageEntry)
        } else {
            None
        };

        if let Some(reason) = reason {
            tracing::trace!(path = %normalized, ?reason, "module excluded from targeting");
        }
        reason
    }

    /// Like [`check`](Self::check), looking the owning package up when the
    /// caller did not supply it
    pub fn exclusion_for(
        &self,
        path: &Path,
        package: Option<&PackageDescriptor>,
    ) -> Option<Exclusion> {
        match package {
            Some(package) => self.check(path, Some(package)),
            None => {
                let owner = self.lookup.lookup(path);
                self.check(path, owner.as_deref())
            }
        }
    }

    /// Whether `path` should get a per-target transform
    pub fn is_eligible(&self, path: &Path) -> bool {
        self.exclusion_for(path, None).is_none()
    }
}

fn matches_any(patterns: &[Regex], path: &str) -> bool {
    patterns.iter().any(|p| p.is_match(path))
}

impl std::fmt::Debug for ExclusionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusionPolicy")
            .field("caller_excluded", &self.caller_excluded)
            .finish_non_exhaustive()
    }
}
