//! Resolution context records exchanged with the host driver
//!
//! The host adapter fills these records at each suspension point, calls
//! `validate()` once at the boundary, and hands them to the engine, which
//! rewrites them in place.

use crate::error::{TargetingError, TargetingResult};
use crate::loader::LoaderEntry;
use crate::target::BuildTarget;
use polytarget_package::PackageDescriptor;
use std::path::PathBuf;
use std::sync::Arc;

/// Version of the context records understood by this engine
pub const CONTEXT_VERSION: u32 = 1;

/// Where a request stands in the targeting state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetingState {
    /// No target decided yet
    #[default]
    Untagged,
    /// Target decided and request tagged
    Targeted,
    /// Transform chain rewritten; final
    Chained,
}

/// A dependency recorded by a module's loader
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyRecord {
    /// Dependency request
    pub request: String,
    /// Target assigned to the edge, set at most once
    pub target: Option<Arc<BuildTarget>>,
    /// Identifier of the module that recorded the dependency
    pub origin_module: Option<String>,
}

impl DependencyRecord {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            target: None,
            origin_module: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin_module = Some(origin.into());
        self
    }

    pub fn with_target(mut self, target: Arc<BuildTarget>) -> Self {
        self.target = Some(target);
        self
    }
}

/// A module request and its resolution context
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveData {
    pub version: u32,
    /// Request string; carries the target tag once targeted
    pub request: String,
    /// Identifier of the issuing module, if any
    pub issuer: Option<String>,
    /// Resolved resource including query, if separately tracked
    pub resource: Option<String>,
    /// Resolved file path without query
    pub resource_path: Option<PathBuf>,
    /// Owning package, when the host already knows it
    pub package: Option<Arc<PackageDescriptor>>,
    /// Provided by the page at runtime, not bundled
    pub external: bool,
    /// Dependencies known at this point
    pub dependencies: Vec<DependencyRecord>,
    /// Transform chain
    pub loaders: Vec<Arc<LoaderEntry>>,
    /// Code-split group name, if this request starts one
    pub chunk_name: Option<String>,
    /// Decided target
    pub target: Option<Arc<BuildTarget>>,
    pub state: TargetingState,
}

impl ResolveData {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            version: CONTEXT_VERSION,
            request: request.into(),
            issuer: None,
            resource: None,
            resource_path: None,
            package: None,
            external: false,
            dependencies: Vec::new(),
            loaders: Vec::new(),
            chunk_name: None,
            target: None,
            state: TargetingState::Untagged,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the resolved file; `resource` mirrors it until tagged
    pub fn with_resource(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.resource = Some(path.to_string_lossy().into_owned());
        self.resource_path = Some(path);
        self
    }

    pub fn with_package(mut self, package: Arc<PackageDescriptor>) -> Self {
        self.package = Some(package);
        self
    }

    pub fn with_loaders(mut self, loaders: Vec<LoaderEntry>) -> Self {
        self.loaders = loaders.into_iter().map(Arc::new).collect();
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<DependencyRecord>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_chunk_name(mut self, name: impl Into<String>) -> Self {
        self.chunk_name = Some(name.into());
        self
    }

    pub fn as_external(mut self) -> Self {
        self.external = true;
        self
    }

    /// Issuer key used for blind assignment; entry points have none
    pub fn issuer_key(&self) -> &str {
        self.issuer.as_deref().unwrap_or("")
    }

    /// Check the record before it enters the engine
    pub fn validate(&self) -> TargetingResult<()> {
        check_version(self.version)?;
        if self.request.is_empty() {
            return Err(TargetingError::invalid_context("", "empty request"));
        }
        if let Some(marker) = self
            .loaders
            .iter()
            .find(|l| l.is_marker() && l.effective.is_none())
        {
            return Err(TargetingError::invalid_context(
                &self.request,
                format!("marker loader '{}' has no effective form", marker.transform_id),
            ));
        }
        if self.resource.is_some() != self.resource_path.is_some() {
            return Err(TargetingError::invalid_context(
                &self.request,
                "resource and resource_path must be set together",
            ));
        }
        Ok(())
    }
}

/// A code-split or dynamically resolved fragment whose issuer is unknown
#[derive(Debug, Clone, PartialEq)]
pub struct LazyContext {
    pub version: u32,
    /// Surrounding context (directory or module) the fragment was found in
    pub context: String,
    /// Fragment request
    pub request: String,
    /// Group name for the fragment's chunk
    pub chunk_name: Option<String>,
    pub target: Option<Arc<BuildTarget>>,
}

impl LazyContext {
    pub fn new(context: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            version: CONTEXT_VERSION,
            context: context.into(),
            request: request.into(),
            chunk_name: None,
            target: None,
        }
    }

    pub fn with_chunk_name(mut self, name: impl Into<String>) -> Self {
        self.chunk_name = Some(name.into());
        self
    }

    pub fn validate(&self) -> TargetingResult<()> {
        check_version(self.version)?;
        if self.request.is_empty() {
            return Err(TargetingError::invalid_context(
                &self.context,
                "lazy context has an empty request",
            ));
        }
        Ok(())
    }
}

fn check_version(found: u32) -> TargetingResult<()> {
    if found != CONTEXT_VERSION {
        return Err(TargetingError::UnsupportedContextVersion {
            found,
            expected: CONTEXT_VERSION,
        });
    }
    Ok(())
}
