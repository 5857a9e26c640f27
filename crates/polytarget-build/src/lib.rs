//! Multi-target build engine
//!
//! Compiles one module graph into several output variants ("targets"),
//! such as legacy and modern browser profiles:
//! - Build target registry and request tag grammar
//! - Exclusion policy for modules that need no per-target transform
//! - Blind assignment of targets to untraceable requests
//! - Dependency propagation through the host's resolution hooks
//! - Per-target transform-chain rewriting
//! - Child compilation forking, output merging and script loading hints

pub mod assets;
pub mod context;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod html;
pub mod ledger;
pub mod loader;
pub mod options;
pub mod orchestrator;
pub mod tag;
pub mod target;

// Re-export main types
pub use assets::{AssetManifest, CompilationOutput, EmittedFile, EmittedGroup, ManifestGroup};
pub use context::{DependencyRecord, LazyContext, ResolveData, TargetingState, CONTEXT_VERSION};
pub use cycle::BuildCycle;
pub use engine::PropagationEngine;
pub use error::{TargetingError, TargetingResult};
pub use exclusion::{Exclusion, ExclusionPolicy, KNOWN_EXCLUDED_PATTERNS, NEVER_TRANSPILE_PATTERNS};
pub use html::{AttributeValue, ScriptTag, ScriptTagUpdater, SAFARI10_NO_MODULE_FIX};
pub use ledger::AssignmentLedger;
pub use loader::{LoaderEntry, LoaderRewriter, MULTI_TARGET_LOADER_ID, RECOGNIZED_TRANSFORM_ID};
pub use options::{
    Externals, ExternalsDecl, MultiTargetOptions, PluginFactoryRegistry, PluginListFactory,
    PluginsDecl, TargetOptions, TargetingConfig,
};
pub use orchestrator::{
    ChildConfig, ChildOutput, CompilerConfig, CompilerDriver, CompilerPlugin, Orchestrator,
    OrchestratorStats, PluginFactory, PluginSlot, TransformRule, CHILD_COMPILATION_PREFIX,
    NESTED_INCOMPATIBLE_PLUGINS, ORCHESTRATOR_PLUGIN_ID,
};
pub use tag::{TagSyntax, DEFAULT_TAG_PARAM};
pub use target::{BuildTarget, LoadingHint, ProfileClass, TargetRegistry};

// Re-export polytarget-package types for convenience
pub use polytarget_package::{FsPackageLookup, InMemoryPackageLookup, PackageDescriptor, PackageLookup};
