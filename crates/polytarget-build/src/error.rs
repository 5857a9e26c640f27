/// Targeting engine error types
use thiserror::Error;

pub type TargetingResult<T> = Result<T, TargetingError>;

/// Every variant is fatal for the build that raised it.
#[derive(Debug, Error)]
pub enum TargetingError {
    #[error("No build targets configured")]
    NoTargets,

    #[error("Build target '{target}' has no profile")]
    MissingProfile { target: String },

    #[error("Duplicate build target key '{key}': give each target sharing a profile its own key")]
    DuplicateTargetKey { key: String },

    #[error("Invalid build target '{key}': {reason}")]
    InvalidTarget { key: String, reason: String },

    #[error("Plugin factory '{factory}' declared for target '{target}' is not a registered callable factory")]
    InvalidPluginFactory { target: String, factory: String },

    #[error("No eligible transform rule found for target '{target}'")]
    NoEligibleTransformRule { target: String },

    #[error("Plugin '{plugin}' would be shared between the parent and child compilation '{compilation}'; provide it through a factory instead")]
    SharedPluginInstance { plugin: String, compilation: String },

    #[error("Blind target assignment exhausted for request '{request}' issued by '{issuer}': more independent references than configured targets")]
    BlindAssignmentExhausted { issuer: String, request: String },

    #[error("Unsupported externals declaration: {0}")]
    UnsupportedExternals(String),

    #[error("Invalid {list} pattern '{pattern}': {error}")]
    InvalidPattern {
        list: &'static str,
        pattern: String,
        #[source]
        error: regex::Error,
    },

    #[error("Unknown build target '{key}'")]
    UnknownTarget { key: String },

    #[error("Unsupported resolution context version {found} (expected {expected})")]
    UnsupportedContextVersion { found: u32, expected: u32 },

    #[error("Invalid resolution context for '{request}': {reason}")]
    InvalidContext { request: String, reason: String },

    #[error("Child compilation '{name}' failed: {error}")]
    ChildCompilation { name: String, error: String },
}

impl TargetingError {
    /// Create a blind-assignment exhaustion error
    pub fn exhausted(issuer: impl Into<String>, request: impl Into<String>) -> Self {
        Self::BlindAssignmentExhausted {
            issuer: issuer.into(),
            request: request.into(),
        }
    }

    /// Create an invalid target error
    pub fn invalid_target(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidTarget {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid context error
    pub fn invalid_context(request: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidContext {
            request: request.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a child compilation error
    pub fn child_compilation(name: impl Into<String>, error: impl ToString) -> Self {
        Self::ChildCompilation {
            name: name.into(),
            error: error.to_string(),
        }
    }
}
