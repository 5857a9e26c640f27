/// Build targets and the ordered target registry
use crate::error::{TargetingError, TargetingResult};
use crate::tag::TagSyntax;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Profile classification of a build target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProfileClass {
    /// Older browsers, served with `nomodule`
    Legacy,
    /// Browsers with ES module support, served with `type="module"`
    Modern,
    /// Any other named profile
    Custom(String),
}

impl ProfileClass {
    /// Parse profile from string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "legacy" => Self::Legacy,
            "modern" => Self::Modern,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Get profile name
    pub fn name(&self) -> &str {
        match self {
            Self::Legacy => "legacy",
            Self::Modern => "modern",
            Self::Custom(name) => name,
        }
    }

    /// Check if this is a built-in profile
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Legacy | Self::Modern)
    }

    /// How scripts built for this profile are loaded, absent an override
    pub fn default_loading(&self) -> LoadingHint {
        match self {
            Self::Modern => LoadingHint::Module,
            Self::Legacy | Self::Custom(_) => LoadingHint::NoModule,
        }
    }
}

impl From<String> for ProfileClass {
    fn from(s: String) -> Self {
        Self::from_str(&s)
    }
}

impl From<ProfileClass> for String {
    fn from(profile: ProfileClass) -> Self {
        profile.name().to_string()
    }
}

impl std::fmt::Display for ProfileClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Script loading hint written onto emitted script tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingHint {
    /// `type="module"`
    Module,
    /// `nomodule`
    NoModule,
}

/// One output variant of the build. Immutable once constructed; shared
/// through `Arc` and referred to by key.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildTarget {
    key: String,
    profile: ProfileClass,
    transform_options: Value,
    loading: LoadingHint,
    tag: TagSyntax,
}

impl BuildTarget {
    /// Create a new build target
    pub fn new(
        key: impl Into<String>,
        profile: ProfileClass,
        transform_options: Value,
        tag: TagSyntax,
    ) -> Self {
        let loading = profile.default_loading();
        Self {
            key: key.into(),
            profile,
            transform_options,
            loading,
            tag,
        }
    }

    /// Override the script loading hint
    pub fn with_loading(mut self, loading: LoadingHint) -> Self {
        self.loading = loading;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn profile(&self) -> &ProfileClass {
        &self.profile
    }

    /// Options handed to the per-target transform
    pub fn transform_options(&self) -> &Value {
        &self.transform_options
    }

    pub fn loading(&self) -> LoadingHint {
        self.loading
    }

    pub fn tag_syntax(&self) -> &TagSyntax {
        &self.tag
    }

    /// Append this target's tag to `request` unless it is already tagged
    pub fn targeted_request(&self, request: &str) -> String {
        self.tag.apply(request, &self.key)
    }

    /// `<name>.<key>`, used for chunk, group and file names alike
    pub fn targeted_asset_name(&self, name: &str) -> String {
        let suffix = format!(".{}", self.key);
        if name.ends_with(&suffix) {
            name.to_string()
        } else {
            format!("{}{}", name, suffix)
        }
    }

    /// Validate the target configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.key.is_empty() {
            return Err("Target key cannot be empty".to_string());
        }
        if let Some(c) = self
            .key
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_')))
        {
            return Err(format!(
                "Target key '{}' contains '{}'; only ASCII letters, digits, '-' and '_' are allowed",
                self.key, c
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.key, self.profile)
    }
}

/// Ordered list of configured targets
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: Vec<Arc<BuildTarget>>,
    tag: TagSyntax,
}

impl TargetRegistry {
    /// Create a registry. Fails on an empty list, invalid or duplicate keys,
    /// or targets disagreeing on the tag syntax.
    pub fn new(targets: Vec<BuildTarget>) -> TargetingResult<Self> {
        let tag = targets
            .first()
            .map(|t| t.tag.clone())
            .ok_or(TargetingError::NoTargets)?;

        let mut seen = HashSet::new();
        for target in &targets {
            target
                .validate()
                .map_err(|reason| TargetingError::invalid_target(&target.key, reason))?;
            if target.tag != tag {
                return Err(TargetingError::invalid_target(
                    &target.key,
                    format!(
                        "tag parameter '{}' differs from '{}'",
                        target.tag.param(),
                        tag.param()
                    ),
                ));
            }
            if !seen.insert(target.key.clone()) {
                return Err(TargetingError::DuplicateTargetKey {
                    key: target.key.clone(),
                });
            }
        }

        Ok(Self {
            targets: targets.into_iter().map(Arc::new).collect(),
            tag,
        })
    }

    /// Resolve the tag embedded in `request` to a registered target.
    /// Untagged requests and unknown keys yield `None`.
    pub fn target_from_tag(&self, request: &str) -> Option<Arc<BuildTarget>> {
        let key = self.tag.parse(request)?;
        self.get(key).cloned()
    }

    /// Get a target by key
    pub fn get(&self, key: &str) -> Option<&Arc<BuildTarget>> {
        self.targets.iter().find(|t| t.key == key)
    }

    /// Get a target by key, failing if it is not registered
    pub fn require(&self, key: &str) -> TargetingResult<Arc<BuildTarget>> {
        self.get(key).cloned().ok_or_else(|| TargetingError::UnknownTarget {
            key: key.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BuildTarget>> {
        self.targets.iter()
    }

    /// Targets in configuration order
    pub fn targets(&self) -> &[Arc<BuildTarget>] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn tag_syntax(&self) -> &TagSyntax {
        &self.tag
    }

    /// Whether any configured target is loaded with `nomodule`
    pub fn has_legacy(&self) -> bool {
        self.targets
            .iter()
            .any(|t| t.loading == LoadingHint::NoModule)
    }
}
