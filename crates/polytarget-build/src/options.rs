//! Multi-target options and their validation
//!
//! Options arrive as plain serde records (already assembled by the host)
//! and are validated into a [`TargetingConfig`] before any compilation
//! starts. Every configuration defect is reported here, naming the target,
//! pattern or factory at fault.

use crate::error::{TargetingError, TargetingResult};
use crate::tag::{TagSyntax, DEFAULT_TAG_PARAM};
use crate::target::{BuildTarget, LoadingHint, ProfileClass, TargetRegistry};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Top-level multi-target options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiTargetOptions {
    /// Configured targets, in order
    #[serde(default)]
    pub targets: Vec<TargetOptions>,
    /// Transform options shared by every target; target options overlay them
    #[serde(default)]
    pub transform: Value,
    /// Extra exclusion patterns (regular expressions over resolved paths)
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Requests matching these patterns are never tagged
    #[serde(default)]
    pub do_not_target: Vec<String>,
    /// Modules provided by the page at runtime, never bundled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub externals: Option<ExternalsDecl>,
    /// Query parameter used for request tags
    #[serde(default = "default_tag_param")]
    pub tag_param: String,
    /// Inject the Safari 10 `nomodule` workaround into the page
    #[serde(default)]
    pub safari10_no_module_fix: bool,
}

fn default_tag_param() -> String {
    DEFAULT_TAG_PARAM.to_string()
}

/// Options for one target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetOptions {
    /// Unique key; defaults to the profile name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Profile classification (required)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileClass>,
    /// Transform options for this target
    #[serde(default)]
    pub transform: Value,
    /// Transform plugin list, literal or produced by a named factory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<PluginsDecl>,
    /// Load this target's scripts as ES modules (custom profiles only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub es_module: Option<bool>,
}

/// How a target declares its transform plugin list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginsDecl {
    /// Literal plugin list
    List(Vec<Value>),
    /// Name of a factory registered in a [`PluginFactoryRegistry`]
    Factory(String),
}

/// Produces the full transform plugin list for a target profile
pub type PluginListFactory = Arc<dyn Fn(&ProfileClass) -> Vec<Value> + Send + Sync>;

/// Named plugin-list factories the options may refer to
#[derive(Clone, Default)]
pub struct PluginFactoryRegistry {
    factories: HashMap<String, PluginListFactory>,
}

impl PluginFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ProfileClass) -> Vec<Value> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn get(&self, name: &str) -> Option<&PluginListFactory> {
        self.factories.get(name)
    }
}

impl std::fmt::Debug for PluginFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("PluginFactoryRegistry")
            .field("factories", &names)
            .finish()
    }
}

/// Externals declaration as supplied by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalsDecl {
    /// A single module name
    Name(String),
    /// `{ "pattern": "^lodash" }`
    Pattern { pattern: String },
    /// A host callback; not supported
    Callback { callback: String },
    /// Module name to global mapping
    Map(BTreeMap<String, Value>),
    /// Any combination of the above
    List(Vec<ExternalsDecl>),
}

/// Validated externals
#[derive(Debug, Clone)]
pub enum Externals {
    Name(String),
    Pattern(Regex),
    Map(BTreeMap<String, Value>),
    List(Vec<Externals>),
}

impl Externals {
    /// Validate a declaration. Callback-valued declarations are rejected.
    pub fn from_decl(decl: &ExternalsDecl) -> TargetingResult<Self> {
        Ok(match decl {
            ExternalsDecl::Name(name) => Self::Name(name.clone()),
            ExternalsDecl::Pattern { pattern } => Self::Pattern(compile_pattern("externals", pattern)?),
            ExternalsDecl::Callback { callback } => {
                return Err(TargetingError::UnsupportedExternals(format!(
                    "function-valued externals ('{}') cannot be evaluated by the targeting engine",
                    callback
                )))
            }
            ExternalsDecl::Map(map) => Self::Map(map.clone()),
            ExternalsDecl::List(items) => Self::List(
                items
                    .iter()
                    .map(Self::from_decl)
                    .collect::<TargetingResult<Vec<_>>>()?,
            ),
        })
    }

    /// Whether `request` names an external module
    pub fn matches(&self, request: &str) -> bool {
        match self {
            Self::Name(name) => name == request,
            Self::Pattern(pattern) => pattern.is_match(request),
            Self::Map(map) => map.contains_key(request),
            Self::List(items) => items.iter().any(|item| item.matches(request)),
        }
    }
}

/// Validated options, ready for the engine and orchestrator
#[derive(Debug, Clone)]
pub struct TargetingConfig {
    pub registry: Arc<TargetRegistry>,
    pub exclude: Vec<Regex>,
    pub do_not_target: Vec<Regex>,
    pub externals: Option<Externals>,
    pub safari10_no_module_fix: bool,
}

impl MultiTargetOptions {
    /// Create options for the given targets with defaults elsewhere
    pub fn with_targets(targets: Vec<TargetOptions>) -> Self {
        Self {
            targets,
            tag_param: default_tag_param(),
            ..Self::default()
        }
    }

    /// Validate into a [`TargetingConfig`]
    pub fn validate(&self, factories: &PluginFactoryRegistry) -> TargetingResult<TargetingConfig> {
        if self.targets.is_empty() {
            return Err(TargetingError::NoTargets);
        }
        if self.tag_param.is_empty()
            || !self
                .tag_param
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        {
            return Err(TargetingError::invalid_target(
                "*",
                format!("tag parameter '{}' is not a plain identifier", self.tag_param),
            ));
        }

        let tag = TagSyntax::new(&self.tag_param);
        let targets = self
            .targets
            .iter()
            .enumerate()
            .map(|(index, options)| options.build(index, &self.transform, &tag, factories))
            .collect::<TargetingResult<Vec<_>>>()?;

        Ok(TargetingConfig {
            registry: Arc::new(TargetRegistry::new(targets)?),
            exclude: compile_patterns("exclude", &self.exclude)?,
            do_not_target: compile_patterns("do_not_target", &self.do_not_target)?,
            externals: self.externals.as_ref().map(Externals::from_decl).transpose()?,
            safari10_no_module_fix: self.safari10_no_module_fix,
        })
    }
}

impl TargetOptions {
    /// Options for a target of the given profile
    pub fn new(profile: ProfileClass) -> Self {
        Self {
            profile: Some(profile),
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_transform(mut self, transform: Value) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginsDecl) -> Self {
        self.plugins = Some(plugins);
        self
    }

    fn build(
        &self,
        index: usize,
        base_transform: &Value,
        tag: &TagSyntax,
        factories: &PluginFactoryRegistry,
    ) -> TargetingResult<BuildTarget> {
        let label = self.key.clone().unwrap_or_else(|| format!("#{}", index));
        let profile = self
            .profile
            .clone()
            .ok_or(TargetingError::MissingProfile { target: label })?;
        let key = self.key.clone().unwrap_or_else(|| profile.name().to_string());

        let mut transform = merge_objects(base_transform, &self.transform);
        match &self.plugins {
            Some(PluginsDecl::List(list)) => {
                transform.insert("plugins".to_string(), Value::Array(list.clone()));
            }
            Some(PluginsDecl::Factory(name)) => {
                let factory = factories.get(name).ok_or_else(|| {
                    TargetingError::InvalidPluginFactory {
                        target: key.clone(),
                        factory: name.clone(),
                    }
                })?;
                transform.insert("plugins".to_string(), Value::Array(factory(&profile)));
            }
            None => {}
        }

        let mut target = BuildTarget::new(key, profile, Value::Object(transform), tag.clone());
        if let Some(es_module) = self.es_module {
            if !target.profile().is_builtin() {
                let loading = if es_module {
                    LoadingHint::Module
                } else {
                    LoadingHint::NoModule
                };
                target = target.with_loading(loading);
            }
        }
        Ok(target)
    }
}

/// Shallow merge of two JSON objects; non-object inputs count as empty
fn merge_objects(base: &Value, overlay: &Value) -> Map<String, Value> {
    let mut merged = base.as_object().cloned().unwrap_or_default();
    if let Some(overlay) = overlay.as_object() {
        for (key, value) in overlay {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

fn compile_pattern(list: &'static str, pattern: &str) -> TargetingResult<Regex> {
    Regex::new(pattern).map_err(|error| TargetingError::InvalidPattern {
        list,
        pattern: pattern.to_string(),
        error,
    })
}

/// Compile a list of patterns, reporting the first invalid one
pub(crate) fn compile_patterns(list: &'static str, patterns: &[impl AsRef<str>]) -> TargetingResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| compile_pattern(list, p.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_externals_matching() {
        let externals = Externals::from_decl(&ExternalsDecl::List(vec![
            ExternalsDecl::Name("jquery".into()),
            ExternalsDecl::Pattern {
                pattern: "^@angular/".into(),
            },
            ExternalsDecl::Map(BTreeMap::from([("react".to_string(), json!("React"))])),
        ]))
        .unwrap();

        assert!(externals.matches("jquery"));
        assert!(externals.matches("@angular/core"));
        assert!(externals.matches("react"));
        assert!(!externals.matches("./jquery"));
    }

    #[test]
    fn test_callback_externals_rejected() {
        let decl = ExternalsDecl::List(vec![ExternalsDecl::Callback {
            callback: "resolveExternal".into(),
        }]);
        let err = Externals::from_decl(&decl).unwrap_err();
        assert!(err.to_string().contains("resolveExternal"));
    }

    #[test]
    fn test_externals_decl_from_json() {
        let decl: ExternalsDecl =
            serde_json::from_value(json!(["lodash", { "pattern": "^rxjs" }, { "callback": "fn" }]))
                .unwrap();
        let ExternalsDecl::List(items) = decl else {
            panic!("expected a list");
        };
        assert_eq!(items[0], ExternalsDecl::Name("lodash".into()));
        assert!(matches!(items[1], ExternalsDecl::Pattern { .. }));
        assert!(matches!(items[2], ExternalsDecl::Callback { .. }));
    }

    #[test]
    fn test_merge_objects() {
        let merged = merge_objects(&json!({ "a": 1, "b": 2 }), &json!({ "b": 3 }));
        assert_eq!(Value::Object(merged), json!({ "a": 1, "b": 3 }));
        assert!(merge_objects(&Value::Null, &json!(5)).is_empty());
    }
}
