//! Script-tag loading hints
//!
//! Only `src` is read; only `type` and `nomodule` are written.
use crate::assets::AssetManifest;
use crate::target::{LoadingHint, TargetRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Inline guard that stops Safari 10.1 from running both the module and
/// the `nomodule` bundle
pub const SAFARI10_NO_MODULE_FIX: &str = r#"!function(){var e=document,t=e.createElement("script");if(!("noModule"in t)&&"onbeforeload"in t){var n=!1;e.addEventListener("beforeload",function(e){if(e.target===t)n=!0;else if(!e.target.hasAttribute("nomodule")||!n)return;e.preventDefault()},!0),t.type="module",t.src=".",e.head.appendChild(t),t.remove()}}();"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean attribute such as `nomodule`
    Flag(bool),
    Value(String),
}

/// An emitted HTML tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptTag {
    pub tag_name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, AttributeValue)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<String>,
}

impl ScriptTag {
    /// `<script src=..>`
    pub fn external(src: impl Into<String>) -> Self {
        Self {
            tag_name: "script".to_string(),
            attributes: vec![("src".to_string(), AttributeValue::Value(src.into()))],
            inner: None,
        }
    }

    /// `<script>..</script>`
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            tag_name: "script".to_string(),
            attributes: Vec::new(),
            inner: Some(content.into()),
        }
    }

    pub fn is_script(&self) -> bool {
        self.tag_name.eq_ignore_ascii_case("script")
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn src(&self) -> Option<&str> {
        match self.attribute("src") {
            Some(AttributeValue::Value(src)) => Some(src),
            _ => None,
        }
    }

    pub fn set_attribute(&mut self, name: &str, value: AttributeValue) {
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) {
        self.attributes.retain(|(n, _)| n != name);
    }

    /// Loading hint currently carried by the tag
    pub fn loading(&self) -> Option<LoadingHint> {
        if matches!(self.attribute("type"), Some(AttributeValue::Value(v)) if v == "module") {
            Some(LoadingHint::Module)
        } else if matches!(self.attribute("nomodule"), Some(AttributeValue::Flag(true))) {
            Some(LoadingHint::NoModule)
        } else {
            None
        }
    }

    fn apply_loading(&mut self, hint: LoadingHint) {
        match hint {
            LoadingHint::Module => {
                self.remove_attribute("nomodule");
                self.set_attribute("type", AttributeValue::Value("module".to_string()));
            }
            LoadingHint::NoModule => {
                if matches!(self.attribute("type"), Some(AttributeValue::Value(v)) if v == "module") {
                    self.remove_attribute("type");
                }
                self.set_attribute("nomodule", AttributeValue::Flag(true));
            }
        }
    }
}

/// Tags emitted scripts with `type=module` / `nomodule`
#[derive(Debug, Clone)]
pub struct ScriptTagUpdater {
    registry: Arc<TargetRegistry>,
    safari10_fix: bool,
}

impl ScriptTagUpdater {
    pub fn new(registry: Arc<TargetRegistry>) -> Self {
        Self {
            registry,
            safari10_fix: false,
        }
    }

    pub fn with_safari10_fix(mut self, enabled: bool) -> Self {
        self.safari10_fix = enabled;
        self
    }

    /// Loading hint for a script `src`.
    ///
    /// A file from a child takes its target's hint. A file no child emitted
    /// loads as a module iff some target is legacy.
    pub fn hint_for(&self, manifest: &AssetManifest, src: &str) -> LoadingHint {
        let owner = manifest
            .owner_of(src)
            .and_then(|group| group.target.as_deref())
            .and_then(|key| self.registry.get(key));
        match owner {
            Some(target) => target.loading(),
            None => {
                let hint = if self.registry.has_legacy() {
                    LoadingHint::Module
                } else {
                    LoadingHint::NoModule
                };
                warn!(src, ?hint, "script not emitted by any target; using default hint");
                hint
            }
        }
    }

    /// Set hints on every external script tag, then insert the Safari 10
    /// guard if enabled and both kinds are present. Returns the number of
    /// tags updated.
    pub fn update(&self, manifest: &AssetManifest, tags: &mut Vec<ScriptTag>) -> usize {
        let mut updated = 0;
        for tag in tags.iter_mut().filter(|t| t.is_script()) {
            let Some(src) = tag.src().map(str::to_string) else {
                continue;
            };
            tag.apply_loading(self.hint_for(manifest, &src));
            updated += 1;
        }

        if self.safari10_fix {
            let first_no_module = tags
                .iter()
                .position(|t| t.loading() == Some(LoadingHint::NoModule));
            let has_module = tags.iter().any(|t| t.loading() == Some(LoadingHint::Module));
            if let (Some(index), true) = (first_no_module, has_module) {
                tags.insert(index, ScriptTag::inline(SAFARI10_NO_MODULE_FIX));
            }
        }
        updated
    }
}
