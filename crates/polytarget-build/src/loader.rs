//! Transform-chain entries and per-target chain rewriting
use crate::target::BuildTarget;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Transform id of the multi-target marker entry
pub const MULTI_TARGET_LOADER_ID: &str = "multi-target-loader";

/// The transform the marker knows how to specialise per target
pub const RECOGNIZED_TRANSFORM_ID: &str = "babel-loader";

/// One entry of a module's transform (loader) chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderEntry {
    pub transform_id: String,
    #[serde(default)]
    pub options: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// For marker entries: the form to use when the marker is resolved
    /// without a per-target replacement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective: Option<Box<LoaderEntry>>,
}

impl LoaderEntry {
    /// A plain transform entry
    pub fn new(transform_id: impl Into<String>, options: Value) -> Self {
        Self {
            transform_id: transform_id.into(),
            options,
            identity: None,
            effective: None,
        }
    }

    /// A marker entry wrapping its declared effective form
    pub fn marker(effective: LoaderEntry) -> Self {
        Self {
            transform_id: MULTI_TARGET_LOADER_ID.to_string(),
            options: Value::Null,
            identity: None,
            effective: Some(Box::new(effective)),
        }
    }

    pub fn is_marker(&self) -> bool {
        self.transform_id == MULTI_TARGET_LOADER_ID
    }

    /// Whether this marker wraps the recognized transform
    pub fn wraps_recognized_transform(&self) -> bool {
        self.is_marker()
            && self
                .effective
                .as_ref()
                .map_or(false, |e| e.transform_id == RECOGNIZED_TRANSFORM_ID)
    }

    /// Per-target variant of the recognized transform
    pub fn targeted(target: &BuildTarget) -> Self {
        Self {
            transform_id: RECOGNIZED_TRANSFORM_ID.to_string(),
            options: target.transform_options().clone(),
            identity: Some(format!("{}-{}", MULTI_TARGET_LOADER_ID, target.key())),
            effective: None,
        }
    }
}

/// Rewrites marker entries in transform chains. Holds one shared
/// replacement per target key for the lifetime of a build cycle.
#[derive(Debug, Default)]
pub struct LoaderRewriter {
    per_target: HashMap<String, Arc<LoaderEntry>>,
}

impl LoaderRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared per-target replacement entry
    pub fn replacement_for(&mut self, target: &BuildTarget) -> Arc<LoaderEntry> {
        self.per_target
            .entry(target.key().to_string())
            .or_insert_with(|| Arc::new(LoaderEntry::targeted(target)))
            .clone()
    }

    /// Rewrite every marker entry in `chain`:
    ///
    /// - no target: the marker is dropped
    /// - target and recognized transform: the shared per-target replacement
    /// - anything else: the marker's effective form
    ///
    /// Returns the number of marker entries rewritten.
    pub fn rewrite(&mut self, chain: &mut Vec<Arc<LoaderEntry>>, target: Option<&BuildTarget>) -> usize {
        let mut rewritten = 0;
        let entries = std::mem::take(chain);
        for entry in entries {
            if !entry.is_marker() {
                chain.push(entry);
                continue;
            }
            rewritten += 1;
            match target {
                None => {}
                Some(target) if entry.wraps_recognized_transform() => {
                    chain.push(self.replacement_for(target));
                }
                Some(_) => {
                    if let Some(effective) = &entry.effective {
                        chain.push(Arc::new(effective.as_ref().clone()));
                    }
                }
            }
        }
        rewritten
    }
}
