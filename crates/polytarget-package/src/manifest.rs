//! Package manifest parsing and types (package.json)
//!
//! Only the entry-point fields are modelled. Fields with an unexpected JSON
//! type are read as absent instead of failing the whole manifest.

use crate::PackageError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// File name of a package manifest
pub const MANIFEST_FILE_NAME: &str = "package.json";

/// Package manifest (package.json)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PackageManifest {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Primary entry point
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    /// ES module entry point
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Browser-specific entry point or replacement map
    #[serde(default, deserialize_with = "lenient_browser", skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserField>,
}

impl PackageManifest {
    /// Parse manifest from a JSON string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Load manifest from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|error| PackageError::IoError {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_str(&content).map_err(|error| PackageError::ParseError {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Entry files declared by `main` and `browser`, relative to the package root.
    ///
    /// These files are expected to ship pre-built for browsers.
    pub fn prebuilt_entries(&self) -> Vec<&str> {
        let mut entries: Vec<&str> = self.main.as_deref().into_iter().collect();
        if let Some(browser) = &self.browser {
            entries.extend(browser.entries());
        }
        entries
    }
}

/// The `browser` field: either an alternate entry or a replacement map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BrowserField {
    /// `"browser": "dist/browser.js"`
    Entry(String),
    /// `"browser": { "./server.js": "./client.js", "fs": false }`
    Replacements(BTreeMap<String, Value>),
}

impl BrowserField {
    /// Interpret a raw JSON value; anything but a string or object yields `None`
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(entry) => Some(Self::Entry(entry)),
            Value::Object(map) => Some(Self::Replacements(map.into_iter().collect())),
            _ => None,
        }
    }

    /// File paths this field points at. `false` replacements are skipped.
    pub fn entries(&self) -> Vec<&str> {
        match self {
            Self::Entry(entry) => vec![entry.as_str()],
            Self::Replacements(map) => map.values().filter_map(Value::as_str).collect(),
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_browser<'de, D>(deserializer: D) -> Result<Option<BrowserField>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(BrowserField::from_value))
}
