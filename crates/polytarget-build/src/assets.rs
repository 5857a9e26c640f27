//! Emitted output of child compilations and the merged asset manifest
use crate::target::BuildTarget;
use serde::{Deserialize, Serialize};

/// File extensions that carry script code
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// One emitted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedFile {
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

impl EmittedFile {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    pub fn is_script(&self) -> bool {
        is_script_name(&self.name)
    }
}

/// A named output group (chunk group / entrypoint) and its files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedGroup {
    pub name: String,
    pub files: Vec<EmittedFile>,
}

impl EmittedGroup {
    pub fn new(name: impl Into<String>, files: Vec<EmittedFile>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }

    pub fn has_scripts(&self) -> bool {
        self.files.iter().any(EmittedFile::is_script)
    }

    pub fn size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// What a finished compilation reports back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationOutput {
    pub name: String,
    pub groups: Vec<EmittedGroup>,
}

impl CompilationOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: EmittedGroup) -> Self {
        self.groups.push(group);
        self
    }
}

/// A group in the parent manifest, with the target that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestGroup {
    pub name: String,
    /// Key of the producing target; `None` for groups emitted by the parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub files: Vec<EmittedFile>,
}

/// The parent compilation's asset manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub groups: Vec<ManifestGroup>,
}

impl AssetManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group emitted by the parent itself
    pub fn push_parent_group(&mut self, group: EmittedGroup) {
        self.groups.push(ManifestGroup {
            name: group.name,
            target: None,
            files: group.files,
        });
    }

    /// Merge a child's script-bearing groups, in the child's order, under
    /// target-suffixed names. Returns the number of groups merged.
    pub fn merge_child(&mut self, target: &BuildTarget, output: &CompilationOutput) -> usize {
        let before = self.groups.len();
        self.groups.extend(
            output
                .groups
                .iter()
                .filter(|group| group.has_scripts())
                .map(|group| ManifestGroup {
                    name: target.targeted_asset_name(&group.name),
                    target: Some(target.key().to_string()),
                    files: group.files.clone(),
                }),
        );
        self.groups.len() - before
    }

    pub fn group(&self, name: &str) -> Option<&ManifestGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Groups produced by one target
    pub fn groups_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a ManifestGroup> + 'a {
        self.groups
            .iter()
            .filter(move |g| g.target.as_deref() == Some(key))
    }

    /// Group owning the file a script `src` points at. The query and
    /// fragment of `src` are ignored and any leading public path matches.
    pub fn owner_of(&self, src: &str) -> Option<&ManifestGroup> {
        let path = src
            .split(['?', '#'])
            .next()
            .unwrap_or(src);
        self.groups.iter().find(|group| {
            group.files.iter().any(|file| {
                path == file.name
                    || path
                        .strip_suffix(file.name.as_str())
                        .map_or(false, |prefix| prefix.ends_with('/'))
            })
        })
    }

    pub fn total_size(&self) -> u64 {
        self.groups
            .iter()
            .flat_map(|g| g.files.iter())
            .map(|f| f.size)
            .sum()
    }
}

fn is_script_name(name: &str) -> bool {
    let path = name.split('?').next().unwrap_or(name);
    path.rsplit_once('.')
        .map_or(false, |(_, ext)| SCRIPT_EXTENSIONS.contains(&ext))
}
