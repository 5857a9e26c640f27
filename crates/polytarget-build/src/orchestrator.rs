//! Compilation orchestration
//!
//! Forks one child compiler configuration per target, runs the children
//! through a host [`CompilerDriver`], merges their output groups into the
//! parent manifest and sets script loading hints.
//!
//! Each child run must drive its own [`BuildCycle`](crate::BuildCycle)
//! from `PropagationEngine::begin_cycle`; cycles are never shared between
//! children.

use crate::assets::{AssetManifest, CompilationOutput};
use crate::error::{TargetingError, TargetingResult};
use crate::html::{ScriptTag, ScriptTagUpdater};
use crate::loader::LoaderEntry;
use crate::options::TargetingConfig;
use crate::target::{BuildTarget, TargetRegistry};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Name prefix reserved for child compilations
pub const CHILD_COMPILATION_PREFIX: &str = "multi-target-compiler-";

/// Plugin name of the orchestrator itself
pub const ORCHESTRATOR_PLUGIN_ID: &str = "MultiTargetPlugin";

/// Plugins that break when run inside a child compilation
pub const NESTED_INCOMPATIBLE_PLUGINS: &[&str] = &[
    ORCHESTRATOR_PLUGIN_ID,
    "HtmlWebpackPlugin",
    "HotModuleReplacementPlugin",
    "ProgressPlugin",
];

/// A cross-cutting compiler plugin
pub trait CompilerPlugin: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Whether one instance may serve several compilations at once
    fn shareable(&self) -> bool {
        false
    }
}

/// Builds a fresh plugin instance for each child
pub trait PluginFactory: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn create(&self, target: &BuildTarget) -> Arc<dyn CompilerPlugin>;
}

#[derive(Debug, Clone)]
pub enum PluginSlot {
    Instance(Arc<dyn CompilerPlugin>),
    Factory(Arc<dyn PluginFactory>),
}

impl PluginSlot {
    pub fn name(&self) -> &str {
        match self {
            PluginSlot::Instance(plugin) => plugin.name(),
            PluginSlot::Factory(factory) => factory.name(),
        }
    }
}

/// A module rule: a file test and its transform chain
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRule {
    pub test: String,
    pub loaders: Vec<LoaderEntry>,
}

impl TransformRule {
    pub fn new(test: impl Into<String>, loaders: Vec<LoaderEntry>) -> Self {
        Self {
            test: test.into(),
            loaders,
        }
    }

    fn has_multi_target_marker(&self) -> bool {
        self.loaders.iter().any(LoaderEntry::wraps_recognized_transform)
    }
}

/// The part of a compiler configuration the orchestrator rewrites
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub name: String,
    /// Entry name -> entry request
    pub entries: BTreeMap<String, String>,
    pub rules: Vec<TransformRule>,
    pub plugins: Vec<PluginSlot>,
}

impl CompilerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
            rules: Vec::new(),
            plugins: Vec::new(),
        }
    }

    pub fn with_entry(mut self, name: impl Into<String>, request: impl Into<String>) -> Self {
        self.entries.insert(name.into(), request.into());
        self
    }

    pub fn with_rule(mut self, rule: TransformRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_plugin(mut self, plugin: PluginSlot) -> Self {
        self.plugins.push(plugin);
        self
    }
}

/// A forked configuration bound to its target
#[derive(Debug, Clone)]
pub struct ChildConfig {
    pub target: Arc<BuildTarget>,
    pub config: CompilerConfig,
}

/// Host side of child compilation
pub trait CompilerDriver: Sync {
    type Error: fmt::Display;

    /// Run one child to completion
    fn run_child(&self, child: &ChildConfig) -> Result<CompilationOutput, Self::Error>;
}

/// A finished child run
#[derive(Debug, Clone)]
pub struct ChildOutput {
    pub target: Arc<BuildTarget>,
    pub output: CompilationOutput,
    pub elapsed: Duration,
}

/// Orchestration statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchestratorStats {
    /// Child compilations run
    pub children: usize,
    /// Groups merged into the parent manifest
    pub merged_groups: usize,
    /// Script tags given a loading hint
    pub tagged_scripts: usize,
    /// Bytes emitted per target key
    pub emitted_bytes: BTreeMap<String, u64>,
    pub total_time: Duration,
}

/// Forks, runs and merges per-target child compilations
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<TargetRegistry>,
    updater: ScriptTagUpdater,
}

impl Orchestrator {
    pub fn new(config: &TargetingConfig) -> Self {
        let registry = Arc::clone(&config.registry);
        let updater = ScriptTagUpdater::new(Arc::clone(&registry))
            .with_safari10_fix(config.safari10_no_module_fix);
        Self { registry, updater }
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    /// Name of the child compilation for `target`
    pub fn child_name(target: &BuildTarget) -> String {
        format!("{}{}", CHILD_COMPILATION_PREFIX, target.key())
    }

    /// Target key of a child compilation name; `None` for the root
    pub fn child_target_key(name: &str) -> Option<&str> {
        name.strip_prefix(CHILD_COMPILATION_PREFIX)
            .filter(|key| !key.is_empty())
    }

    /// One child configuration per target, in configuration order
    #[instrument(level = "debug", skip_all, fields(base = %base.name))]
    pub fn fork(&self, base: &CompilerConfig) -> TargetingResult<Vec<ChildConfig>> {
        self.registry
            .iter()
            .map(|target| self.fork_target(base, target))
            .collect()
    }

    /// Clone `base` for one target.
    ///
    /// Drops the orchestrator and nested-incompatible plugins, builds
    /// factory plugins afresh, substitutes the target's transform into
    /// every marker rule, tags entry requests and suffixes entry names.
    pub fn fork_target(&self, base: &CompilerConfig, target: &Arc<BuildTarget>) -> TargetingResult<ChildConfig> {
        let name = Self::child_name(target);

        let mut plugins = Vec::with_capacity(base.plugins.len());
        for slot in &base.plugins {
            if NESTED_INCOMPATIBLE_PLUGINS.iter().any(|p| *p == slot.name()) {
                debug!(plugin = slot.name(), child = %name, "plugin stripped from child");
                continue;
            }
            match slot {
                PluginSlot::Instance(plugin) if !plugin.shareable() => {
                    return Err(TargetingError::SharedPluginInstance {
                        plugin: plugin.name().to_string(),
                        compilation: name,
                    });
                }
                PluginSlot::Instance(plugin) => plugins.push(PluginSlot::Instance(Arc::clone(plugin))),
                PluginSlot::Factory(factory) => plugins.push(PluginSlot::Instance(factory.create(target))),
            }
        }

        let mut substituted = 0;
        let rules = base
            .rules
            .iter()
            .map(|rule| {
                if !rule.has_multi_target_marker() {
                    return rule.clone();
                }
                substituted += 1;
                let loaders = rule
                    .loaders
                    .iter()
                    .map(|entry| {
                        if entry.wraps_recognized_transform() {
                            LoaderEntry::targeted(target)
                        } else {
                            entry.clone()
                        }
                    })
                    .collect();
                TransformRule::new(rule.test.clone(), loaders)
            })
            .collect::<Vec<_>>();
        if substituted == 0 {
            return Err(TargetingError::NoEligibleTransformRule {
                target: target.key().to_string(),
            });
        }

        let entries = base
            .entries
            .iter()
            .map(|(entry, request)| {
                (
                    target.targeted_asset_name(entry),
                    target.targeted_request(request),
                )
            })
            .collect();

        debug!(child = %name, rules = substituted, plugins = plugins.len(), "child configuration forked");
        Ok(ChildConfig {
            target: Arc::clone(target),
            config: CompilerConfig {
                name,
                entries,
                rules,
                plugins,
            },
        })
    }

    /// Run every child; returns only once all of them finished, in child
    /// order. The first failure aborts the whole run.
    #[instrument(level = "debug", skip_all, fields(children = children.len()))]
    pub fn run_children<D: CompilerDriver>(
        &self,
        driver: &D,
        children: &[ChildConfig],
    ) -> TargetingResult<Vec<ChildOutput>> {
        children
            .par_iter()
            .map(|child| {
                let start = Instant::now();
                let output = driver
                    .run_child(child)
                    .map_err(|e| TargetingError::child_compilation(&child.config.name, e))?;
                Ok(ChildOutput {
                    target: Arc::clone(&child.target),
                    output,
                    elapsed: start.elapsed(),
                })
            })
            .collect()
    }

    /// Merge finished children into `manifest` in child order. Every output
    /// must come from the child compilation of its own target; on a mismatch
    /// nothing is merged.
    pub fn merge(
        &self,
        manifest: &mut AssetManifest,
        outputs: &[ChildOutput],
        stats: &mut OrchestratorStats,
    ) -> TargetingResult<()> {
        for child in outputs {
            if Self::child_target_key(&child.output.name) != Some(child.target.key()) {
                return Err(TargetingError::child_compilation(
                    &child.output.name,
                    format!(
                        "output does not belong to child compilation '{}'",
                        Self::child_name(&child.target)
                    ),
                ));
            }
        }
        for child in outputs {
            let merged = manifest.merge_child(&child.target, &child.output);
            let bytes: u64 = child.output.groups.iter().map(|g| g.size()).sum();
            *stats
                .emitted_bytes
                .entry(child.target.key().to_string())
                .or_insert(0) += bytes;
            stats.merged_groups += merged;
            debug!(
                target = child.target.key(),
                groups = merged,
                bytes,
                elapsed = ?child.elapsed,
                "child output merged"
            );
        }
        Ok(())
    }

    /// Fork, run and merge
    #[instrument(level = "debug", skip_all, fields(base = %base.name))]
    pub fn run<D: CompilerDriver>(
        &self,
        driver: &D,
        base: &CompilerConfig,
        manifest: &mut AssetManifest,
    ) -> TargetingResult<OrchestratorStats> {
        let start = Instant::now();
        let children = self.fork(base)?;
        let outputs = self.run_children(driver, &children)?;

        let mut stats = OrchestratorStats {
            children: outputs.len(),
            ..OrchestratorStats::default()
        };
        self.merge(manifest, &outputs, &mut stats)?;
        stats.total_time = start.elapsed();

        info!(
            children = stats.children,
            groups = stats.merged_groups,
            elapsed = ?stats.total_time,
            "child compilations merged"
        );
        Ok(stats)
    }

    /// Set loading hints on emitted script tags and count them in `stats`;
    /// returns the number updated
    #[instrument(level = "debug", skip_all)]
    pub fn update_script_tags(
        &self,
        manifest: &AssetManifest,
        tags: &mut Vec<ScriptTag>,
        stats: &mut OrchestratorStats,
    ) -> usize {
        let updated = self.updater.update(manifest, tags);
        stats.tagged_scripts += updated;
        updated
    }
}
