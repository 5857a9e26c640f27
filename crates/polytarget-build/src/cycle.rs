//! Per-build-cycle mutable state
use crate::ledger::AssignmentLedger;
use crate::loader::LoaderRewriter;
use crate::target::{BuildTarget, TargetRegistry};
use std::collections::HashMap;
use std::sync::Arc;

/// State owned by one build or watch cycle of one compilation.
///
/// Construct a fresh cycle for every build, rebuild and child compilation;
/// never share one between children. Dropping a cycle discards all
/// in-flight tagging state, which is how an aborted build is cancelled.
#[derive(Debug)]
pub struct BuildCycle {
    id: u64,
    pub(crate) ledger: AssignmentLedger,
    pub(crate) loaders: LoaderRewriter,
    module_targets: HashMap<String, Arc<BuildTarget>>,
}

impl BuildCycle {
    pub(crate) fn new(id: u64, registry: &TargetRegistry) -> Self {
        Self {
            id,
            ledger: AssignmentLedger::new(registry),
            loaders: LoaderRewriter::new(),
            module_targets: HashMap::new(),
        }
    }

    /// Sequence number of this cycle
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Target recorded for a module identifier (request or resource)
    pub fn target_of(&self, module: &str) -> Option<&Arc<BuildTarget>> {
        self.module_targets.get(module)
    }

    /// Number of module identifiers with a recorded target
    pub fn targeted_modules(&self) -> usize {
        self.module_targets.len()
    }

    pub fn ledger(&self) -> &AssignmentLedger {
        &self.ledger
    }

    pub(crate) fn record(&mut self, module: &str, target: &Arc<BuildTarget>) {
        self.module_targets
            .insert(module.to_string(), Arc::clone(target));
    }

    pub(crate) fn forget(&mut self, module: &str) {
        self.module_targets.remove(module);
    }
}
