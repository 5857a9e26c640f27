//! Blind target assignment
//!
//! When the engine cannot trace which target caused a request, it hands
//! out targets in configuration order, once each, per `(issuer, request)`
//! pair. A pair asking for more targets than are configured is a fatal
//! topology error.
//!
//! Results are deterministic for a given call order only. The call order
//! is the host's module traversal order, which this crate does not control;
//! two builds that traverse differently can pair targets with references
//! differently. This is accepted, not a bug.

use crate::error::{TargetingError, TargetingResult};
use crate::target::{BuildTarget, TargetRegistry};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Per-cycle record of targets still available to each `(issuer, request)`
#[derive(Debug, Clone)]
pub struct AssignmentLedger {
    targets: Vec<Arc<BuildTarget>>,
    remaining: HashMap<(String, String), VecDeque<Arc<BuildTarget>>>,
}

impl AssignmentLedger {
    pub fn new(registry: &TargetRegistry) -> Self {
        Self {
            targets: registry.targets().to_vec(),
            remaining: HashMap::new(),
        }
    }

    /// Take the next unassigned target for `(issuer, key)`
    pub fn assign(&mut self, issuer: &str, key: &str) -> TargetingResult<Arc<BuildTarget>> {
        let queue = self
            .remaining
            .entry((issuer.to_string(), key.to_string()))
            .or_insert_with(|| self.targets.iter().cloned().collect());

        let target = queue
            .pop_front()
            .ok_or_else(|| TargetingError::exhausted(issuer, key))?;

        tracing::debug!(
            issuer,
            request = key,
            target = target.key(),
            left = queue.len(),
            "blind target assignment"
        );
        Ok(target)
    }

    /// Targets not yet handed out for `(issuer, key)`
    pub fn remaining(&self, issuer: &str, key: &str) -> usize {
        self.remaining
            .get(&(issuer.to_string(), key.to_string()))
            .map_or(self.targets.len(), VecDeque::len)
    }

    /// Number of pairs seen so far
    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}
