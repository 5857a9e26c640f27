//! Dependency propagation engine
//!
//! The host driver calls one method per suspension point of module
//! resolution:
//!
//! | hook                      | called when                                  |
//! |---------------------------|----------------------------------------------|
//! | [`before_resolve`]        | a request is about to be resolved            |
//! | [`after_resolve`]         | resolution finished, before graph insertion  |
//! | [`module_created`]        | a module is created from a request           |
//! | [`dependency_added`]      | a targeted module records a dependency       |
//! | [`lazy_context_resolved`] | a code-split / dynamic fragment is resolved  |
//!
//! Each request moves `Untagged -> Targeted -> Chained`. A target, once
//! chosen, is written into the request as a tag; everything a targeted
//! module requires inherits the tag, so propagation is transitive. Where no
//! cause can be traced the target comes from the cycle's assignment ledger.
//!
//! Module identifiers passed back as `issuer` / `origin_module` are the
//! request or resource strings as rewritten by the engine.
//!
//! [`before_resolve`]: PropagationEngine::before_resolve
//! [`after_resolve`]: PropagationEngine::after_resolve
//! [`module_created`]: PropagationEngine::module_created
//! [`dependency_added`]: PropagationEngine::dependency_added
//! [`lazy_context_resolved`]: PropagationEngine::lazy_context_resolved

use crate::context::{DependencyRecord, LazyContext, ResolveData, TargetingState};
use crate::cycle::BuildCycle;
use crate::error::{TargetingError, TargetingResult};
use crate::exclusion::{Exclusion, ExclusionPolicy};
use crate::options::{Externals, TargetingConfig};
use crate::target::{BuildTarget, TargetRegistry};
use polytarget_package::PackageLookup;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Tags requests with targets and rewrites their transform chains
#[derive(Debug)]
pub struct PropagationEngine {
    registry: Arc<TargetRegistry>,
    policy: ExclusionPolicy,
    do_not_target: Vec<Regex>,
    externals: Option<Externals>,
    cycles: AtomicU64,
}

impl PropagationEngine {
    pub fn new(config: &TargetingConfig, lookup: Arc<dyn PackageLookup>) -> TargetingResult<Self> {
        Ok(Self {
            registry: Arc::clone(&config.registry),
            policy: ExclusionPolicy::new(config.exclude.clone(), lookup)?,
            do_not_target: config.do_not_target.clone(),
            externals: config.externals.clone(),
            cycles: AtomicU64::new(0),
        })
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &ExclusionPolicy {
        &self.policy
    }

    /// Start a build or watch cycle with an empty ledger and loader cache
    pub fn begin_cycle(&self) -> BuildCycle {
        let id = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(cycle = id, "targeting cycle started");
        BuildCycle::new(id, &self.registry)
    }

    /// Whether a request may be tagged at all: not listed as do-not-target
    /// and not an external
    pub fn is_targetable_request(&self, request: &str) -> bool {
        let plain = self.registry.tag_syntax().strip(request);
        if self.do_not_target.iter().any(|p| p.is_match(&plain)) {
            return false;
        }
        !self
            .externals
            .as_ref()
            .map_or(false, |externals| externals.matches(&plain))
    }

    /// Exclusion decision for a resolved record; unresolved records are
    /// not excluded yet
    pub fn exclusion(&self, data: &ResolveData) -> Option<Exclusion> {
        let path = data.resource_path.as_deref()?;
        self.policy.exclusion_for(path, data.package.as_deref())
    }

    fn is_eligible(&self, data: &ResolveData) -> bool {
        !data.external && self.is_targetable_request(&data.request) && self.exclusion(data).is_none()
    }

    /// Pre-resolve: pick up a target that is already known, either from a
    /// tag on the request or from the issuing module
    pub fn before_resolve(&self, cycle: &mut BuildCycle, data: &mut ResolveData) -> TargetingResult<()> {
        data.validate()?;
        if data.external || data.target.is_some() || !self.is_targetable_request(&data.request) {
            return Ok(());
        }

        let known = self.registry.target_from_tag(&data.request).or_else(|| {
            data.issuer
                .as_deref()
                .and_then(|issuer| cycle.target_of(issuer))
                .cloned()
        });
        if let Some(target) = known {
            self.apply_target(cycle, data, target);
        }
        Ok(())
    }

    /// Module discovery: tag an eligible module, blind-assigning by
    /// `(issuer, request)` when the request carries no tag
    pub fn module_created(&self, cycle: &mut BuildCycle, data: &mut ResolveData) -> TargetingResult<()> {
        data.validate()?;
        if !self.is_eligible(data) {
            return Ok(());
        }

        let target = match self
            .registry
            .target_from_tag(&data.request)
            .or_else(|| data.target.clone())
        {
            Some(target) => target,
            None => cycle.ledger.assign(data.issuer_key(), &data.request)?,
        };
        self.apply_target(cycle, data, target);
        Ok(())
    }

    /// Dependency interception: tag `dependency` with the owning module's
    /// target. Returns whether the dependency was tagged.
    pub fn dependency_added(
        &self,
        cycle: &BuildCycle,
        module: &ResolveData,
        dependency: &mut DependencyRecord,
    ) -> bool {
        let target = module
            .target
            .as_ref()
            .or_else(|| cycle.target_of(&module.request));
        match target {
            Some(target) => {
                let target = Arc::clone(target);
                self.tag_dependency(dependency, &target, &module.request)
            }
            None => false,
        }
    }

    /// Post-resolve: final target decision for the module, tag rewrite of
    /// request, resource and chunk name, and transform-chain rewrite.
    ///
    /// An excluded module loses any tag it was given, so all targets share
    /// one untransformed copy.
    pub fn after_resolve(&self, cycle: &mut BuildCycle, data: &mut ResolveData) -> TargetingResult<()> {
        data.validate()?;

        if !self.is_eligible(data) {
            self.untarget(cycle, data);
            cycle.loaders.rewrite(&mut data.loaders, None);
            data.state = TargetingState::Chained;
            return Ok(());
        }

        let target = self.resolve_target(cycle, data)?;
        self.apply_target(cycle, data, Arc::clone(&target));
        if let Some(name) = &data.chunk_name {
            data.chunk_name = Some(target.targeted_asset_name(name));
        }
        cycle.loaders.rewrite(&mut data.loaders, Some(&target));
        data.state = TargetingState::Chained;
        Ok(())
    }

    /// Lazy fragment: blind-assign by `(context, request)` unless tagged,
    /// then run `resolve_dependencies` and tag everything it produces with
    /// the same target before handing it back
    pub fn lazy_context_resolved<F, E>(
        &self,
        cycle: &mut BuildCycle,
        lazy: &mut LazyContext,
        resolve_dependencies: F,
    ) -> Result<Vec<DependencyRecord>, E>
    where
        F: FnOnce(&LazyContext) -> Result<Vec<DependencyRecord>, E>,
        E: From<TargetingError>,
    {
        lazy.validate()?;
        if !self.is_targetable_request(&lazy.request) {
            return resolve_dependencies(lazy);
        }

        let target = match self
            .registry
            .target_from_tag(&lazy.request)
            .or_else(|| lazy.target.clone())
        {
            Some(target) => target,
            None => cycle.ledger.assign(&lazy.context, &lazy.request)?,
        };

        lazy.request = target.targeted_request(&self.without_foreign_tag(&lazy.request));
        if let Some(name) = &lazy.chunk_name {
            lazy.chunk_name = Some(target.targeted_asset_name(name));
        }
        cycle.record(&lazy.request, &target);
        lazy.target = Some(Arc::clone(&target));
        debug!(
            context = %lazy.context,
            request = %lazy.request,
            target = target.key(),
            "lazy fragment targeted"
        );

        let mut dependencies = resolve_dependencies(lazy)?;
        for dependency in &mut dependencies {
            self.tag_dependency(dependency, &target, &lazy.request);
        }
        Ok(dependencies)
    }

    fn resolve_target(&self, cycle: &mut BuildCycle, data: &ResolveData) -> TargetingResult<Arc<BuildTarget>> {
        let tagged = self.registry.target_from_tag(&data.request).or_else(|| {
            data.resource
                .as_deref()
                .and_then(|resource| self.registry.target_from_tag(resource))
        });
        if let Some(target) = tagged.or_else(|| data.target.clone()) {
            return Ok(target);
        }

        let inherited = data.dependencies.iter().find_map(|dependency| {
            dependency
                .target
                .clone()
                .or_else(|| self.registry.target_from_tag(&dependency.request))
                .or_else(|| {
                    dependency
                        .origin_module
                        .as_deref()
                        .and_then(|origin| cycle.target_of(origin))
                        .cloned()
                })
        });
        if let Some(target) = inherited {
            debug!(request = %data.request, target = target.key(), "target inherited from dependencies");
            return Ok(target);
        }

        cycle.ledger.assign(data.issuer_key(), &data.request)
    }

    fn apply_target(&self, cycle: &mut BuildCycle, data: &mut ResolveData, target: Arc<BuildTarget>) {
        data.request = target.targeted_request(&self.without_foreign_tag(&data.request));
        cycle.record(&data.request, &target);
        if let Some(resource) = &data.resource {
            let resource = target.targeted_request(&self.without_foreign_tag(resource));
            cycle.record(&resource, &target);
            data.resource = Some(resource);
        }
        debug!(request = %data.request, target = target.key(), "module targeted");
        data.target = Some(target);
        if data.state == TargetingState::Untagged {
            data.state = TargetingState::Targeted;
        }
    }

    fn untarget(&self, cycle: &mut BuildCycle, data: &mut ResolveData) {
        let tag = self.registry.tag_syntax();
        if data.target.is_none() && !tag.is_tagged(&data.request) {
            return;
        }
        cycle.forget(&data.request);
        data.request = tag.strip(&data.request);
        if let Some(resource) = &data.resource {
            cycle.forget(resource);
            data.resource = Some(tag.strip(resource));
        }
        data.target = None;
        debug!(request = %data.request, "excluded module shared by all targets");
    }

    /// Tag one dependency edge. Edges are targeted at most once and a
    /// request already tagged with a registered target keeps it.
    fn tag_dependency(&self, dependency: &mut DependencyRecord, target: &Arc<BuildTarget>, origin: &str) -> bool {
        if dependency.target.is_some() {
            return false;
        }
        if let Some(tagged) = self.registry.target_from_tag(&dependency.request) {
            dependency.target = Some(tagged);
            return false;
        }
        if !self.is_targetable_request(&dependency.request) {
            return false;
        }
        dependency.request = target.targeted_request(&self.without_foreign_tag(&dependency.request));
        dependency.target = Some(Arc::clone(target));
        dependency
            .origin_module
            .get_or_insert_with(|| origin.to_string());
        true
    }

    /// A tag naming no registered target is not ours; drop it so the
    /// request can carry the real one
    fn without_foreign_tag(&self, request: &str) -> String {
        let tag = self.registry.tag_syntax();
        if tag.is_tagged(request) && self.registry.target_from_tag(request).is_none() {
            debug!(request, "unregistered target tag dropped");
            tag.strip(request)
        } else {
            request.to_string()
        }
    }
}
