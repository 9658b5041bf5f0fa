//! Reconciler - intake and orchestration surface
//!
//! Ties a [`KindRegistry`] to an [`InstanceCache`] for one run. Resources
//! enter through [`Reconciler::validate_and_register`], which fails fast
//! before any provider call; everything after that works on validated
//! [`ResourceHandle`]s.

use crate::cache::InstanceCache;
use crate::context::{ApplyContext, ListHint, ProgressCallback, Provider};
use crate::error::{Error, Result};
use crate::executor::{self, ExecuteReport};
use crate::graph::{self, DependencyEdge};
use crate::planner::{self, ConvergencePlan};
use crate::resource::KindRegistry;
use crate::types::{DesiredState, ExecuteOptions, OperationResult, ResourceHandle, ResourceReport};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One reconciliation run over a provider
pub struct Reconciler {
    registry: Arc<KindRegistry>,
    cache: InstanceCache,
}

impl Reconciler {
    pub fn new(registry: Arc<KindRegistry>, provider: Arc<dyn Provider>) -> Self {
        Self {
            registry,
            cache: InstanceCache::new(provider),
        }
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Validate a declared resource and bind its identity.
    ///
    /// The title is parsed first. Identity attributes given explicitly among
    /// the properties override what the title bound and are moved out of the
    /// property map. Then every identity binding and property is validated.
    pub fn validate_and_register(
        &self,
        kind: &str,
        title: &str,
        desired: DesiredState,
    ) -> Result<ResourceHandle> {
        let resource_kind = self.registry.get(kind)?;
        let schema = resource_kind.schema();
        let label = format!("{kind}[{title}]");

        let mut identity = resource_kind.parse_title(title)?;
        let mut desired = desired;
        for attribute in schema.identity_attributes() {
            let Some(value) = desired.properties.remove(&attribute.name) else {
                continue;
            };
            match value {
                Value::String(s) => identity.insert(attribute.name.clone(), s),
                _ => {
                    return Err(Error::Validation {
                        resource: label,
                        property: attribute.name.clone(),
                        reason: "must be a string".to_string(),
                    });
                }
            }
        }

        resource_kind.validate(&label, &identity, &desired)?;

        let name = schema
            .primary()
            .and_then(|primary| identity.get(primary))
            .map(str::to_string)
            .ok_or_else(|| Error::Parse {
                kind: kind.to_string(),
                title: title.to_string(),
            })?;

        log::debug!("Accepted {kind}[{name}] with identity {identity}");
        Ok(ResourceHandle {
            kind: kind.to_string(),
            title: title.to_string(),
            identity,
            desired,
            name,
        })
    }

    /// Bulk-fetch every kind the resources use, once.
    ///
    /// The list hint is the set of regions the resources of each kind name.
    /// It only narrows the first listing: a resource missing from it is
    /// looked up again without the hint, so region drift stays visible.
    /// Failures are logged and left for the lazy fetch to retry per resource.
    pub fn prefetch(&self, resources: &[ResourceHandle]) {
        let mut hints: BTreeMap<&str, ListHint> = BTreeMap::new();
        for resource in resources {
            let hint = hints.entry(resource.kind.as_str()).or_default();
            if let Some(region) = resource.desired.get("region").and_then(Value::as_str) {
                hint.regions.insert(region.to_string());
            }
        }

        for (kind, hint) in hints {
            let Ok(resource_kind) = self.registry.get(kind) else {
                continue;
            };
            if let Err(e) = self.cache.prefetch(resource_kind, &hint) {
                log::warn!("Prefetch of {kind} failed: {e}");
            }
        }
    }

    /// Plan one resource against the cached observed state.
    pub fn plan(&self, resource: &ResourceHandle) -> Result<ConvergencePlan> {
        let kind = self.registry.get(&resource.kind)?;
        let observed = self.cache.find(kind, &resource.identity)?;
        Ok(planner::plan(kind, resource, observed.as_ref()))
    }

    /// Apply a plan produced by [`plan`](Self::plan).
    pub fn apply(&self, plan: &ConvergencePlan, dry_run: bool) -> Result<Vec<OperationResult>> {
        let kind = self.registry.get(&plan.resource.kind)?;
        Ok(executor::apply(kind, plan, &self.context(dry_run)))
    }

    /// Plan and apply one resource.
    pub fn converge(&self, resource: &ResourceHandle, dry_run: bool) -> Result<ResourceReport> {
        let kind = self.registry.get(&resource.kind)?;
        Ok(executor::converge(kind, resource, &self.context(dry_run)))
    }

    /// Dependency edges between the resources.
    pub fn edges(&self, resources: &[ResourceHandle]) -> Result<Vec<DependencyEdge>> {
        graph::edges(&self.registry, resources)
    }

    /// Converge every resource in dependency order.
    pub fn execute<P: ProgressCallback>(
        &self,
        resources: &[ResourceHandle],
        opts: &ExecuteOptions,
        progress: &mut P,
    ) -> Result<ExecuteReport> {
        self.prefetch(resources);
        executor::execute(
            &self.registry,
            &self.context(opts.dry_run),
            resources,
            opts,
            progress,
        )
    }

    fn context(&self, dry_run: bool) -> ApplyContext<'_> {
        if dry_run {
            ApplyContext::dry_run(&self.cache)
        } else {
            ApplyContext::new(&self.cache)
        }
    }
}
