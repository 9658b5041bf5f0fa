//! Execution engine - applies convergence plans
//!
//! Within one resource everything is sequential: fetch, plan, apply. Across
//! resources the executor runs dependency waves; resources inside a wave are
//! independent and converge in parallel on a rayon pool bounded by `jobs`.

use crate::context::{ApplyContext, ProgressCallback};
use crate::error::{Error, ErrorCategory, ProviderError, Result};
use crate::graph::{self, DependencyEdge};
use crate::planner::{self, ConvergencePlan, Operation};
use crate::resource::{KindRegistry, ResourceKind};
use crate::types::{
    DesiredState, ExecuteOptions, ExecuteSummary, OperationKind, OperationResult, Outcome,
    Properties, ResourceHandle, ResourceOutcome, ResourceRef, ResourceReport,
};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::HashSet;

/// Everything a convergence pass produced
#[derive(Debug, Clone, Default)]
pub struct ExecuteReport {
    pub summary: ExecuteSummary,
    /// One report per resource, in input order
    pub reports: Vec<ResourceReport>,
}

/// Apply a plan's operations in order.
///
/// Property updates are independent: one failing does not stop the others.
/// Every mutation resets the kind's cache slot.
pub fn apply(
    kind: &dyn ResourceKind,
    plan: &ConvergencePlan,
    ctx: &ApplyContext,
) -> Vec<OperationResult> {
    let resource = &plan.resource;

    if ctx.dry_run {
        return plan
            .operations
            .iter()
            .map(|op| {
                let (operation, property) = describe(op);
                result(
                    resource,
                    operation,
                    property,
                    Outcome::Skipped {
                        reason: "dry run".to_string(),
                    },
                )
            })
            .collect();
    }

    let mut results = Vec::with_capacity(plan.operations.len());
    for operation in &plan.operations {
        match operation {
            Operation::Create(desired) => results.extend(create(kind, resource, desired, ctx)),
            Operation::Update { property, value } => {
                results.push(update(kind, resource, property, value, ctx));
            }
            Operation::Destroy => results.push(destroy(kind, resource, ctx)),
        }
    }
    results
}

/// Fetch, plan and apply one resource.
pub fn converge(
    kind: &dyn ResourceKind,
    resource: &ResourceHandle,
    ctx: &ApplyContext,
) -> ResourceReport {
    let observed = match ctx.cache.find(kind, &resource.identity) {
        Ok(observed) => observed,
        Err(e) => {
            log::warn!("{resource}: {e}");
            return report(
                resource.reference(),
                ResourceOutcome::Failed {
                    error: e.to_string(),
                },
            );
        }
    };

    let plan = planner::plan(kind, resource, observed.as_ref());
    if plan.is_noop() {
        return report(resource.reference(), ResourceOutcome::Unchanged);
    }
    report(
        resource.reference(),
        ResourceOutcome::Converged(apply(kind, &plan, ctx)),
    )
}

/// Converge a set of resources in dependency order.
///
/// Resources whose dependencies failed or were skipped are skipped in turn.
/// Fails as a whole only for unknown kinds, dependency cycles or a pool that
/// cannot start; everything else is reported per resource.
pub fn execute<P: ProgressCallback>(
    registry: &KindRegistry,
    ctx: &ApplyContext,
    resources: &[ResourceHandle],
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<ExecuteReport> {
    let edges = graph::edges(registry, resources)?;
    let waves = graph::waves(resources, &edges)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()?;

    let mut summary = ExecuteSummary::default();
    let mut reports: Vec<Option<ResourceReport>> = vec![None; resources.len()];
    let mut blocked: HashSet<ResourceRef> = HashSet::new();

    for (number, wave) in waves.iter().enumerate() {
        progress.on_wave_start(number + 1, wave.len());

        let wave_reports: Vec<ResourceReport> = pool.install(|| {
            wave.par_iter()
                .map(|&i| converge_one(registry, ctx, &resources[i], &edges, &blocked))
                .collect()
        });

        for (&i, wave_report) in wave.iter().zip(wave_reports) {
            progress.on_resource_complete(&wave_report);
            summary.add_report(&wave_report);
            if wave_report.blocks_dependents() {
                blocked.insert(wave_report.resource.clone());
            }
            reports[i] = Some(wave_report);
        }

        progress.on_wave_complete();
    }

    log::info!(
        "Converged {} resources: {} created, {} updated, {} destroyed, {} failed",
        resources.len(),
        summary.created,
        summary.updated,
        summary.destroyed,
        summary.failed
    );

    Ok(ExecuteReport {
        summary,
        reports: reports.into_iter().flatten().collect(),
    })
}

fn converge_one(
    registry: &KindRegistry,
    ctx: &ApplyContext,
    resource: &ResourceHandle,
    edges: &[DependencyEdge],
    blocked: &HashSet<ResourceRef>,
) -> ResourceReport {
    let reference = resource.reference();
    if let Some(edge) = edges
        .iter()
        .find(|e| e.from == reference && blocked.contains(&e.to))
    {
        log::warn!("{resource}: skipped, dependency {} did not converge", edge.to);
        return report(
            reference,
            ResourceOutcome::Skipped {
                reason: format!("dependency {} did not converge", edge.to),
            },
        );
    }

    match registry.get(&resource.kind) {
        Ok(kind) => converge(kind, resource, ctx),
        Err(e) => report(
            reference,
            ResourceOutcome::Failed {
                error: e.to_string(),
            },
        ),
    }
}

fn create(
    kind: &dyn ResourceKind,
    resource: &ResourceHandle,
    desired: &DesiredState,
    ctx: &ApplyContext,
) -> Vec<OperationResult> {
    let properties: Properties = desired
        .properties
        .iter()
        .filter_map(|(property, value)| {
            let value = kind.provider_value(property, value);
            (!value.is_null()).then(|| (property.clone(), value))
        })
        .collect();

    let outcome = ctx.cache.mutate(kind.name(), |provider| {
        provider.create(kind.name(), &resource.identity, &properties)
    });

    match outcome {
        Ok(_) => {
            log::info!("Created {resource}");
            vec![result(resource, OperationKind::Create, None, Outcome::Applied)]
        }
        Err(conflict) if conflict.category().is_benign_race() => {
            log::warn!("{resource}: {conflict}; re-verifying against a fresh fetch");
            reverify(kind, resource, conflict, ctx)
        }
        Err(source) => {
            let err = Error::provider(resource.to_string(), source);
            log::warn!("{err}");
            vec![failed(resource, OperationKind::Create, None, &err)]
        }
    }
}

/// Re-evaluate once after a create conflict and apply whatever updates remain.
fn reverify(
    kind: &dyn ResourceKind,
    resource: &ResourceHandle,
    conflict: ProviderError,
    ctx: &ApplyContext,
) -> Vec<OperationResult> {
    let observed = match ctx.cache.find(kind, &resource.identity) {
        Ok(Some(observed)) => observed,
        Ok(None) => {
            let err = Error::provider(resource.to_string(), conflict);
            return vec![failed(resource, OperationKind::Create, None, &err)];
        }
        Err(err) => return vec![failed(resource, OperationKind::Create, None, &err)],
    };

    let mut results = vec![result(
        resource,
        OperationKind::Create,
        None,
        Outcome::Skipped {
            reason: format!("already exists: {conflict}"),
        },
    )];

    let plan = planner::plan(kind, resource, Some(&observed));
    for operation in &plan.operations {
        if let Operation::Update { property, value } = operation {
            results.push(update(kind, resource, property, value, ctx));
        }
    }
    results
}

fn update(
    kind: &dyn ResourceKind,
    resource: &ResourceHandle,
    property: &str,
    value: &Value,
    ctx: &ApplyContext,
) -> OperationResult {
    let value = kind.provider_value(property, value);
    let outcome = ctx.cache.mutate(kind.name(), |provider| {
        provider.update(kind.name(), &resource.identity, property, &value)
    });

    match outcome {
        Ok(()) => {
            log::info!("Updated {resource} property '{property}'");
            result(resource, OperationKind::Update, Some(property), Outcome::Applied)
        }
        Err(source) => {
            let err = Error::Provider {
                resource: resource.to_string(),
                property: Some(property.to_string()),
                source,
            };
            log::warn!("{err}");
            failed(resource, OperationKind::Update, Some(property), &err)
        }
    }
}

fn destroy(
    kind: &dyn ResourceKind,
    resource: &ResourceHandle,
    ctx: &ApplyContext,
) -> OperationResult {
    let outcome = ctx.cache.mutate(kind.name(), |provider| {
        provider.destroy(kind.name(), &resource.identity)
    });

    match outcome {
        Ok(()) => {
            log::info!("Destroyed {resource}");
            result(resource, OperationKind::Destroy, None, Outcome::Applied)
        }
        Err(e) if e.category() == ErrorCategory::NotFound => {
            log::debug!("{resource}: already gone ({e})");
            result(
                resource,
                OperationKind::Destroy,
                None,
                Outcome::Skipped {
                    reason: "already absent".to_string(),
                },
            )
        }
        Err(source) => {
            let err = Error::provider(resource.to_string(), source);
            log::warn!("{err}");
            failed(resource, OperationKind::Destroy, None, &err)
        }
    }
}

fn describe(operation: &Operation) -> (OperationKind, Option<&str>) {
    match operation {
        Operation::Create(_) => (OperationKind::Create, None),
        Operation::Update { property, .. } => (OperationKind::Update, Some(property.as_str())),
        Operation::Destroy => (OperationKind::Destroy, None),
    }
}

fn result(
    resource: &ResourceHandle,
    operation: OperationKind,
    property: Option<&str>,
    outcome: Outcome,
) -> OperationResult {
    OperationResult {
        resource: resource.reference(),
        operation,
        property: property.map(str::to_string),
        outcome,
    }
}

fn failed(
    resource: &ResourceHandle,
    operation: OperationKind,
    property: Option<&str>,
    error: &Error,
) -> OperationResult {
    result(
        resource,
        operation,
        property,
        Outcome::Failed {
            error: error.to_string(),
        },
    )
}

fn report(resource: ResourceRef, outcome: ResourceOutcome) -> ResourceReport {
    ResourceReport { resource, outcome }
}
