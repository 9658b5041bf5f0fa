//! Convergence planner - decides what a resource needs
//!
//! | desired \ observed | absent      | present, in sync | present, drifted      |
//! |--------------------|-------------|------------------|-----------------------|
//! | present            | `create`    | nothing          | one `update` per drift|
//! | absent             | nothing     | `destroy`        | `destroy`             |

use crate::diff::Diff;
use crate::resource::ResourceKind;
use crate::types::{DesiredState, Ensure, ObservedState, ResourceHandle};
use serde_json::Value;
use std::fmt;

/// One provider operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(DesiredState),
    Update { property: String, value: Value },
    Destroy,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(_) => write!(f, "create"),
            Self::Update { property, value } => write!(f, "update {property} = {value}"),
            Self::Destroy => write!(f, "destroy"),
        }
    }
}

/// Where a resource stands before convergence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceStatus {
    Absent,
    InSync,
    Drifted(Diff),
}

/// Ordered operations for one resource
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergencePlan {
    pub resource: ResourceHandle,
    pub status: ResourceStatus,
    pub operations: Vec<Operation>,
}

impl ConvergencePlan {
    /// Whether nothing needs to be sent
    pub fn is_noop(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Classify a resource against what the provider reports.
pub fn status(
    kind: &dyn ResourceKind,
    resource: &ResourceHandle,
    observed: Option<&ObservedState>,
) -> ResourceStatus {
    let Some(observed) = observed else {
        return ResourceStatus::Absent;
    };
    let diff = kind.diff(&resource.desired, observed);
    if diff.is_empty() {
        ResourceStatus::InSync
    } else {
        ResourceStatus::Drifted(diff)
    }
}

/// Build the convergence plan for a resource.
///
/// Update operations carry the desired value as the user wrote it, not its
/// normalized form.
pub fn plan(
    kind: &dyn ResourceKind,
    resource: &ResourceHandle,
    observed: Option<&ObservedState>,
) -> ConvergencePlan {
    let status = status(kind, resource, observed);
    let operations = match (resource.desired.ensure, &status) {
        (Ensure::Present, ResourceStatus::Absent) => {
            vec![Operation::Create(resource.desired.clone())]
        }
        (Ensure::Present, ResourceStatus::InSync) => Vec::new(),
        (Ensure::Present, ResourceStatus::Drifted(diff)) => diff
            .properties()
            .filter_map(|property| {
                resource.desired.get(property).map(|value| Operation::Update {
                    property: property.to_string(),
                    value: value.clone(),
                })
            })
            .collect(),
        (Ensure::Absent, ResourceStatus::Absent) => Vec::new(),
        (Ensure::Absent, _) => vec![Operation::Destroy],
    };

    log::debug!(
        "{}: {} operation(s) planned",
        resource,
        operations.len()
    );

    ConvergencePlan {
        resource: resource.clone(),
        status,
        operations,
    }
}

/// Keep only resources matching a target
///
/// Target format: `kind` or `kind.name`. The kind matches exactly or by
/// prefix (`ec2` selects every `ec2_*` kind); the name matches by substring.
pub fn filter_by_target(
    resources: Vec<ResourceHandle>,
    target: Option<&str>,
) -> Vec<ResourceHandle> {
    match target {
        None => resources,
        Some(t) => {
            let (kind, name) = parse_target(t);
            resources
                .into_iter()
                .filter(|r| matches_filter(r, kind.as_deref(), name.as_deref()))
                .collect()
        }
    }
}

/// Parse a target string like "kind.name" into (kind, name)
///
/// Names may contain dots (bucket names often do), so only the first dot splits.
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some(("", name)) => (None, Some(name.to_string())),
        Some((kind, name)) => (Some(kind.to_string()), Some(name.to_string())),
    }
}

fn matches_filter(resource: &ResourceHandle, kind: Option<&str>, name: Option<&str>) -> bool {
    if let Some(k) = kind
        && !resource.kind.starts_with(k)
    {
        return false;
    }

    if let Some(n) = name
        && !resource.name.contains(n)
        && !resource.title.contains(n)
    {
        return false;
    }

    true
}
