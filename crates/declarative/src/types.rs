//! Core types for declarative resource reconciliation

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Property name to value mapping, shared by desired state, observed state
/// and raw provider records
pub type Properties = Map<String, Value>;

/// Whether a resource should exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// Identity attribute bindings of one resource instance
///
/// Keys are the kind's identity attributes (namevars), values are the bound
/// strings. Ordered so identities print and compare deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Identity(BTreeMap<String, String>);

impl Identity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(attribute, value);
        self
    }

    pub fn insert(&mut self, attribute: impl Into<String>, value: impl Into<String>) {
        self.0.insert(attribute.into(), value.into());
    }

    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.0.get(attribute).map(String::as_str)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.0.contains_key(attribute)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// User-declared target configuration for one resource
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub properties: Properties,
}

impl DesiredState {
    pub fn present() -> Self {
        Self::default()
    }

    pub fn absent() -> Self {
        Self {
            ensure: Ensure::Absent,
            properties: Properties::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(property.into(), value.into());
        self
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }

    /// Whether the user specified this property at all.
    pub fn is_specified(&self, property: &str) -> bool {
        self.properties.contains_key(property)
    }
}

/// A record exactly as the provider returned it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    pub properties: Properties,
}

impl RawRecord {
    pub fn new(properties: Properties) -> Self {
        Self { properties }
    }

    /// Builder-style property setter.
    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(property.into(), value.into());
        self
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }

    /// String value of a property, if it is a string.
    pub fn get_str(&self, property: &str) -> Option<&str> {
        self.get(property).and_then(Value::as_str)
    }
}

/// Provider-reported configuration of one resource, keyed by identity
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedState {
    pub identity: Identity,
    pub properties: Properties,
}

impl ObservedState {
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }
}

/// Reference to a resource by kind and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

/// A validated resource accepted at the intake boundary
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceHandle {
    pub kind: String,
    pub title: String,
    pub identity: Identity,
    pub desired: DesiredState,
    /// Value of the kind's primary identity attribute
    pub name: String,
}

impl ResourceHandle {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(&self.kind, &self.name)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

/// Kind of provider operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Destroy,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Destroy => write!(f, "destroy"),
        }
    }
}

/// How a single provider operation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Provider acknowledged the operation
    Applied,
    /// Operation was not sent
    Skipped { reason: String },
    /// Provider rejected or failed the operation
    Failed { error: String },
}

/// Result of applying one operation of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub resource: ResourceRef,
    pub operation: OperationKind,
    pub property: Option<String>,
    pub outcome: Outcome,
}

impl OperationResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, Outcome::Failed { .. })
    }

    /// Check if the provider was actually changed
    pub fn is_change(&self) -> bool {
        matches!(self.outcome, Outcome::Applied)
    }
}

/// How one resource ended up after a convergence pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceOutcome {
    /// Already in sync, nothing sent
    Unchanged,
    /// Operations were planned and applied (individually successful or not)
    Converged(Vec<OperationResult>),
    /// Not attempted, e.g. because a dependency failed
    Skipped { reason: String },
    /// Could not be planned (observed state unavailable)
    Failed { error: String },
}

/// Per-resource result of a convergence pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub resource: ResourceRef,
    pub outcome: ResourceOutcome,
}

impl ResourceReport {
    /// Whether any part of this resource failed
    pub fn is_failure(&self) -> bool {
        match &self.outcome {
            ResourceOutcome::Failed { .. } => true,
            ResourceOutcome::Converged(results) => results.iter().any(|r| !r.is_success()),
            _ => false,
        }
    }

    /// Whether dependents of this resource must not run
    pub fn blocks_dependents(&self) -> bool {
        self.is_failure() || matches!(self.outcome, ResourceOutcome::Skipped { .. })
    }

    /// Operation results, empty unless the resource converged
    pub fn results(&self) -> &[OperationResult] {
        match &self.outcome {
            ResourceOutcome::Converged(results) => results.as_slice(),
            _ => &[],
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.destroyed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Add a resource report to the summary
    pub fn add_report(&mut self, report: &ResourceReport) {
        match &report.outcome {
            ResourceOutcome::Unchanged => self.unchanged += 1,
            ResourceOutcome::Converged(results) => {
                for result in results {
                    self.add_result(result);
                }
            }
            ResourceOutcome::Skipped { .. } => self.skipped += 1,
            ResourceOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Add an operation result to the summary
    pub fn add_result(&mut self, result: &OperationResult) {
        match (&result.outcome, result.operation) {
            (Outcome::Applied, OperationKind::Create) => self.created += 1,
            (Outcome::Applied, OperationKind::Update) => self.updated += 1,
            (Outcome::Applied, OperationKind::Destroy) => self.destroyed += 1,
            (Outcome::Skipped { .. }, _) => self.skipped += 1,
            (Outcome::Failed { .. }, _) => self.failed += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Plan only, send nothing to the provider
    pub dry_run: bool,
    /// Number of resources converged in parallel within a dependency wave
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensure_serde_is_lowercase() {
        let ensure: Ensure = serde_json::from_str("\"absent\"").unwrap();
        assert_eq!(ensure, Ensure::Absent);
        assert_eq!(Ensure::default(), Ensure::Present);
        assert_eq!(ensure.to_string(), "absent");
    }

    #[test]
    fn test_identity_display_is_sorted() {
        let identity = Identity::new()
            .with("name", "myvpc::default")
            .with("group_name", "default")
            .with("vpc", "myvpc");
        assert_eq!(
            identity.to_string(),
            "{group_name=default, name=myvpc::default, vpc=myvpc}"
        );
    }

    #[test]
    fn test_desired_state_deserializes_with_defaults() {
        let desired: DesiredState =
            serde_json::from_value(json!({"properties": {"region": "us-east-1"}})).unwrap();
        assert_eq!(desired.ensure, Ensure::Present);
        assert!(desired.is_specified("region"));
        assert!(!desired.is_specified("description"));
    }

    #[test]
    fn test_report_failure_and_blocking() {
        let resource = ResourceRef::new("ec2_securitygroup", "web-sg");
        let failed_update = ResourceReport {
            resource: resource.clone(),
            outcome: ResourceOutcome::Converged(vec![OperationResult {
                resource: resource.clone(),
                operation: OperationKind::Update,
                property: Some("ingress".into()),
                outcome: Outcome::Failed {
                    error: "timeout".into(),
                },
            }]),
        };
        assert!(failed_update.is_failure());
        assert!(failed_update.blocks_dependents());

        let skipped = ResourceReport {
            resource,
            outcome: ResourceOutcome::Skipped {
                reason: "dependency failed".into(),
            },
        };
        assert!(!skipped.is_failure());
        assert!(skipped.blocks_dependents());

        let mut summary = ExecuteSummary::default();
        summary.add_report(&failed_update);
        summary.add_report(&skipped);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_summary_counts_by_operation() {
        let resource = ResourceRef::new("s3_bucket", "logs");
        let mut summary = ExecuteSummary::default();
        for (operation, outcome) in [
            (OperationKind::Create, Outcome::Applied),
            (OperationKind::Update, Outcome::Applied),
            (
                OperationKind::Update,
                Outcome::Failed {
                    error: "boom".into(),
                },
            ),
        ] {
            summary.add_result(&OperationResult {
                resource: resource.clone(),
                operation,
                property: None,
                outcome,
            });
        }
        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_changes(), 2);
        assert!(!summary.is_success());
    }
}
