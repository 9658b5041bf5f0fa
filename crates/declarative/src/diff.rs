//! Equivalence engine - in-sync verdicts and property drift
//!
//! Both sides of every comparison go through the property's normalization
//! first. Set-valued properties compare as sets of normalized elements, so
//! order and duplicates never cause drift.

use crate::normalize::{NormalizedValue, Normalization, normalize, normalize_set};
use crate::resource::ResourceKind;
use crate::schema::{Cardinality, PropertySpec};
use crate::types::{DesiredState, ObservedState};
use serde_json::Value;
use std::fmt;

/// One drifted property with both sides in canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDrift {
    pub property: String,
    pub desired: NormalizedValue,
    /// `None` when the provider does not report the property at all
    pub observed: Option<NormalizedValue>,
}

impl fmt::Display for PropertyDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.observed {
            Some(observed) => write!(f, "{}: {} -> {}", self.property, observed, self.desired),
            None => write!(f, "{}: (unset) -> {}", self.property, self.desired),
        }
    }
}

/// Properties whose desired and observed values differ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    drifts: Vec<PropertyDrift>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.drifts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.drifts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyDrift> {
        self.drifts.iter()
    }

    /// Names of the drifted properties, in schema order
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.drifts.iter().map(|d| d.property.as_str())
    }

    pub fn contains(&self, property: &str) -> bool {
        self.properties().any(|p| p == property)
    }
}

/// Canonical form of a whole property value.
///
/// Set-valued properties become a sorted array of unique normalized elements.
pub fn normalize_property(spec: &PropertySpec, value: &Value) -> NormalizedValue {
    match spec.cardinality {
        Cardinality::One => normalize(&spec.normalization, value),
        Cardinality::Many => NormalizedValue::from_set(&normalize_set(&spec.normalization, value)),
    }
}

/// Set comparison: in sync iff the symmetric difference of the normalized
/// element sets is empty.
pub fn in_sync_set(strategy: &Normalization, desired: &Value, observed: &Value) -> bool {
    let desired = normalize_set(strategy, desired);
    let observed = normalize_set(strategy, observed);
    desired.symmetric_difference(&observed).next().is_none()
}

/// Whether one property is in sync. A missing observed value is null.
pub fn in_sync(spec: &PropertySpec, desired: &Value, observed: Option<&Value>) -> bool {
    if spec.write_only {
        return true;
    }
    let observed = observed.unwrap_or(&Value::Null);
    match spec.cardinality {
        Cardinality::One => {
            normalize(&spec.normalization, desired) == normalize(&spec.normalization, observed)
        }
        Cardinality::Many => in_sync_set(&spec.normalization, desired, observed),
    }
}

/// Compute the drift of a resource.
///
/// Only properties the desired state specifies are compared; a property the
/// user never set never drifts. Write-only properties are skipped.
pub fn diff<K: ResourceKind + ?Sized>(
    kind: &K,
    desired: &DesiredState,
    observed: &ObservedState,
) -> Diff {
    let mut drifts = Vec::new();
    for spec in kind.schema().properties() {
        if spec.write_only {
            continue;
        }
        let Some(want) = desired.get(&spec.name) else {
            continue;
        };
        let have = observed.get(&spec.name);
        if kind.in_sync(&spec.name, want, have) {
            continue;
        }
        drifts.push(PropertyDrift {
            property: spec.name.clone(),
            desired: kind.normalize(&spec.name, want),
            observed: have.map(|v| kind.normalize(&spec.name, v)),
        });
    }
    Diff { drifts }
}
