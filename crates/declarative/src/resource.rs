//! Resource kinds and the kind registry
//!
//! A [`ResourceKind`] is the capability set of one kind of cloud object:
//! validate desired state, parse titles, normalize and compare values, derive
//! identities from provider records and report references to other
//! resources. Every capability has a default driven by the kind's
//! [`KindSchema`]; kinds override only what their provider does differently.
//!
//! # Example
//!
//! ```
//! use declarative::resource::{KindRegistry, ResourceKind};
//! use declarative::schema::{KindSchema, PropertySpec, Validator};
//!
//! struct Bucket(KindSchema);
//!
//! impl ResourceKind for Bucket {
//!     fn schema(&self) -> &KindSchema {
//!         &self.0
//!     }
//! }
//!
//! let mut registry = KindRegistry::new();
//! registry
//!     .register(Bucket(
//!         KindSchema::new("s3_bucket")
//!             .identity(PropertySpec::one("name").validate(Validator::NonEmpty))
//!             .property(PropertySpec::one("region")),
//!     ))
//!     .unwrap();
//!
//! let identity = registry.get("s3_bucket").unwrap().parse_title("logs").unwrap();
//! assert_eq!(identity.get("name"), Some("logs"));
//! ```

use crate::diff::{self, Diff};
use crate::error::{Error, Result};
use crate::normalize::{NormalizedValue, normalize};
use crate::schema::KindSchema;
use crate::types::{DesiredState, Identity, ObservedState, Properties, RawRecord, ResourceHandle};
use serde_json::Value;
use std::collections::BTreeMap;

/// A reference from one resource to another, found in its desired state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Kind of the referenced resource
    pub kind: String,
    /// Name (primary identity value) of the referenced resource
    pub name: String,
    /// Property or attribute the reference was found in
    pub via: String,
}

impl Reference {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, via: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            via: via.into(),
        }
    }
}

/// Capability set of one resource kind
pub trait ResourceKind: Send + Sync {
    /// Static schema of this kind
    fn schema(&self) -> &KindSchema;

    /// Kind name, e.g. `ec2_securitygroup`
    fn name(&self) -> &str {
        self.schema().name()
    }

    /// Parse a title into identity bindings.
    fn parse_title(&self, title: &str) -> Result<Identity> {
        self.schema().title_parser().parse(self.name(), title)
    }

    /// Validate identity bindings and desired properties. Never touches a provider.
    fn validate(&self, resource: &str, identity: &Identity, desired: &DesiredState) -> Result<()> {
        self.schema().validate(resource, identity, desired)
    }

    /// Canonical comparison form of a property value.
    fn normalize(&self, property: &str, value: &Value) -> NormalizedValue {
        match self.schema().property_spec(property) {
            Some(spec) => diff::normalize_property(spec, value),
            None => normalize(&Default::default(), value),
        }
    }

    /// Whether one desired property matches what the provider reports.
    fn in_sync(&self, property: &str, desired: &Value, observed: Option<&Value>) -> bool {
        match self.schema().property_spec(property) {
            Some(spec) => diff::in_sync(spec, desired, observed),
            None => false,
        }
    }

    /// Drift between desired and observed state.
    fn diff(&self, desired: &DesiredState, observed: &ObservedState) -> Diff {
        diff::diff(self, desired, observed)
    }

    /// Derive identity and properties from a raw provider record.
    ///
    /// Records without the primary identity attribute are dropped.
    fn observe(&self, record: &RawRecord) -> Option<ObservedState> {
        observe_record(self.schema(), record)
    }

    /// Value to send to the provider for a property.
    ///
    /// `Value::Null` asks the provider to clear the property.
    fn provider_value(&self, _property: &str, value: &Value) -> Value {
        value.clone()
    }

    /// References to other resources. The default reports the parent association.
    fn references(&self, resource: &ResourceHandle) -> Vec<Reference> {
        parent_reference(self.schema(), resource).into_iter().collect()
    }
}

/// Split a raw record into identity attributes and properties per the schema.
pub fn observe_record(schema: &KindSchema, record: &RawRecord) -> Option<ObservedState> {
    let primary = schema.primary()?;
    record.get_str(primary)?;

    let mut identity = Identity::new();
    let mut properties = Properties::new();
    for (key, value) in &record.properties {
        match (schema.is_identity(key), value) {
            (true, Value::String(s)) => identity.insert(key.clone(), s.clone()),
            (true, _) => {}
            (false, _) => {
                properties.insert(key.clone(), value.clone());
            }
        }
    }
    Some(ObservedState {
        identity,
        properties,
    })
}

/// Reference to the parent named by the schema's parent attribute, if bound.
pub fn parent_reference(schema: &KindSchema, resource: &ResourceHandle) -> Option<Reference> {
    let parent = schema.parent_spec()?;
    let name = resource
        .identity
        .get(&parent.attribute)
        .or_else(|| resource.desired.get(&parent.attribute).and_then(Value::as_str))?;
    Some(Reference::new(&parent.kind, name, &parent.attribute))
}

/// Process-wide set of registered kinds, read-only after startup
#[derive(Default)]
pub struct KindRegistry {
    kinds: BTreeMap<String, Box<dyn ResourceKind>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind after checking its schema.
    pub fn register(&mut self, kind: impl ResourceKind + 'static) -> Result<()> {
        kind.schema().check()?;
        let name = kind.name().to_string();
        if self.kinds.contains_key(&name) {
            return Err(Error::Schema {
                kind: name,
                message: "kind is already registered".to_string(),
            });
        }
        log::debug!("Registered resource kind {name}");
        self.kinds.insert(name, Box::new(kind));
        Ok(())
    }

    /// Look up a kind by name.
    pub fn get(&self, name: &str) -> Result<&dyn ResourceKind> {
        self.kinds
            .get(name)
            .map(Box::as_ref)
            .ok_or_else(|| Error::UnknownKind(name.to_string()))
    }

    /// Registered kind names, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
