//! In-memory provider.
//!
//! Records are kept per kind and keyed by their `name` attribute. Records
//! stored without one (providers report security groups by `group_name` and
//! `vpc`) are matched on the other identity attributes instead. Failures
//! can be queued per operation to exercise error paths, and every call is
//! logged so tests can assert exactly what reached the provider.

use declarative::{
    ErrorCategory, Identity, ListHint, OperationKind, Properties, Provider, ProviderError,
    RawRecord,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Attribute records are keyed by
const KEY: &str = "name";

/// Records of every kind, as a provider would store them
pub type Records = BTreeMap<String, Vec<RawRecord>>;

/// Provider operation, as logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Bulk list
    List,
    /// A mutation
    Mutate(OperationKind),
}

/// One call that reached the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Operation
    pub operation: CallKind,
    /// Kind the call was for
    pub kind: String,
    /// Record name, for mutations
    pub name: Option<String>,
    /// Property, for updates
    pub property: Option<String>,
}

struct Failure {
    operation: CallKind,
    kind: String,
    error: ProviderError,
}

#[derive(Default)]
struct State {
    records: Records,
    failures: Vec<Failure>,
    calls: Vec<Call>,
}

/// Provider backed by process memory
#[derive(Default)]
pub struct MemoryProvider {
    state: Mutex<State>,
}

impl MemoryProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider holding the given records.
    pub fn with_records(records: Records) -> Self {
        let provider = Self::new();
        provider.lock().records = records;
        provider
    }

    /// Store a record directly, bypassing the call log.
    pub fn seed(&self, kind: &str, record: RawRecord) {
        self.lock()
            .records
            .entry(kind.to_string())
            .or_default()
            .push(record);
    }

    /// Make the next matching call fail with `error`.
    pub fn fail_next(&self, operation: CallKind, kind: &str, error: ProviderError) {
        self.lock().failures.push(Failure {
            operation,
            kind: kind.to_string(),
            error,
        });
    }

    /// Calls made so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of mutations made so far.
    pub fn mutation_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c.operation, CallKind::Mutate(_)))
            .count()
    }

    /// Stored records of one kind.
    pub fn records(&self, kind: &str) -> Vec<RawRecord> {
        self.lock().records.get(kind).cloned().unwrap_or_default()
    }

    /// Copy of every stored record.
    pub fn snapshot(&self) -> Records {
        self.lock().records.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    /// Log a call and pop a queued failure for it, if any.
    fn enter(&mut self, call: Call) -> Result<(), ProviderError> {
        let failure = self
            .failures
            .iter()
            .position(|f| f.operation == call.operation && f.kind == call.kind);
        self.calls.push(call);
        match failure {
            Some(index) => Err(self.failures.remove(index).error),
            None => Ok(()),
        }
    }

    fn position(&self, kind: &str, identity: &Identity) -> Option<usize> {
        self.records
            .get(kind)?
            .iter()
            .position(|r| record_matches(r, identity))
    }
}

/// Whether a stored record is the object `identity` names.
///
/// A record with a `name` matches on it alone. A record without one matches
/// when every other identity attribute is present in it with the same value.
fn record_matches(record: &RawRecord, identity: &Identity) -> bool {
    if let Some(name) = record.get_str(KEY) {
        return identity.get(KEY) == Some(name);
    }
    let mut attributes = identity
        .iter()
        .filter(|(attribute, _)| *attribute != KEY)
        .peekable();
    attributes.peek().is_some()
        && attributes.all(|(attribute, value)| record.get_str(attribute) == Some(value))
}

fn key(kind: &str, identity: &Identity) -> Result<String, ProviderError> {
    identity.get(KEY).map(str::to_string).ok_or_else(|| {
        ProviderError::new(ErrorCategory::Other, format!("{kind}: identity has no {KEY}"))
    })
}

fn mutation(operation: OperationKind, kind: &str, name: &str, property: Option<&str>) -> Call {
    Call {
        operation: CallKind::Mutate(operation),
        kind: kind.to_string(),
        name: Some(name.to_string()),
        property: property.map(str::to_string),
    }
}

impl Provider for MemoryProvider {
    fn list(&self, kind: &str, hint: &ListHint) -> Result<Vec<RawRecord>, ProviderError> {
        let mut state = self.lock();
        state.enter(Call {
            operation: CallKind::List,
            kind: kind.to_string(),
            name: None,
            property: None,
        })?;

        Ok(state
            .records
            .get(kind)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| hint.admits(r.get_str("region")))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create(
        &self,
        kind: &str,
        identity: &Identity,
        properties: &Properties,
    ) -> Result<RawRecord, ProviderError> {
        let name = key(kind, identity)?;
        let mut state = self.lock();
        state.enter(mutation(OperationKind::Create, kind, &name, None))?;

        if state.position(kind, identity).is_some() {
            return Err(ProviderError::conflict(format!("{kind} '{name}' already exists")));
        }

        let mut record = RawRecord::new(properties.clone());
        for (attribute, value) in identity.iter() {
            record.properties.insert(attribute.to_string(), Value::from(value));
        }
        state
            .records
            .entry(kind.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    fn update(
        &self,
        kind: &str,
        identity: &Identity,
        property: &str,
        value: &Value,
    ) -> Result<(), ProviderError> {
        let name = key(kind, identity)?;
        let mut state = self.lock();
        state.enter(mutation(OperationKind::Update, kind, &name, Some(property)))?;

        let index = state
            .position(kind, identity)
            .ok_or_else(|| ProviderError::not_found(format!("{kind} '{name}' does not exist")))?;
        let records = state.records.entry(kind.to_string()).or_default();
        let record = &mut records[index].properties;
        if value.is_null() {
            record.remove(property);
        } else {
            record.insert(property.to_string(), value.clone());
        }
        Ok(())
    }

    fn destroy(&self, kind: &str, identity: &Identity) -> Result<(), ProviderError> {
        let name = key(kind, identity)?;
        let mut state = self.lock();
        state.enter(mutation(OperationKind::Destroy, kind, &name, None))?;

        let index = state
            .position(kind, identity)
            .ok_or_else(|| ProviderError::not_found(format!("{kind} '{name}' does not exist")))?;
        state.records.entry(kind.to_string()).or_default().remove(index);
        Ok(())
    }
}
