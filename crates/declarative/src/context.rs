//! Provider and progress traits, and the apply context
//!
//! These traits let the reconciliation core run without depending on a
//! specific cloud SDK or UI. Backends implement [`Provider`]; front ends
//! implement [`ProgressCallback`].

use crate::cache::InstanceCache;
use crate::error::ProviderError;
use crate::types::{Identity, Properties, RawRecord, ResourceReport};
use serde_json::Value;
use std::collections::BTreeSet;

/// Narrows a bulk list call
///
/// An empty hint means "everything the provider can see".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListHint {
    /// Regions the desired resources of this kind live in
    pub regions: BTreeSet<String>,
}

impl ListHint {
    pub fn regions<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            regions: regions.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the hint narrows nothing
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Whether a record in `region` passes this hint
    pub fn admits(&self, region: Option<&str>) -> bool {
        match region {
            Some(region) if !self.regions.is_empty() => self.regions.contains(region),
            _ => true,
        }
    }
}

/// Cloud provider client
///
/// All calls are synchronous. Implementations tag failures with an
/// [`ErrorCategory`](crate::error::ErrorCategory); the core never retries
/// transport failures on its own.
pub trait Provider: Send + Sync {
    /// Bulk list all instances of a kind.
    fn list(&self, kind: &str, hint: &ListHint) -> Result<Vec<RawRecord>, ProviderError>;

    /// Create an instance and return the record the provider stored.
    fn create(
        &self,
        kind: &str,
        identity: &Identity,
        properties: &Properties,
    ) -> Result<RawRecord, ProviderError>;

    /// Set one property. `Value::Null` clears it.
    fn update(
        &self,
        kind: &str,
        identity: &Identity,
        property: &str,
        value: &Value,
    ) -> Result<(), ProviderError>;

    /// Delete an instance.
    fn destroy(&self, kind: &str, identity: &Identity) -> Result<(), ProviderError>;
}

/// Progress callback for execution
///
/// Resources inside a wave converge in parallel, so per-resource events are
/// reported once the wave has finished.
pub trait ProgressCallback: Send {
    /// Called before a wave of independent resources starts
    fn on_wave_start(&mut self, wave: usize, count: usize);

    /// Called once per resource after its wave finished
    fn on_resource_complete(&mut self, report: &ResourceReport);

    /// Called when a wave completes
    fn on_wave_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_wave_start(&mut self, _wave: usize, _count: usize) {}
    fn on_resource_complete(&mut self, _report: &ResourceReport) {}
    fn on_wave_complete(&mut self) {}
}

/// Context passed to plan application
pub struct ApplyContext<'a> {
    /// Whether this is a dry run (nothing is sent to the provider)
    pub dry_run: bool,
    /// Instance cache for the current run
    pub cache: &'a InstanceCache,
}

impl<'a> ApplyContext<'a> {
    pub fn new(cache: &'a InstanceCache) -> Self {
        Self {
            dry_run: false,
            cache,
        }
    }

    pub fn dry_run(cache: &'a InstanceCache) -> Self {
        Self {
            dry_run: true,
            cache,
        }
    }
}
