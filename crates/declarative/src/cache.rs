//! Provider instance cache
//!
//! One bulk `list` call per kind and run, memoized until a mutation on that
//! kind resets it. Each kind has its own slot behind its own mutex; a
//! mutation holds the slot from the provider call until the reset, so no
//! reader can see the pre-mutation snapshot once the mutation has begun.
//!
//! A failed fetch leaves the slot empty: the next access fetches again
//! instead of serving a partial list.
//!
//! Listings may be narrowed by a [`ListHint`]. A lookup that misses in a
//! narrowed listing lists the kind again without the hint before reporting
//! the instance absent, so an object that drifted out of the hinted regions
//! is still found.

use crate::context::{ListHint, Provider};
use crate::error::{Error, ProviderError, Result};
use crate::resource::ResourceKind;
use crate::types::{Identity, ObservedState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Slot {
    instances: Option<Arc<Vec<ObservedState>>>,
    hint: ListHint,
    /// Whether `instances` came from an unnarrowed listing
    complete: bool,
}

/// Memoized observed state, one slot per kind
pub struct InstanceCache {
    provider: Arc<dyn Provider>,
    slots: Mutex<HashMap<String, Arc<Mutex<Slot>>>>,
    fetches: AtomicUsize,
}

impl InstanceCache {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            slots: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of bulk list calls issued so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Bulk-fetch a kind once. Later calls are no-ops until [`reset`](Self::reset).
    ///
    /// The hint is remembered for lazy refetches after a reset.
    pub fn prefetch(&self, kind: &dyn ResourceKind, hint: &ListHint) -> Result<()> {
        let slot = self.slot(kind.name());
        let mut slot = lock(&slot);
        slot.hint = hint.clone();
        if slot.instances.is_none() {
            self.fetch(kind, &mut slot, hint)?;
        }
        Ok(())
    }

    /// Memoized instances of a kind, fetched on first access.
    pub fn instances(&self, kind: &dyn ResourceKind) -> Result<Arc<Vec<ObservedState>>> {
        let slot = self.slot(kind.name());
        let mut slot = lock(&slot);
        self.load(kind, &mut slot)
    }

    /// Discard a kind's instances so the next access refetches.
    pub fn reset(&self, kind: &str) {
        let slot = self.slot(kind);
        lock(&slot).clear();
        log::debug!("Reset instance cache for {kind}");
    }

    /// Observed state of the instance whose primary identity matches.
    ///
    /// A miss in a listing narrowed by the hint is confirmed against an
    /// unnarrowed listing, which then stays cached until the next reset.
    pub fn find(
        &self,
        kind: &dyn ResourceKind,
        identity: &Identity,
    ) -> Result<Option<ObservedState>> {
        let Some(primary) = kind.schema().primary() else {
            return Ok(None);
        };
        let Some(wanted) = identity.get(primary) else {
            return Ok(None);
        };
        let lookup = |instances: &[ObservedState]| {
            instances
                .iter()
                .find(|observed| observed.identity.get(primary) == Some(wanted))
                .cloned()
        };

        let slot = self.slot(kind.name());
        let mut slot = lock(&slot);
        let instances = self.load(kind, &mut slot)?;
        if let Some(found) = lookup(instances.as_slice()) {
            return Ok(Some(found));
        }
        if slot.complete {
            return Ok(None);
        }

        log::debug!(
            "{}[{wanted}] not in the narrowed listing, listing without hint",
            kind.name()
        );
        let instances = self.fetch(kind, &mut slot, &ListHint::default())?;
        Ok(lookup(instances.as_slice()))
    }

    pub fn exists(&self, kind: &dyn ResourceKind, identity: &Identity) -> Result<bool> {
        Ok(self.find(kind, identity)?.is_some())
    }

    /// Run a provider mutation on a kind, then reset the kind.
    ///
    /// The slot stays locked for the whole call, and the reset happens
    /// whether or not the provider accepted the mutation.
    pub fn mutate<T>(
        &self,
        kind: &str,
        op: impl FnOnce(&dyn Provider) -> std::result::Result<T, ProviderError>,
    ) -> std::result::Result<T, ProviderError> {
        let slot = self.slot(kind);
        let mut slot = lock(&slot);
        let result = op(self.provider.as_ref());
        slot.clear();
        log::debug!("Reset instance cache for {kind} after mutation");
        result
    }

    fn slot(&self, kind: &str) -> Arc<Mutex<Slot>> {
        let mut slots = lock(&self.slots);
        Arc::clone(slots.entry(kind.to_string()).or_default())
    }

    /// Cached instances, or a listing with the slot's hint.
    fn load(&self, kind: &dyn ResourceKind, slot: &mut Slot) -> Result<Arc<Vec<ObservedState>>> {
        if let Some(instances) = &slot.instances {
            return Ok(Arc::clone(instances));
        }
        let hint = slot.hint.clone();
        self.fetch(kind, slot, &hint)
    }

    fn fetch(
        &self,
        kind: &dyn ResourceKind,
        slot: &mut Slot,
        hint: &ListHint,
    ) -> Result<Arc<Vec<ObservedState>>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        log::debug!("Fetching {} instances", kind.name());

        let records = self
            .provider
            .list(kind.name(), hint)
            .map_err(|source| Error::provider(kind.name(), source))?;

        let instances: Vec<ObservedState> =
            records.iter().filter_map(|r| kind.observe(r)).collect();
        log::debug!("Fetched {} {} instances", instances.len(), kind.name());

        let instances = Arc::new(instances);
        slot.instances = Some(Arc::clone(&instances));
        slot.complete = hint.is_empty();
        Ok(instances)
    }
}

impl Slot {
    fn clear(&mut self) {
        self.instances = None;
        self.complete = false;
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{KindSchema, PropertySpec};
    use crate::types::{Properties, RawRecord};
    use serde_json::Value;

    struct Bucket(KindSchema);

    impl ResourceKind for Bucket {
        fn schema(&self) -> &KindSchema {
            &self.0
        }
    }

    fn bucket() -> Bucket {
        Bucket(
            KindSchema::new("s3_bucket")
                .identity(PropertySpec::one("name"))
                .property(PropertySpec::one("region")),
        )
    }

    /// Provider with a fixed record list and a switchable list failure
    #[derive(Default)]
    struct Fixed {
        records: Mutex<Vec<RawRecord>>,
        failing: Mutex<bool>,
        hints: Mutex<Vec<ListHint>>,
    }

    impl Provider for Fixed {
        fn list(
            &self,
            _kind: &str,
            hint: &ListHint,
        ) -> std::result::Result<Vec<RawRecord>, ProviderError> {
            self.hints.lock().unwrap().push(hint.clone());
            if *self.failing.lock().unwrap() {
                return Err(ProviderError::transport("connection reset"));
            }
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| hint.admits(r.get_str("region")))
                .cloned()
                .collect())
        }

        fn create(
            &self,
            _kind: &str,
            identity: &Identity,
            _properties: &Properties,
        ) -> std::result::Result<RawRecord, ProviderError> {
            let name = identity.get("name").unwrap_or_default();
            let record = RawRecord::default().with("name", name);
            self.records.lock().unwrap().push(record.clone());
            Ok(record)
        }

        fn update(
            &self,
            _kind: &str,
            _identity: &Identity,
            _property: &str,
            _value: &Value,
        ) -> std::result::Result<(), ProviderError> {
            Ok(())
        }

        fn destroy(
            &self,
            _kind: &str,
            _identity: &Identity,
        ) -> std::result::Result<(), ProviderError> {
            Err(ProviderError::not_found("no such bucket"))
        }
    }

    fn cache_with(records: Vec<RawRecord>) -> (Arc<Fixed>, InstanceCache) {
        let provider = Arc::new(Fixed::default());
        *provider.records.lock().unwrap() = records;
        let cache = InstanceCache::new(provider.clone());
        (provider, cache)
    }

    fn logs() -> Identity {
        Identity::new().with("name", "logs")
    }

    #[test]
    fn test_prefetch_fetches_once() {
        let (_, cache) = cache_with(vec![RawRecord::default().with("name", "logs")]);
        let kind = bucket();
        cache.prefetch(&kind, &ListHint::default()).unwrap();
        cache.prefetch(&kind, &ListHint::default()).unwrap();
        assert!(cache.exists(&kind, &logs()).unwrap());
        assert_eq!(cache.fetch_count(), 1);
    }

    #[test]
    fn test_instances_fetches_lazily() {
        let (_, cache) = cache_with(vec![RawRecord::default().with("name", "logs")]);
        assert_eq!(cache.fetch_count(), 0);
        assert_eq!(cache.instances(&bucket()).unwrap().len(), 1);
        assert_eq!(cache.fetch_count(), 1);
    }

    #[test]
    fn test_reset_forces_refetch() {
        let (_, cache) = cache_with(Vec::new());
        let kind = bucket();
        assert!(!cache.exists(&kind, &logs()).unwrap());
        cache.reset("s3_bucket");
        assert!(!cache.exists(&kind, &logs()).unwrap());
        assert_eq!(cache.fetch_count(), 2);
    }

    #[test]
    fn test_failed_fetch_leaves_slot_empty() {
        let (provider, cache) = cache_with(vec![RawRecord::default().with("name", "logs")]);
        let kind = bucket();
        *provider.failing.lock().unwrap() = true;
        let err = cache.prefetch(&kind, &ListHint::default()).unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));

        *provider.failing.lock().unwrap() = false;
        assert!(cache.exists(&kind, &logs()).unwrap());
        assert_eq!(cache.fetch_count(), 2);
    }

    #[test]
    fn test_mutation_resets_kind() {
        let (_, cache) = cache_with(Vec::new());
        let kind = bucket();
        assert!(!cache.exists(&kind, &logs()).unwrap());

        cache
            .mutate("s3_bucket", |p| p.create("s3_bucket", &logs(), &Properties::new()))
            .unwrap();
        assert!(cache.exists(&kind, &logs()).unwrap());
    }

    #[test]
    fn test_failed_mutation_still_resets() {
        let (_, cache) = cache_with(Vec::new());
        let kind = bucket();
        cache.instances(&kind).unwrap();
        let err = cache
            .mutate("s3_bucket", |p| p.destroy("s3_bucket", &logs()))
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::NotFound);
        cache.instances(&kind).unwrap();
        assert_eq!(cache.fetch_count(), 2);
    }

    #[test]
    fn test_hint_is_kept_for_lazy_refetch() {
        let (provider, cache) = cache_with(Vec::new());
        let kind = bucket();
        let hint = ListHint::regions(["us-east-1"]);
        cache.prefetch(&kind, &hint).unwrap();
        cache.reset("s3_bucket");
        cache.instances(&kind).unwrap();
        assert_eq!(*provider.hints.lock().unwrap(), vec![hint.clone(), hint]);
    }

    #[test]
    fn test_miss_in_hinted_listing_lists_without_hint() {
        let (provider, cache) = cache_with(vec![
            RawRecord::default().with("name", "logs").with("region", "eu-west-1"),
        ]);
        let kind = bucket();
        let hint = ListHint::regions(["us-east-1"]);
        cache.prefetch(&kind, &hint).unwrap();
        assert!(cache.instances(&kind).unwrap().is_empty());

        let found = cache.find(&kind, &logs()).unwrap().unwrap();
        assert_eq!(found.properties.get("region"), Some(&Value::from("eu-west-1")));
        assert!(cache.exists(&kind, &logs()).unwrap());
        assert_eq!(*provider.hints.lock().unwrap(), vec![hint, ListHint::default()]);
    }

    #[test]
    fn test_miss_in_full_listing_is_final() {
        let (_, cache) = cache_with(Vec::new());
        let kind = bucket();
        cache.prefetch(&kind, &ListHint::default()).unwrap();
        assert!(!cache.exists(&kind, &logs()).unwrap());
        assert!(!cache.exists(&kind, &logs()).unwrap());
        assert_eq!(cache.fetch_count(), 1);
    }

    #[test]
    fn test_reset_restores_the_hint() {
        let (provider, cache) = cache_with(Vec::new());
        let kind = bucket();
        let hint = ListHint::regions(["us-east-1"]);
        cache.prefetch(&kind, &hint).unwrap();
        assert!(!cache.exists(&kind, &logs()).unwrap());
        cache.reset("s3_bucket");
        cache.instances(&kind).unwrap();
        assert_eq!(
            *provider.hints.lock().unwrap(),
            vec![hint.clone(), ListHint::default(), hint]
        );
    }
}
