//! # Declarative
//!
//! Declarative reconciliation of cloud resources.
//!
//! Given a desired description of a resource and what the provider reports,
//! this crate decides whether the resource is in sync and, if not, computes
//! and applies the smallest set of provider operations that converges it.
//!
//! ## Core Concepts
//!
//! - **ResourceKind**: capability set of one kind of object (schema,
//!   title parsing, normalization, comparison, references)
//! - **Title**: external identifier, parsed into identity attributes
//! - **NormalizedValue**: canonical comparison form of a property value
//! - **InstanceCache**: per-kind memoized provider listing, reset after
//!   every mutation
//! - **ConvergencePlan**: create, per-property update or destroy
//!
//! ## Example
//!
//! ```
//! use declarative::schema::{KindSchema, PropertySpec};
//! use declarative::{
//!     DesiredState, ExecuteOptions, Identity, KindRegistry, ListHint, NoProgress, Properties,
//!     Provider, ProviderError, RawRecord, Reconciler, ResourceKind,
//! };
//! use serde_json::Value;
//! use std::sync::{Arc, Mutex};
//!
//! struct Bucket(KindSchema);
//!
//! impl ResourceKind for Bucket {
//!     fn schema(&self) -> &KindSchema {
//!         &self.0
//!     }
//! }
//!
//! /// Provider that keeps created records in memory
//! #[derive(Default)]
//! struct Memory(Mutex<Vec<RawRecord>>);
//!
//! impl Provider for Memory {
//!     fn list(&self, _kind: &str, _hint: &ListHint) -> Result<Vec<RawRecord>, ProviderError> {
//!         Ok(self.0.lock().unwrap().clone())
//!     }
//!
//!     fn create(
//!         &self,
//!         _kind: &str,
//!         identity: &Identity,
//!         properties: &Properties,
//!     ) -> Result<RawRecord, ProviderError> {
//!         let mut record = RawRecord::new(properties.clone());
//!         for (attribute, value) in identity.iter() {
//!             record.properties.insert(attribute.to_string(), Value::from(value));
//!         }
//!         self.0.lock().unwrap().push(record.clone());
//!         Ok(record)
//!     }
//!
//!     fn update(&self, _: &str, _: &Identity, _: &str, _: &Value) -> Result<(), ProviderError> {
//!         Ok(())
//!     }
//!
//!     fn destroy(&self, _kind: &str, _identity: &Identity) -> Result<(), ProviderError> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), declarative::Error> {
//! let mut registry = KindRegistry::new();
//! registry.register(Bucket(
//!     KindSchema::new("s3_bucket")
//!         .identity(PropertySpec::one("name"))
//!         .property(PropertySpec::one("region")),
//! ))?;
//! let reconciler = Reconciler::new(Arc::new(registry), Arc::new(Memory::default()));
//!
//! let handle = reconciler.validate_and_register(
//!     "s3_bucket",
//!     "logs",
//!     DesiredState::present().with("region", "us-east-1"),
//! )?;
//!
//! let plan = reconciler.plan(&handle)?;
//! assert_eq!(plan.operations.len(), 1);
//! reconciler.apply(&plan, false)?;
//!
//! // Or everything at once, in dependency order; nothing is left to do
//! let report = reconciler.execute(&[handle], &ExecuteOptions::default(), &mut NoProgress)?;
//! assert_eq!(report.summary.unchanged, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Provider`]: the cloud API (list, create, update, destroy)
//! - [`ProgressCallback`]: receives progress updates
//!
//! This keeps the crate free of any SDK or UI dependency.

pub mod cache;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod normalize;
pub mod planner;
pub mod reconciler;
pub mod resource;
pub mod schema;
pub mod title;
pub mod types;

// Re-export main types at crate root
pub use cache::InstanceCache;
pub use context::{ApplyContext, ListHint, NoProgress, ProgressCallback, Provider};
pub use diff::{Diff, PropertyDrift};
pub use error::{Error, ErrorCategory, ProviderError, Result};
pub use executor::{ExecuteReport, execute};
pub use graph::DependencyEdge;
pub use normalize::{Normalization, NormalizedValue};
pub use planner::{ConvergencePlan, Operation, ResourceStatus};
pub use reconciler::Reconciler;
pub use resource::{KindRegistry, Reference, ResourceKind};
pub use schema::{Cardinality, KindSchema, PropertySpec, Validator};
pub use title::{TitleParser, TitlePattern};
pub use types::{
    DesiredState, Ensure, ExecuteOptions, ExecuteSummary, Identity, ObservedState, OperationKind,
    OperationResult, Outcome, Properties, RawRecord, ResourceHandle, ResourceOutcome, ResourceRef,
    ResourceReport,
};
