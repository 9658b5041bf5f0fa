//! Provider backends.
//!
//! Real cloud APIs are out of reach here, so two stand-ins implement
//! [`Provider`]: one in memory and one persisted to a state file that
//! carries records across runs.

pub mod file;
pub mod memory;

pub use file::FileProvider;
pub use memory::{Call, CallKind, MemoryProvider, Records};

use crate::error::Result;
use declarative::Provider;
use std::path::Path;
use std::sync::Arc;

/// Open the backend for a run: the state file at `state` if given,
/// otherwise an empty in-memory store.
pub fn open(state: Option<&Path>) -> Result<Arc<dyn Provider>> {
    match state {
        Some(path) => Ok(Arc::new(FileProvider::open(path)?)),
        None => Ok(Arc::new(MemoryProvider::new())),
    }
}
