//! Error types for resource reconciliation.
//!
//! Errors are split in two layers. [`ProviderError`] is what a provider
//! backend reports for a single call, tagged with an [`ErrorCategory`] so the
//! executor can tell a benign race from a fatal failure. [`Error`] is what the
//! reconciliation core reports to its caller, always naming the resource and,
//! where relevant, the property involved.

use thiserror::Error;

/// Categories of provider errors.
///
/// The category decides how the executor reacts: conflicts are re-verified
/// against a fresh fetch, everything else is surfaced for that resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network, auth or timeout failure
    Transport,
    /// The provider already holds a conflicting object (duplicate create)
    Conflict,
    /// The referenced object does not exist
    NotFound,
    /// Any other provider-side rejection
    Other,
}

impl ErrorCategory {
    /// Whether this error is a benign race worth re-verifying once.
    pub fn is_benign_race(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

/// Error returned by a [`Provider`](crate::context::Provider) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    category: ErrorCategory,
    message: String,
}

impl ProviderError {
    /// Create an error with an explicit category.
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// Network/auth/timeout failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Transport, message)
    }

    /// Duplicate-create style conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Conflict, message)
    }

    /// Missing object.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        self.category
    }
}

/// Errors raised by the reconciliation core.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed kind registration (fatal at startup)
    #[error("invalid schema for {kind}: {message}")]
    Schema { kind: String, message: String },

    /// A title pattern failed to compile
    #[error("invalid title pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Desired value rejected by a validator
    #[error("{resource}: property '{property}' {reason}")]
    Validation {
        resource: String,
        property: String,
        reason: String,
    },

    /// No title rule produced an identity
    #[error("cannot parse title '{title}' for {kind}")]
    Parse { kind: String, title: String },

    /// Kind was never registered
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    /// Provider call failed for a resource
    #[error("{resource}{}: {source}", property_suffix(.property))]
    Provider {
        resource: String,
        property: Option<String>,
        #[source]
        source: ProviderError,
    },

    /// Dependency edges form a cycle
    #[error("dependency cycle between {}", .0.join(", "))]
    Cycle(Vec<String>),

    /// Worker pool could not be started
    #[error("failed to create thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Provider failure not tied to a single property.
    pub fn provider(resource: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            resource: resource.into(),
            property: None,
            source,
        }
    }

    /// Whether the error rejects a single resource rather than the whole run.
    pub fn is_resource_local(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::Parse { .. }
                | Self::UnknownKind(_)
                | Self::Provider { .. }
        )
    }
}

fn property_suffix(property: &Option<String>) -> String {
    property
        .as_ref()
        .map(|p| format!(" (property '{p}')"))
        .unwrap_or_default()
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
