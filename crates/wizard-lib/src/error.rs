//! Error types for the optimization engine

use thiserror::Error;

/// Result alias used throughout the engine
pub type WizardResult<T> = Result<T, WizardError>;

/// Failures surfaced by the catalog, generator, analyzers and providers.
///
/// Missing price entries are not an error: they are reported as
/// [`crate::cost::PricingGap`] annotations and the computation proceeds.
#[derive(Debug, Error)]
pub enum WizardError {
    /// Unknown preset or feature id
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Malformed or inconsistent request, naming the offending field
    #[error("invalid request field `{field}`: {reason}")]
    InvalidRequest { field: String, reason: String },

    /// Catalog failed integrity checks at load time
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Inventory snapshot violates its counting invariants
    #[error("invalid inventory snapshot: {0}")]
    InvalidInventory(String),

    /// Inventory or pricing collaborator failed; callers may retry
    #[error("{provider} unavailable: {message}")]
    UpstreamUnavailable { provider: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl WizardError {
    pub fn invalid_request(field: impl Into<String>, reason: impl Into<String>) -> Self {
        WizardError::InvalidRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        WizardError::UpstreamUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            WizardError::NotFound { .. } => "NOT_FOUND",
            WizardError::InvalidRequest { .. } => "INVALID_REQUEST",
            WizardError::InvalidCatalog(_) => "INVALID_CATALOG",
            WizardError::InvalidInventory(_) => "INVALID_INVENTORY",
            WizardError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            WizardError::Io(_) => "IO_ERROR",
            WizardError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Only collaborator failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, WizardError::UpstreamUnavailable { .. })
    }

    /// Field named by a validation failure, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            WizardError::InvalidRequest { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for WizardError {
    fn from(err: serde_json::Error) -> Self {
        WizardError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for WizardError {
    fn from(err: serde_yaml::Error) -> Self {
        WizardError::Serialization(err.to_string())
    }
}
