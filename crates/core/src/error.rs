//! Domain-level error type shared across the workspace.

/// Errors raised by pure domain logic.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup failed.
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Human-readable entity kind, e.g. `"generation"`.
        entity: &'static str,
        /// Database id that was looked up.
        id: i64,
    },

    /// Input failed a validation rule.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration record is missing or malformed. Fixed in config,
    /// never by retrying.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}
