//! Error type shared by all pure domain logic.

/// Errors produced by domain-level validation and configuration parsing.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A value failed domain validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration value could not be parsed or is out of range.
    #[error("Configuration error: {0}")]
    Config(String),
}
