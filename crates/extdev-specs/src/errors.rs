//! Specification error types.

use thiserror::Error;

/// Errors raised while building or querying the specification registry.
#[derive(Debug, Error)]
pub enum SpecificationError {
    /// A required field was missing or empty.
    #[error("invalid specification `{identifier}`: missing {field}")]
    InvalidSpecification {
        /// Identifier of the offending spec (may be empty).
        identifier: String,
        /// Name of the missing field.
        field: &'static str,
    },
    /// Two plugins registered the same identifier with different contents.
    #[error(
        "duplicate specification `{identifier}` contributed by `{first_plugin}` and `{second_plugin}`"
    )]
    DuplicateSpecification {
        /// Conflicting identifier.
        identifier: String,
        /// Plugin that registered it first.
        first_plugin: String,
        /// Plugin whose registration conflicted.
        second_plugin: String,
    },
    /// No specification with this identifier.
    #[error("specification not found: {0}")]
    NotFound(String),
    /// A specification provider failed to produce its list.
    #[error("specification provider `{plugin}` failed: {message}")]
    Provider {
        /// Provider name.
        plugin: String,
        /// Failure description.
        message: String,
    },
    /// A `deploy_config` hook failed.
    #[error("deploy config for `{identifier}` failed: {message}")]
    DeployConfig {
        /// Specification identifier.
        identifier: String,
        /// Failure description.
        message: String,
    },
}

/// Result type for specification operations.
pub type Result<T> = std::result::Result<T, SpecificationError>;
