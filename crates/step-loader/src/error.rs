//! Error types for chain registration and load results.

use crate::outcome::StepFailure;
use thiserror::Error;

/// Errors raised synchronously while registering or extending a chain.
///
/// These are never caught by the loader; the registration call that caused
/// them leaves the pending chains unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Top level steps must carry a non-empty key.
    #[error("You must include a non-empty key on top level steps")]
    EmptyKey,

    /// A pending chain already uses this key.
    #[error("Key already exists: {0}")]
    DuplicateKey(String),

    /// The step is already linked and overwrite was not requested.
    #[error("This step already has a next step")]
    SuccessorExists,
}

/// A chain failed during a load run.
///
/// Returned by [`ResultMap::into_values`](crate::ResultMap::into_values) when the
/// caller wants all-or-nothing values instead of per-step outcomes.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Chain '{key}' failed at {failure}")]
pub struct LoadError {
    /// Key of the chain that failed.
    pub key: String,
    /// The recorded failure of the step that ended the chain.
    pub failure: StepFailure,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureKind;

    #[test]
    fn test_validation_messages() {
        assert_eq!(
            ValidationError::DuplicateKey("config".to_string()).to_string(),
            "Key already exists: config"
        );
        assert_eq!(
            ValidationError::SuccessorExists.to_string(),
            "This step already has a next step"
        );
    }

    #[test]
    fn test_load_error_display() {
        let err = LoadError {
            key: "users".to_string(),
            failure: StepFailure {
                step_index: 2,
                kind: FailureKind::Error,
                message: "connection refused".to_string(),
            },
        };

        assert_eq!(
            err.to_string(),
            "Chain 'users' failed at step 2: connection refused"
        );
    }
}
