//! Lookup errors and AWS error-code classification

use aws_sdk_databasemigration::error::ProvideErrorMetadata;
use thiserror::Error;

pub const CODE_ACCESS_DENIED: &str = "AccessDeniedFault";
pub const CODE_INVALID_RESOURCE_STATE: &str = "InvalidResourceStateFault";
pub const CODE_RESOURCE_ALREADY_EXISTS: &str = "ResourceAlreadyExistsFault";
pub const CODE_RESOURCE_NOT_FOUND: &str = "ResourceNotFoundFault";

/// Errors returned by the `find_*` lookups
#[derive(Debug, Error)]
pub enum FindError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("expected 1 {kind}, found {count}")]
    TooManyResults { kind: String, count: usize },

    #[error("{0}")]
    Api(String),
}

impl FindError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FindError::NotFound(_))
    }
}

/// Error code reported by the service, if any
pub fn error_code<E: ProvideErrorMetadata>(err: &E) -> Option<&str> {
    err.code()
}

pub fn is_error_code<E: ProvideErrorMetadata>(err: &E, code: &str) -> bool {
    error_code(err) == Some(code)
}

pub fn is_not_found<E: ProvideErrorMetadata>(err: &E) -> bool {
    is_error_code(err, CODE_RESOURCE_NOT_FOUND)
}

/// Matches an error code together with a fragment of its message
pub fn is_error_message<E: ProvideErrorMetadata>(err: &E, code: &str, fragment: &str) -> bool {
    is_error_code(err, code) && err.message().is_some_and(|m| m.contains(fragment))
}

/// Human-readable rendering used in provider error messages
pub fn describe<E: ProvideErrorMetadata + std::fmt::Debug>(err: &E) -> String {
    match (err.code(), err.message()) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code.to_string(),
        _ => format!("{:?}", err),
    }
}

/// Classify a failed `Describe*` call for the finders
pub fn find_error<E: ProvideErrorMetadata + std::fmt::Debug>(err: &E, what: &str) -> FindError {
    if is_not_found(err) {
        FindError::NotFound(what.to_string())
    } else {
        FindError::Api(describe(err))
    }
}
