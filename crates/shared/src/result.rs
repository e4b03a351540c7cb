//! Result alias and envelope-aware combinators.

use crate::errors::{ErrorClass, ErrorEnvelope};

/// Shared result type used across the workspace.
pub type Result<T, E = ErrorEnvelope> = std::result::Result<T, E>;

/// Helpers for annotating envelope errors as they cross a boundary.
pub trait ResultExt<T> {
    /// Attach `operation` metadata to the error, if any.
    fn with_operation(self, operation: &str) -> Result<T>;

    /// Downgrade the error to non-retriable.
    fn non_retriable(self) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_operation(self, operation: &str) -> Result<T> {
        self.map_err(|error| error.with_operation(operation))
    }

    fn non_retriable(self) -> Result<T> {
        self.map_err(|error| error.with_class(ErrorClass::NonRetriable))
    }
}
