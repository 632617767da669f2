//! Core error types for alloctrace-util crate
//!
//! This module defines error types used throughout the util crate.

use thiserror::Error;

/// Error type for interner lookups
///
/// Only lookups are recoverable. Reference-count underflow is an
/// internal-consistency violation and panics instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InternerError {
    /// Handle never issued by this interner
    #[error("Unknown path handle: index {index}")]
    UnknownHandle { index: u32 },

    /// Handle was issued but its last reference has been released
    #[error("Path handle {index} was already released")]
    Released { index: u32 },
}

/// Result type alias for interner operations
pub type InternerResult<T> = std::result::Result<T, InternerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_handle_display() {
        let err = InternerError::UnknownHandle { index: 7 };
        assert_eq!(err.to_string(), "Unknown path handle: index 7");
    }

    #[test]
    fn test_released_display() {
        let err = InternerError::Released { index: 3 };
        assert_eq!(err.to_string(), "Path handle 3 was already released");
    }
}
