//! Error types for record parsing.

use thiserror::Error;

/// Errors produced while parsing wire-level record fields.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A status name outside the status set.
    #[error("invalid execution status: {0}")]
    UnknownStatus(String),

    /// A command name outside the notify command set.
    #[error("invalid command: {0}")]
    UnknownCommand(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TypesError::UnknownStatus("bogus".to_string());
        assert_eq!(err.to_string(), "invalid execution status: bogus");

        let err = TypesError::UnknownCommand("explode".to_string());
        assert_eq!(err.to_string(), "invalid command: explode");
    }
}
