use docsync_shared::{ErrorEnvelope, ErrorKind};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    InvalidInput = 2,
    Io = 3,
    Internal = 1,
}

impl ExitCode {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Exit code for a failed command.
    ///
    /// Filesystem failures map to `Io`, other expected errors (bad input,
    /// bad config, missing credentials) to `InvalidInput`.
    #[must_use]
    pub fn for_error(error: &ErrorEnvelope) -> Self {
        let code = &error.code;
        let is_io = match code.namespace() {
            "core" => matches!(code.code(), "io" | "not_found" | "permission_denied"),
            "config" => code.code().starts_with("config_file_"),
            _ => false,
        };
        if is_io {
            Self::Io
        } else if error.kind == ErrorKind::Expected {
            Self::InvalidInput
        } else {
            Self::Internal
        }
    }
}

#[derive(Debug)]
pub enum CliError {
    InvalidInput(String),
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl CliError {
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::Io(_) => ExitCode::Io,
            Self::Serialization(_) => ExitCode::Internal,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(formatter, "invalid input: {message}"),
            Self::Io(error) => write!(formatter, "io error: {error}"),
            Self::Serialization(error) => write!(formatter, "serialization error: {error}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_shared::{ErrorClass, ErrorCode};

    #[test]
    fn error_envelopes_map_to_exit_codes() {
        let invalid = ErrorEnvelope::expected(ErrorCode::new("config", "invalid_credentials"), "x");
        assert_eq!(ExitCode::for_error(&invalid), ExitCode::InvalidInput);

        let missing_file =
            ErrorEnvelope::expected(ErrorCode::new("config", "config_file_not_found"), "x");
        assert_eq!(ExitCode::for_error(&missing_file), ExitCode::Io);

        let io = ErrorEnvelope::from(std::io::Error::other("disk"));
        assert_eq!(ExitCode::for_error(&io), ExitCode::Io);

        let unavailable = ErrorEnvelope::unexpected(
            ErrorCode::new("index", "unavailable"),
            "down",
            ErrorClass::Retriable,
        );
        assert_eq!(ExitCode::for_error(&unavailable), ExitCode::Internal);
    }

    #[test]
    fn cli_errors_map_to_exit_codes() {
        assert_eq!(CliError::InvalidInput("x".into()).exit_code(), ExitCode::InvalidInput);
        assert_eq!(CliError::Io(std::io::Error::other("io")).exit_code(), ExitCode::Io);
    }
}
