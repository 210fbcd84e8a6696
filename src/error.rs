//! Error types for the megashim library.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Status codes reported by MEGAcmd through its process exit code.
///
/// MEGAcmd defines these as negative values internally; the shell sees the
/// absolute value, so both signs decode to the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Wrong arguments.
    InvalidArguments,
    /// Invalid e-mail address.
    InvalidEmail,
    /// Resource not found.
    NotFound,
    /// Invalid state.
    InvalidState,
    /// Invalid type (e.g. a folder where a file was expected, or a bad local destination).
    InvalidType,
    /// Operation not allowed.
    NotPermitted,
    /// Needs logging in.
    NotLoggedIn,
    /// Nodes not fetched yet.
    NoFetch,
    /// Unexpected failure.
    Unexpected,
    /// Confirmation required.
    RequiresConfirmation,
    /// String required.
    RequiresString,
    /// Partial output provided.
    PartialOutput,
    /// Partial error output provided.
    PartialError,
    /// Resource already exists.
    AlreadyExists,
    /// Restart required.
    RequiresRestart,
    /// Any code MEGAcmd does not document.
    Other(i32),
}

impl ErrorCode {
    /// Decodes a process exit code.
    #[must_use]
    pub const fn from_exit_code(code: i32) -> Self {
        match code.saturating_abs() {
            51 => Self::InvalidArguments,
            52 => Self::InvalidEmail,
            53 => Self::NotFound,
            54 => Self::InvalidState,
            55 => Self::InvalidType,
            56 => Self::NotPermitted,
            57 => Self::NotLoggedIn,
            58 => Self::NoFetch,
            59 => Self::Unexpected,
            60 => Self::RequiresConfirmation,
            61 => Self::RequiresString,
            62 => Self::PartialOutput,
            63 => Self::PartialError,
            64 => Self::AlreadyExists,
            71 => Self::RequiresRestart,
            _ => Self::Other(code),
        }
    }

    /// Returns the numeric code as MEGAcmd's shell wrappers report it.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::InvalidArguments => 51,
            Self::InvalidEmail => 52,
            Self::NotFound => 53,
            Self::InvalidState => 54,
            Self::InvalidType => 55,
            Self::NotPermitted => 56,
            Self::NotLoggedIn => 57,
            Self::NoFetch => 58,
            Self::Unexpected => 59,
            Self::RequiresConfirmation => 60,
            Self::RequiresString => 61,
            Self::PartialOutput => 62,
            Self::PartialError => 63,
            Self::AlreadyExists => 64,
            Self::RequiresRestart => 71,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InvalidArguments => "wrong arguments",
            Self::InvalidEmail => "invalid e-mail",
            Self::NotFound => "not found",
            Self::InvalidState => "invalid state",
            Self::InvalidType => "invalid type",
            Self::NotPermitted => "operation not permitted",
            Self::NotLoggedIn => "not logged in",
            Self::NoFetch => "nodes not fetched",
            Self::Unexpected => "unexpected failure",
            Self::RequiresConfirmation => "confirmation required",
            Self::RequiresString => "string required",
            Self::PartialOutput => "partial output",
            Self::PartialError => "partial error output",
            Self::AlreadyExists => "already exists",
            Self::RequiresRestart => "restart required",
            Self::Other(_) => "unknown status",
        };
        write!(f, "{text} ({})", self.as_i32())
    }
}

const fn describe(code: &i32) -> ErrorCode {
    ErrorCode::from_exit_code(*code)
}

/// Errors that can occur while driving MEGAcmd.
#[derive(Error, Debug)]
pub enum Error {
    /// The MEGAcmd executable could not be located.
    #[error("MEGAcmd executable not found at path: {}", path.display())]
    ExecutableNotFound {
        /// Path (or bare name) that was looked up.
        path: PathBuf,
    },

    /// I/O error while spawning or talking to the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MEGAcmd exited with a non-zero status.
    #[error("`{command}` failed: {}: {stderr}", describe(.code))]
    Command {
        /// Command line, with secrets redacted.
        command: String,
        /// Process exit code.
        code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// MEGAcmd succeeded but printed something we could not interpret.
    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput {
        /// Command line, with secrets redacted.
        command: String,
        /// The offending output.
        output: String,
    },

    /// Arguments rejected before anything was spawned.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the MEGAcmd status code if this error came from a failed command.
    #[must_use]
    pub const fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Command { code, .. } => Some(ErrorCode::from_exit_code(*code)),
            _ => None,
        }
    }

    /// Returns true if MEGAcmd reported that the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.error_code() == Some(ErrorCode::NotFound)
    }
}

/// A specialized `Result` type for megashim operations.
pub type Result<T> = std::result::Result<T, Error>;
