//! Error types for engine sessions.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::engine::SessionState;
use crate::position::{FenError, MoveParseError};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, UciError>;

/// Error type for everything that can go wrong while driving an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciError {
    /// Spawning the engine or talking to one of its pipes failed.
    /// Fatal: the session cannot continue.
    ProcessIo { context: String, message: String },
    /// The engine wrote to its standard error stream.
    EngineStderr { line: String },
    /// No `uciok` arrived before the handshake deadline.
    HandshakeTimeout { timeout: Duration },
    /// No `readyok` arrived before the readiness deadline.
    ReadyTimeout { timeout: Duration },
    /// The option was never announced by the engine.
    UndefinedOption { name: String },
    /// The value's kind does not match the option's declared kind.
    OptionType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    /// The integer value lies outside the declared bounds.
    OptionRange {
        name: String,
        value: i64,
        min: Option<i64>,
        max: Option<i64>,
    },
    /// The value is not one of the declared combo entries.
    OptionEnum {
        name: String,
        value: String,
        allowed: Vec<String>,
    },
    /// The engine announced the same option twice.
    OptionAlreadyDefined { name: String },
    /// An `option` line could not be turned into a descriptor.
    MalformedOption { line: String, reason: String },
    /// The operation is not valid in the current session state.
    IllegalState {
        operation: &'static str,
        state: SessionState,
        expected: &'static str,
    },
    /// A FEN string failed validation.
    InvalidPosition(FenError),
    /// A move string failed validation.
    InvalidMove(MoveParseError),
    /// A command would reach the engine as more than one line.
    LineBreak { command: String },
    /// The session was torn down while the caller was waiting.
    Closed,
}

impl UciError {
    /// Wrap an I/O failure with a short description of what was attempted.
    pub(crate) fn io(context: impl Into<String>, err: &io::Error) -> Self {
        UciError::ProcessIo {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Whether the error leaves the session unusable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            UciError::ProcessIo { .. } | UciError::HandshakeTimeout { .. } | UciError::Closed
        )
    }
}

fn bound(value: Option<i64>) -> String {
    value.map_or_else(|| "unbounded".to_string(), |v| v.to_string())
}

impl fmt::Display for UciError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UciError::ProcessIo { context, message } => {
                write!(f, "Engine process I/O failed while {context}: {message}")
            }
            UciError::EngineStderr { line } => write!(f, "Engine wrote to stderr: {line}"),
            UciError::HandshakeTimeout { timeout } => {
                write!(f, "Engine did not answer 'uci' with 'uciok' within {timeout:?}")
            }
            UciError::ReadyTimeout { timeout } => {
                write!(f, "Engine did not answer 'isready' with 'readyok' within {timeout:?}")
            }
            UciError::UndefinedOption { name } => {
                write!(f, "Option '{name}' was not announced by the engine")
            }
            UciError::OptionType {
                name,
                expected,
                found,
            } => write!(f, "Option '{name}' expects a {expected} value, got {found}"),
            UciError::OptionRange {
                name,
                value,
                min,
                max,
            } => write!(
                f,
                "Option '{name}' value {value} is out of range [{}, {}]",
                bound(*min),
                bound(*max)
            ),
            UciError::OptionEnum {
                name,
                value,
                allowed,
            } => write!(
                f,
                "Option '{name}' value '{value}' is not one of [{}]",
                allowed.join(", ")
            ),
            UciError::OptionAlreadyDefined { name } => {
                write!(f, "Option '{name}' is already defined")
            }
            UciError::MalformedOption { line, reason } => {
                write!(f, "Malformed option declaration '{line}': {reason}")
            }
            UciError::IllegalState {
                operation,
                state,
                expected,
            } => write!(
                f,
                "Cannot {operation} while the session is {state}, expected {expected}"
            ),
            UciError::InvalidPosition(e) => write!(f, "Invalid position: {e}"),
            UciError::InvalidMove(e) => write!(f, "Invalid move: {e}"),
            UciError::LineBreak { command } => {
                write!(f, "Refusing to send {command:?}: commands must be a single line")
            }
            UciError::Closed => write!(f, "Engine session is closed"),
        }
    }
}

impl std::error::Error for UciError {}

impl From<FenError> for UciError {
    fn from(e: FenError) -> Self {
        UciError::InvalidPosition(e)
    }
}

impl From<MoveParseError> for UciError {
    fn from(e: MoveParseError) -> Self {
        UciError::InvalidMove(e)
    }
}
