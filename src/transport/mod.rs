//! Transport to the engine process.
//!
//! The session talks to the engine only through [`Transport`] and hears from
//! it only through [`TransportSink`], so a spawned process and an in-memory
//! engine are interchangeable.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, UciError};

mod buffer;
mod process;

pub use buffer::LineBuffer;
pub use process::EngineProcess;

/// Reject commands that would reach the engine as more than one line.
///
/// A line break inside a FEN, option value or registration name would let
/// the remainder be read as a separate command.
pub fn ensure_single_line(command: &str) -> Result<()> {
    if command.contains(['\r', '\n']) {
        return Err(UciError::LineBreak {
            command: command.to_string(),
        });
    }
    Ok(())
}

/// Outbound half: serialized writes to the engine's input.
pub trait Transport: Send + Sync {
    /// Write one command. The line terminator is appended by the transport,
    /// and commands containing one are rejected.
    ///
    /// Returns once the write has been accepted, not once the engine acted on it.
    fn write(&self, command: &str) -> Result<()>;

    /// Close the engine's input, wait up to `grace` for it to exit, then kill it.
    fn shutdown(&self, grace: Duration);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn write(&self, command: &str) -> Result<()> {
        (**self).write(command)
    }

    fn shutdown(&self, grace: Duration) {
        (**self).shutdown(grace);
    }
}

/// Inbound half: receives complete lines and stream-level faults.
pub trait TransportSink: Send + Sync {
    /// One complete line from the engine's output, without its terminator.
    fn on_line(&self, line: &str);

    /// A stream-level fault or stderr output.
    fn on_error(&self, error: UciError);

    /// The engine process ended. Called at most once.
    fn on_exit(&self, code: Option<i32>);
}
