//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::uci::{GoParams, OptionValue};

/// How long to wait for `uciok` before giving up on the engine.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5000;

/// How long the engine gets to exit after `quit` before it is killed.
pub const DEFAULT_QUIT_TIMEOUT_MS: u64 = 1000;

/// Everything needed to start and configure one engine session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionConfig {
    /// Engine executable
    pub program: PathBuf,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Deadline for the `uci` → `uciok` handshake
    pub handshake_timeout: Duration,
    /// Deadline for each `isready` → `readyok` probe; `None` waits indefinitely
    pub ready_timeout: Option<Duration>,
    /// Grace period between `quit` and killing the process
    pub quit_timeout: Duration,
    /// Send `debug on` right after the handshake
    pub debug: bool,
    /// Options applied, in order, right after the handshake
    pub options: Vec<(String, OptionValue)>,
    /// Limits used by `search` and by the restart after a move
    pub limits: GoParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("stockfish"),
            args: Vec::new(),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            ready_timeout: None,
            quit_timeout: Duration::from_millis(DEFAULT_QUIT_TIMEOUT_MS),
            debug: false,
            options: Vec::new(),
            limits: GoParams::infinite(),
        }
    }
}

impl SessionConfig {
    /// Configuration for the engine at `program`, with defaults for the rest.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_quit_timeout(mut self, timeout: Duration) -> Self {
        self.quit_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: GoParams) -> Self {
        self.limits = limits;
        self
    }
}
