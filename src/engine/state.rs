use std::fmt;

/// Lifecycle of a session: `Handshaking → Ready ⇄ Searching → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `uci` sent, collecting `id` and `option` until `uciok`.
    Handshaking,
    /// Idle and able to accept commands.
    Ready,
    /// A `go` is in flight and no `bestmove` has arrived yet.
    Searching { ponder: bool },
    /// Terminal: quit or process exit.
    Stopped,
}

impl SessionState {
    #[must_use]
    pub fn is_searching(self) -> bool {
        matches!(self, SessionState::Searching { .. })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Handshaking => f.write_str("handshaking"),
            SessionState::Ready => f.write_str("ready"),
            SessionState::Searching { ponder: false } => f.write_str("searching"),
            SessionState::Searching { ponder: true } => f.write_str("pondering"),
            SessionState::Stopped => f.write_str("stopped"),
        }
    }
}
