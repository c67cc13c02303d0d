//! Client side of the Universal Chess Interface.
//!
//! Spawns a UCI engine as a child process, runs the handshake, tracks the
//! engine's options and the game position, and drives searches. Engine
//! output is parsed into [`Event`]s delivered through each session's
//! [`EventBus`].

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod position;
pub mod sync;
pub mod transport;
pub mod uci;

pub use config::SessionConfig;
pub use engine::{EngineIdentity, Session, SessionState};
pub use error::{Result, UciError};
pub use events::{Event, EventBus, EventKind, ListenerId};
pub use position::{MoveValidator, NotationValidator, Position, PositionOrigin};
pub use uci::{BestMove, GoParams, Info, OptionDescriptor, OptionKind, OptionValue, Registration};
