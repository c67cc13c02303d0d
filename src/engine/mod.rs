//! Engine session: one child process driven through the UCI handshake,
//! readiness probes, position updates and searches.
//!
//! [`Session`] owns the process and every barrier; [`SessionState`] is the
//! client-side view of where the engine is in its lifecycle.

mod controller;
mod state;

pub use controller::{EngineIdentity, Session};
pub use state::SessionState;
