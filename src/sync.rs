//! Synchronization primitives for engine sessions.
//!
//! Provides the re-armable barrier used for the handshake, readiness probes
//! and waiting on a search to finish.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, UciError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum BarrierState {
    /// Nobody is expecting a signal; stray signals are dropped.
    Idle,
    /// A signal is expected.
    Armed,
    /// The expected signal arrived and has not been consumed yet.
    Released,
    /// The session is gone; every wait fails with this error.
    Broken(UciError),
}

/// Outcome of a wait that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    TimedOut,
    Broken(UciError),
}

/// A synchronization point that can be armed, released and awaited repeatedly.
///
/// The cycle is arm → (write the probe) → wait → back to idle. The signal may
/// arrive before the waiter starts waiting; it is kept until consumed.
#[derive(Debug)]
pub struct ReadinessBarrier {
    name: &'static str,
    state: Mutex<BarrierState>,
    cond: Condvar,
}

impl ReadinessBarrier {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        ReadinessBarrier {
            name,
            state: Mutex::new(BarrierState::Idle),
            cond: Condvar::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Expect a new signal, discarding any unconsumed earlier one.
    ///
    /// Fails if the barrier has been broken.
    pub fn arm(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let BarrierState::Broken(err) = &*state {
            return Err(err.clone());
        }
        *state = BarrierState::Armed;
        Ok(())
    }

    /// Stop expecting a signal, e.g. after the probe could not be written.
    pub fn disarm(&self) {
        let mut state = self.state.lock();
        if !matches!(*state, BarrierState::Broken(_)) {
            *state = BarrierState::Idle;
        }
    }

    /// Deliver the signal. Returns `false` if nobody had armed the barrier.
    pub fn release(&self) -> bool {
        let mut state = self.state.lock();
        if *state != BarrierState::Armed {
            return false;
        }
        *state = BarrierState::Released;
        self.cond.notify_all();
        true
    }

    /// Whether a signal is currently expected.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        *self.state.lock() == BarrierState::Armed
    }

    /// Fail every current and future wait with `error`. Permanent.
    pub fn break_with(&self, error: UciError) {
        let mut state = self.state.lock();
        *state = BarrierState::Broken(error);
        self.cond.notify_all();
    }

    /// Block until the signal arrives, the deadline passes, or the barrier breaks.
    ///
    /// `None` waits without a deadline. On success or timeout the barrier
    /// returns to idle.
    pub fn wait(&self, timeout: Option<Duration>) -> std::result::Result<(), WaitError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            match &*state {
                BarrierState::Released => {
                    *state = BarrierState::Idle;
                    return Ok(());
                }
                BarrierState::Broken(err) => return Err(WaitError::Broken(err.clone())),
                BarrierState::Idle => {
                    // Disarmed underneath us; nothing will ever arrive.
                    return Err(WaitError::TimedOut);
                }
                BarrierState::Armed => {}
            }

            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out()
                        && *state == BarrierState::Armed
                    {
                        *state = BarrierState::Idle;
                        log::debug!("{} barrier timed out", self.name);
                        return Err(WaitError::TimedOut);
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
    }
}
