//! Session controller: readiness barriers, position tracking and search lifecycle.

use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::SessionState;
use crate::config::SessionConfig;
use crate::error::{Result, UciError};
use crate::events::{Event, EventBus};
use crate::position::{MoveValidator, NotationValidator, Position, PositionOrigin};
use crate::sync::{ReadinessBarrier, WaitError};
use crate::transport::{ensure_single_line, EngineProcess, Transport, TransportSink};
use crate::uci::{
    parse_line, BestMove, EngineMessage, GoParams, GuiCommand, IdInfo, OptionDescriptor,
    OptionRegistry, OptionValue, Registration,
};

/// Name and author the engine reported during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineIdentity {
    pub name: String,
    pub author: String,
}

/// Mutable session state, guarded by one lock.
struct SessionData {
    state: SessionState,
    /// Last position actually written to the engine
    position: Position,
    limits: GoParams,
    identity: Option<EngineIdentity>,
    last_bestmove: Option<BestMove>,
    /// `stop` already written for the running search
    stop_pending: bool,
    debug: bool,
    exit_code: Option<i32>,
}

struct Inner {
    config: SessionConfig,
    validator: Arc<dyn MoveValidator>,
    transport: OnceCell<Box<dyn Transport>>,
    bus: EventBus,
    data: Mutex<SessionData>,
    options: Mutex<OptionRegistry>,
    handshake: ReadinessBarrier,
    ready: ReadinessBarrier,
    search: ReadinessBarrier,
    /// Held for the duration of every public operation so callers never interleave.
    op: Mutex<()>,
}

/// Forwards transport callbacks to the session without keeping it alive.
struct SessionSink(Weak<Inner>);

impl TransportSink for SessionSink {
    fn on_line(&self, line: &str) {
        if let Some(inner) = self.0.upgrade() {
            inner.ingest(line);
        }
    }

    fn on_error(&self, error: UciError) {
        if let Some(inner) = self.0.upgrade() {
            inner.bus.emit(&Event::Error(error));
        }
    }

    fn on_exit(&self, code: Option<i32>) {
        if let Some(inner) = self.0.upgrade() {
            inner.on_exit(code);
        }
    }
}

impl Inner {
    fn new(config: SessionConfig, validator: Arc<dyn MoveValidator>) -> Self {
        let limits = config.limits.clone();
        Inner {
            config,
            validator,
            transport: OnceCell::new(),
            bus: EventBus::new(),
            data: Mutex::new(SessionData {
                state: SessionState::Handshaking,
                position: Position::startpos(),
                limits,
                identity: None,
                last_bestmove: None,
                stop_pending: false,
                debug: false,
                exit_code: None,
            }),
            options: Mutex::new(OptionRegistry::new()),
            handshake: ReadinessBarrier::new("handshake"),
            ready: ReadinessBarrier::new("ready"),
            search: ReadinessBarrier::new("search"),
            op: Mutex::new(()),
        }
    }

    fn state(&self) -> SessionState {
        self.data.lock().state
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    fn ingest(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        log::trace!("<< {line}");

        let message = match parse_line(line) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("{err}");
                self.bus.emit(&Event::Error(err));
                return;
            }
        };

        match &message {
            EngineMessage::Id(id) => self.record_identity(id),
            EngineMessage::UciOk => {
                {
                    let mut data = self.data.lock();
                    if data.state == SessionState::Handshaking {
                        data.state = SessionState::Ready;
                    }
                }
                self.handshake.release();
            }
            EngineMessage::ReadyOk => {
                if !self.ready.release() {
                    log::debug!("unsolicited readyok");
                }
            }
            EngineMessage::BestMove(best) => {
                {
                    let mut data = self.data.lock();
                    if data.state.is_searching() {
                        data.state = SessionState::Ready;
                    }
                    data.last_bestmove = Some(best.clone());
                }
                self.search.release();
            }
            EngineMessage::Option(descriptor) => {
                let defined = self.options.lock().define(descriptor.clone());
                if let Err(err) = defined {
                    log::warn!("{err}");
                    self.bus.emit(&Event::Error(err));
                    return;
                }
            }
            EngineMessage::CopyProtection(_)
            | EngineMessage::Registration(_)
            | EngineMessage::Info(_)
            | EngineMessage::Output(_) => {}
        }

        self.bus.emit(&Event::from(message));
    }

    fn record_identity(&self, id: &IdInfo) {
        let mut data = self.data.lock();
        if data.state != SessionState::Handshaking {
            log::debug!("ignoring id after handshake: {id:?}");
            return;
        }
        let identity = data.identity.get_or_insert_with(EngineIdentity::default);
        if let Some(name) = &id.name {
            identity.name.clone_from(name);
        }
        if let Some(author) = &id.author {
            identity.author.clone_from(author);
        }
    }

    fn on_exit(&self, code: Option<i32>) {
        {
            let mut data = self.data.lock();
            data.state = SessionState::Stopped;
            data.exit_code = code;
        }
        let err = UciError::ProcessIo {
            context: "waiting for the engine".to_string(),
            message: format!("engine exited with code {code:?}"),
        };
        self.break_barriers(&err);
        self.bus.emit(&Event::Exit(code));
        self.bus.close_pending();
    }

    fn break_barriers(&self, err: &UciError) {
        self.handshake.break_with(err.clone());
        self.ready.break_with(err.clone());
        self.search.break_with(err.clone());
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    fn transport(&self) -> Result<&dyn Transport> {
        self.transport
            .get()
            .map(|t| &**t)
            .ok_or(UciError::Closed)
    }

    /// Write one command line. A pipe failure ends the session.
    fn write_line(&self, line: &str) -> Result<()> {
        ensure_single_line(line)?;
        let result = self.transport().and_then(|t| t.write(line));
        if let Err(err) = &result {
            if err.is_fatal() {
                log::error!("{err}");
                self.fail(err);
            }
        }
        result
    }

    fn send(&self, command: &GuiCommand) -> Result<()> {
        self.write_line(&command.to_string())
    }

    fn fail(&self, err: &UciError) {
        self.data.lock().state = SessionState::Stopped;
        self.break_barriers(err);
        self.bus.emit(&Event::Error(err.clone()));
    }

    fn ensure_open(&self, operation: &'static str) -> Result<SessionState> {
        let state = self.state();
        let expected = match state {
            SessionState::Stopped => "an open session",
            SessionState::Handshaking => "a completed handshake",
            _ => return Ok(state),
        };
        Err(UciError::IllegalState {
            operation,
            state,
            expected,
        })
    }

    // ------------------------------------------------------------------
    // Barriers
    // ------------------------------------------------------------------

    fn handshake(&self) -> Result<()> {
        self.handshake.arm()?;
        if let Err(err) = self.send(&GuiCommand::Uci) {
            self.handshake.disarm();
            return Err(err);
        }
        let timeout = self.config.handshake_timeout;
        match self.handshake.wait(Some(timeout)) {
            Ok(()) => Ok(()),
            Err(WaitError::TimedOut) => Err(UciError::HandshakeTimeout { timeout }),
            Err(WaitError::Broken(err)) => Err(err),
        }
    }

    /// `isready` and block until `readyok`.
    fn probe(&self) -> Result<()> {
        self.ready.arm()?;
        if let Err(err) = self.send(&GuiCommand::IsReady) {
            self.ready.disarm();
            return Err(err);
        }
        match self.ready.wait(self.config.ready_timeout) {
            Ok(()) => Ok(()),
            Err(WaitError::TimedOut) => match self.config.ready_timeout {
                Some(timeout) => Err(UciError::ReadyTimeout { timeout }),
                None => Err(UciError::Closed),
            },
            Err(WaitError::Broken(err)) => Err(err),
        }
    }

    /// Block until the in-flight search (if any) has produced its `bestmove`.
    fn await_search(&self) -> Result<()> {
        match self.search.wait(None) {
            Ok(()) | Err(WaitError::TimedOut) => Ok(()),
            Err(WaitError::Broken(err)) => Err(err),
        }
    }

    /// Stop the running search and wait for its `bestmove`. No-op when idle.
    fn halt_search(&self) -> Result<Option<BestMove>> {
        let (searching, stop_pending) = {
            let data = self.data.lock();
            (data.state.is_searching(), data.stop_pending)
        };
        if !searching {
            return Ok(None);
        }
        if !stop_pending {
            self.send_stop()?;
        }
        self.await_search()?;
        Ok(self.data.lock().last_bestmove.clone())
    }

    // ------------------------------------------------------------------
    // Search and position
    // ------------------------------------------------------------------

    fn validate_position(&self, position: &Position) -> Result<()> {
        if let PositionOrigin::Fen(fen) = &position.origin {
            self.validator.validate_fen(fen)?;
        }
        self.validator
            .validate_moves(&position.origin, &position.moves)?;
        Ok(())
    }

    fn send_stop(&self) -> Result<()> {
        self.send(&GuiCommand::Stop)?;
        self.data.lock().stop_pending = true;
        Ok(())
    }

    /// Write `go`; the caller has already stopped any search and synchronized.
    fn start_go(&self, params: GoParams) -> Result<()> {
        self.search.arm()?;
        {
            let mut data = self.data.lock();
            data.state = SessionState::Searching {
                ponder: params.ponder,
            };
            data.last_bestmove = None;
            data.stop_pending = false;
        }
        if let Err(err) = self.send(&GuiCommand::Go(params)) {
            self.search.disarm();
            let mut data = self.data.lock();
            if data.state.is_searching() {
                data.state = SessionState::Ready;
            }
            return Err(err);
        }
        Ok(())
    }

    fn begin_search(&self, params: GoParams) -> Result<()> {
        if !params.searchmoves.is_empty() {
            let origin = self.data.lock().position.origin.clone();
            self.validator.validate_moves(&origin, &params.searchmoves)?;
        }
        self.halt_search()?;
        self.probe()?;
        self.start_go(params)
    }

    /// Synchronize and write `position`, recording it only once written.
    fn send_position(&self, position: Position) -> Result<()> {
        self.probe()?;
        self.send(&GuiCommand::Position(position.clone()))?;
        self.data.lock().position = position;
        Ok(())
    }

    fn shutdown(&self) {
        let state = self.state();
        if state != SessionState::Stopped {
            if let Err(err) = self.send(&GuiCommand::Quit) {
                log::debug!("quit not delivered: {err}");
            }
            self.data.lock().state = SessionState::Stopped;
        }
        self.break_barriers(&UciError::Closed);
        if let Ok(transport) = self.transport() {
            transport.shutdown(self.config.quit_timeout);
        }
    }
}

/// One engine process and the client-side view of its state.
///
/// All methods block until their effect has been written (and, where the
/// protocol needs it, acknowledged). Calls from different threads are
/// serialized. Event listeners run on the engine reader thread and must not
/// call back into blocking session methods.
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Spawn the configured engine and complete the handshake.
    pub fn spawn(config: SessionConfig) -> Result<Self> {
        Self::spawn_with_validator(config, Arc::new(NotationValidator))
    }

    /// Like [`Session::spawn`], checking positions with `validator`.
    pub fn spawn_with_validator(
        config: SessionConfig,
        validator: Arc<dyn MoveValidator>,
    ) -> Result<Self> {
        let program = config.program.clone();
        let args = config.args.clone();
        Self::connect(config, validator, move |sink| {
            EngineProcess::spawn(&program, &args, sink)
        })
    }

    /// Build a session over a custom transport.
    ///
    /// `connector` receives the sink the transport must deliver engine output
    /// to, and returns the transport. The handshake runs before this returns;
    /// if no `uciok` arrives within the configured timeout the transport is
    /// shut down and [`UciError::HandshakeTimeout`] is returned.
    pub fn connect<F, T>(
        config: SessionConfig,
        validator: Arc<dyn MoveValidator>,
        connector: F,
    ) -> Result<Self>
    where
        F: FnOnce(Arc<dyn TransportSink>) -> Result<T>,
        T: Transport + 'static,
    {
        let inner = Arc::new(Inner::new(config, validator));
        let sink: Arc<dyn TransportSink> = Arc::new(SessionSink(Arc::downgrade(&inner)));
        let transport = connector(sink)?;
        if inner.transport.set(Box::new(transport)).is_err() {
            return Err(UciError::Closed);
        }

        if let Err(err) = inner.handshake() {
            log::error!("engine handshake failed: {err}");
            inner.data.lock().state = SessionState::Stopped;
            inner.break_barriers(&err);
            if let Ok(transport) = inner.transport() {
                transport.shutdown(std::time::Duration::ZERO);
            }
            return Err(err);
        }

        let session = Session { inner };
        session.configure()?;
        Ok(session)
    }

    /// Apply the debug flag and initial options from the configuration.
    fn configure(&self) -> Result<()> {
        let identity = self.identity().unwrap_or_default();
        log::info!(
            "engine ready: '{}' by '{}', {} options",
            identity.name,
            identity.author,
            self.inner.options.lock().len()
        );

        if self.inner.config.debug {
            self.debug(true)?;
        }
        for (name, value) in self.inner.config.options.clone() {
            self.set_option(&name, value)?;
        }
        Ok(())
    }

    /// Subscribe to engine events.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// What the engine said about itself, or `None` if it sent no `id`.
    #[must_use]
    pub fn identity(&self) -> Option<EngineIdentity> {
        self.inner.data.lock().identity.clone()
    }

    /// The last position written to the engine.
    #[must_use]
    pub fn position(&self) -> Position {
        self.inner.data.lock().position.clone()
    }

    /// Limits used by [`Session::search`] and the restart after [`Session::play_move`].
    #[must_use]
    pub fn limits(&self) -> GoParams {
        self.inner.data.lock().limits.clone()
    }

    pub fn set_limits(&self, limits: GoParams) {
        self.inner.data.lock().limits = limits;
    }

    #[must_use]
    pub fn debug_enabled(&self) -> bool {
        self.inner.data.lock().debug
    }

    /// The most recent `bestmove`, cleared whenever a new search starts.
    #[must_use]
    pub fn last_bestmove(&self) -> Option<BestMove> {
        self.inner.data.lock().last_bestmove.clone()
    }

    /// Exit code of the engine process once it has exited.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.inner.data.lock().exit_code
    }

    // ------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------

    /// Current value of an option, or its default if never set.
    pub fn option(&self, name: &str) -> Result<OptionValue> {
        self.inner.options.lock().get(name)
    }

    /// Every option the engine announced, in announcement order.
    #[must_use]
    pub fn options(&self) -> Vec<OptionDescriptor> {
        self.inner.options.lock().descriptors().cloned().collect()
    }

    /// Validate, send and store an option value. Returns the command written.
    ///
    /// An invalid value is rejected before anything is written.
    pub fn set_option(&self, name: &str, value: impl Into<OptionValue>) -> Result<String> {
        let _op = self.inner.op.lock();
        let state = self.inner.ensure_open("set an option")?;
        if state.is_searching() {
            return Err(UciError::IllegalState {
                operation: "set an option",
                state,
                expected: "an idle engine",
            });
        }

        let value = value.into();
        let command = self.inner.options.lock().prepare(name, &value)?;
        self.inner.write_line(&command)?;
        self.inner.options.lock().commit(name, value);
        Ok(command)
    }

    // ------------------------------------------------------------------
    // Simple commands
    // ------------------------------------------------------------------

    /// Switch the engine's debug mode.
    pub fn debug(&self, on: bool) -> Result<()> {
        let _op = self.inner.op.lock();
        self.inner.ensure_open("toggle debug mode")?;
        self.inner.send(&GuiCommand::Debug(on))?;
        self.inner.data.lock().debug = on;
        Ok(())
    }

    /// `register later` when `credentials` is `None`, otherwise `register name .. code ..`.
    pub fn register(&self, credentials: Option<Registration>) -> Result<()> {
        let _op = self.inner.op.lock();
        self.inner.ensure_open("register")?;
        self.inner.send(&GuiCommand::Register(credentials))
    }

    /// Send `isready` and block until the engine has drained its input.
    pub fn wait_ready(&self) -> Result<()> {
        let _op = self.inner.op.lock();
        self.inner.ensure_open("probe readiness")?;
        self.inner.probe()
    }

    // ------------------------------------------------------------------
    // Position
    // ------------------------------------------------------------------

    /// Start a new game: stop any search, `ucinewgame`, then the initial position.
    pub fn new_game(&self) -> Result<()> {
        let _op = self.inner.op.lock();
        self.inner.ensure_open("start a new game")?;
        self.inner.halt_search()?;
        self.inner.send(&GuiCommand::UciNewGame)?;
        self.inner.send_position(Position::startpos())
    }

    /// Replace the position and its move list.
    ///
    /// Stops a running search first. Validation failures leave the engine untouched.
    pub fn set_position(&self, position: Position) -> Result<()> {
        let _op = self.inner.op.lock();
        self.inner.ensure_open("set the position")?;
        self.inner.validate_position(&position)?;
        self.inner.halt_search()?;
        self.inner.send_position(position)
    }

    /// Back to the initial position with an empty move list.
    pub fn reset(&self) -> Result<()> {
        self.set_position(Position::startpos())
    }

    /// Append `mv`, resend the whole position, and restart the search with the
    /// configured limits.
    pub fn play_move(&self, mv: &str) -> Result<()> {
        let _op = self.inner.op.lock();
        self.inner.ensure_open("play a move")?;

        let (next, limits) = {
            let data = self.inner.data.lock();
            (data.position.with_move(mv), data.limits.clone())
        };
        self.inner
            .validator
            .validate_moves(&next.origin, &next.moves)?;

        self.inner.halt_search()?;
        self.inner.send_position(next)?;
        self.inner.start_go(limits)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Start a search with `params`. A running search is stopped (and its
    /// `bestmove` awaited) first, so two searches are never in flight.
    pub fn go(&self, params: GoParams) -> Result<()> {
        let _op = self.inner.op.lock();
        self.inner.ensure_open("start a search")?;
        self.inner.begin_search(params)
    }

    /// Start a search with the configured limits.
    pub fn search(&self) -> Result<()> {
        let limits = self.limits();
        self.go(limits)
    }

    /// Ask the engine to stop. The result arrives later as a `bestmove` event.
    ///
    /// Sent at most once per search; a later `go` then only waits for the `bestmove`.
    pub fn stop(&self) -> Result<()> {
        let _op = self.inner.op.lock();
        self.inner.ensure_open("stop the search")?;
        let data = self.inner.data.lock();
        let needed = data.state.is_searching() && !data.stop_pending;
        drop(data);
        if needed {
            self.inner.send_stop()?;
        }
        Ok(())
    }

    /// Stop the search and wait for its `bestmove`. `None` when nothing was running.
    pub fn stop_and_wait(&self) -> Result<Option<BestMove>> {
        let _op = self.inner.op.lock();
        self.inner.ensure_open("stop the search")?;
        self.inner.halt_search()
    }

    /// Block until the current search reports its `bestmove`.
    ///
    /// Returns immediately with the result if the search already finished.
    /// The wait does not hold the operation lock, so another thread can
    /// [`stop`](Session::stop) the search meanwhile.
    pub fn wait_bestmove(&self) -> Result<BestMove> {
        loop {
            let searching = {
                let _op = self.inner.op.lock();
                let data = self.inner.data.lock();
                if let Some(best) = &data.last_bestmove {
                    return Ok(best.clone());
                }
                data.state.is_searching()
            };

            self.inner.await_search()?;
            if !searching {
                let data = self.inner.data.lock();
                return data.last_bestmove.clone().ok_or(UciError::IllegalState {
                    operation: "wait for a bestmove",
                    state: data.state,
                    expected: "a started search",
                });
            }
        }
    }

    /// The opponent played the expected move; continue the ponder search for real.
    pub fn ponderhit(&self) -> Result<()> {
        let _op = self.inner.op.lock();
        let state = self.inner.state();
        if state != (SessionState::Searching { ponder: true }) {
            return Err(UciError::IllegalState {
                operation: "send ponderhit",
                state,
                expected: "a search started in ponder mode",
            });
        }
        self.inner.send(&GuiCommand::PonderHit)?;
        let mut data = self.inner.data.lock();
        if data.state.is_searching() {
            data.state = SessionState::Searching { ponder: false };
        }
        Ok(())
    }

    /// Send `quit` and wait for the process to exit, killing it after the
    /// configured grace period. Idempotent.
    pub fn quit(&self) -> Result<()> {
        let _op = self.inner.op.lock();
        self.inner.shutdown();
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}
