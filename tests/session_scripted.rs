//! Session behaviour against an in-memory engine that answers synchronously.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use uci_client::position::FenError;
use uci_client::transport::{Transport, TransportSink};
use uci_client::uci::Registration;
use uci_client::{
    Event, EventKind, GoParams, NotationValidator, OptionValue, Position, Result, Session,
    SessionConfig, SessionState, UciError,
};

const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";

#[derive(Clone, Copy)]
enum Script {
    /// Identifies itself, declares options, answers probes and stops.
    Full,
    /// Only `uciok`: no id, no options.
    Bare,
    /// Never answers anything.
    Silent,
    /// Answers `stop` from another thread after a delay, journalling
    /// `(bestmove)` when it does.
    Delayed,
}

const BESTMOVE_DELAY: Duration = Duration::from_millis(30);

struct ScriptedEngine {
    sink: Arc<dyn TransportSink>,
    script: Script,
    writes: Arc<Mutex<Vec<String>>>,
    exited: AtomicBool,
}

impl ScriptedEngine {
    fn new(sink: Arc<dyn TransportSink>, script: Script) -> Self {
        ScriptedEngine {
            sink,
            script,
            writes: Arc::new(Mutex::new(Vec::new())),
            exited: AtomicBool::new(false),
        }
    }

    fn say(&self, line: &str) {
        self.sink.on_line(line);
    }

    fn exit(&self, code: Option<i32>) {
        if !self.exited.swap(true, Ordering::SeqCst) {
            self.sink.on_exit(code);
        }
    }

    fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    fn count(&self, command: &str) -> usize {
        self.writes.lock().iter().filter(|w| *w == command).count()
    }

    fn clear(&self) {
        self.writes.lock().clear();
    }
}

impl Transport for ScriptedEngine {
    fn write(&self, command: &str) -> Result<()> {
        if self.exited.load(Ordering::SeqCst) {
            return Err(UciError::Closed);
        }
        self.writes.lock().push(command.to_string());

        match (self.script, command) {
            (Script::Silent, _) => {}
            (Script::Bare | Script::Delayed, "uci") => self.say("uciok"),
            (Script::Delayed, "stop") => {
                let sink = Arc::clone(&self.sink);
                let journal = Arc::clone(&self.writes);
                thread::spawn(move || {
                    thread::sleep(BESTMOVE_DELAY);
                    journal.lock().push("(bestmove)".to_string());
                    sink.on_line("bestmove e2e4");
                });
            }
            (Script::Full, "uci") => {
                self.say("id name Scripted 1.0");
                self.say("id author The Test Suite");
                self.say("option name Hash type spin default 16 min 1 max 1024");
                self.say("option name Ponder type check default false");
                self.say("option name Style type combo default Normal var Solid var Normal var Risky");
                self.say("option name Clear Hash type button");
                self.say("option name Debug Log File type string default <empty>");
                self.say("uciok");
            }
            (_, "isready") => self.say("readyok"),
            (_, "stop") => self.say("bestmove e2e4 ponder e7e5"),
            _ => {}
        }
        Ok(())
    }

    fn shutdown(&self, _grace: Duration) {
        self.exit(Some(0));
    }
}

fn config() -> SessionConfig {
    SessionConfig::new("scripted").with_handshake_timeout(Duration::from_millis(200))
}

fn connect(config: SessionConfig, script: Script) -> Result<(Session, Arc<ScriptedEngine>)> {
    let mut handle = None;
    let session = Session::connect(config, Arc::new(NotationValidator), |sink| {
        let engine = Arc::new(ScriptedEngine::new(sink, script));
        handle = Some(Arc::clone(&engine));
        Ok(engine)
    })?;
    Ok((session, handle.unwrap()))
}

fn start() -> (Session, Arc<ScriptedEngine>) {
    connect(config(), Script::Full).unwrap()
}

fn collect(session: &Session, kind: EventKind) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session.events().on(kind, move |e| sink.lock().push(e.clone()));
    seen
}

#[test]
fn handshake_records_identity_and_options() {
    let (session, engine) = start();

    assert_eq!(session.state(), SessionState::Ready);
    let identity = session.identity().unwrap();
    assert_eq!(identity.name, "Scripted 1.0");
    assert_eq!(identity.author, "The Test Suite");

    let names: Vec<String> = session.options().into_iter().map(|o| o.name).collect();
    assert_eq!(
        names,
        vec!["Hash", "Ponder", "Style", "Clear Hash", "Debug Log File"]
    );
    assert_eq!(session.option("Hash").unwrap(), OptionValue::Int(16));
    assert_eq!(engine.writes(), vec!["uci"]);
}

#[test]
fn engine_without_id_has_no_identity() {
    let (session, _engine) = connect(config(), Script::Bare).unwrap();
    assert_eq!(session.identity(), None);
    assert!(session.options().is_empty());
}

#[test]
fn silent_engine_times_out_and_is_shut_down() {
    let mut handle = None;
    let result = Session::connect(
        config().with_handshake_timeout(Duration::from_millis(30)),
        Arc::new(NotationValidator),
        |sink| {
            let engine = Arc::new(ScriptedEngine::new(sink, Script::Silent));
            handle = Some(Arc::clone(&engine));
            Ok(engine)
        },
    );

    assert!(matches!(result, Err(UciError::HandshakeTimeout { .. })));
    assert!(handle.unwrap().exited.load(Ordering::SeqCst));
}

#[test]
fn configured_debug_and_options_follow_the_handshake() {
    let config = config().with_debug(true).with_option("Hash", 64);
    let (session, engine) = connect(config, Script::Full).unwrap();

    assert_eq!(
        engine.writes(),
        vec!["uci", "debug on", "setoption name Hash value 64"]
    );
    assert!(session.debug_enabled());
    assert_eq!(session.option("Hash").unwrap(), OptionValue::Int(64));
}

#[test]
fn invalid_configured_option_fails_the_connect() {
    let config = config().with_option("Hash", 4096);
    assert!(matches!(
        connect(config, Script::Full),
        Err(UciError::OptionRange { .. })
    ));
}

#[test]
fn set_option_validates_before_writing() {
    let (session, engine) = start();
    engine.clear();

    assert_eq!(
        session.set_option("Hash", 512).unwrap(),
        "setoption name Hash value 512"
    );
    assert_eq!(session.option("Hash").unwrap(), OptionValue::Int(512));

    assert!(matches!(
        session.set_option("Hash", 0),
        Err(UciError::OptionRange { value: 0, min: Some(1), max: Some(1024), .. })
    ));
    assert!(matches!(
        session.set_option("Hash", true),
        Err(UciError::OptionType { .. })
    ));
    assert!(matches!(
        session.set_option("Style", "Reckless"),
        Err(UciError::OptionEnum { .. })
    ));
    assert!(matches!(
        session.set_option("Threads", 4),
        Err(UciError::UndefinedOption { .. })
    ));

    session.set_option("Clear Hash", OptionValue::Trigger).unwrap();
    assert_eq!(
        engine.writes(),
        vec!["setoption name Hash value 512", "setoption name Clear Hash"]
    );
    assert_eq!(session.option("Hash").unwrap(), OptionValue::Int(512));
}

#[test]
fn options_cannot_change_mid_search() {
    let (session, _engine) = start();
    session.go(GoParams::infinite()).unwrap();
    assert!(matches!(
        session.set_option("Hash", 32),
        Err(UciError::IllegalState { .. })
    ));
}

#[test]
fn new_search_stops_the_previous_one_exactly_once() {
    let (session, engine) = start();
    engine.clear();

    session.go(GoParams::infinite()).unwrap();
    assert_eq!(session.state(), SessionState::Searching { ponder: false });
    session.go(GoParams::depth(5)).unwrap();

    assert_eq!(
        engine.writes(),
        vec!["isready", "go infinite", "stop", "isready", "go depth 5"]
    );
    assert_eq!(engine.count("stop"), 1);
}

#[test]
fn idle_session_sends_no_stop() {
    let (session, engine) = start();
    session.stop().unwrap();
    assert_eq!(session.stop_and_wait().unwrap(), None);
    assert_eq!(engine.count("stop"), 0);
}

#[test]
fn stop_and_wait_returns_the_bestmove() {
    let (session, _engine) = start();
    session.search().unwrap();

    let best = session.stop_and_wait().unwrap().unwrap();
    assert_eq!(best.mv, "e2e4");
    assert_eq!(best.ponder.as_deref(), Some("e7e5"));
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.wait_bestmove().unwrap(), best);
}

#[test]
fn played_moves_resend_the_whole_game() {
    let (session, engine) = start();
    engine.clear();

    session.play_move("e2e4").unwrap();
    session.play_move("e7e5").unwrap();

    assert_eq!(
        engine.writes(),
        vec![
            "isready",
            "position startpos moves e2e4",
            "go infinite",
            "stop",
            "isready",
            "position startpos moves e2e4 e7e5",
            "go infinite",
        ]
    );
    assert_eq!(session.position().moves, vec!["e2e4", "e7e5"]);
}

#[test]
fn malformed_move_writes_nothing() {
    let (session, engine) = start();
    session.play_move("e2e4").unwrap();
    let before = engine.writes();

    assert!(matches!(
        session.play_move("e9e4"),
        Err(UciError::InvalidMove(_))
    ));
    assert!(matches!(
        session.set_position(Position::startpos().with_move("e7e8k")),
        Err(UciError::InvalidMove(_))
    ));
    assert_eq!(engine.writes(), before);
    assert_eq!(session.position().moves, vec!["e2e4"]);
}

#[test]
fn fen_positions_are_validated_and_sent() {
    let (session, engine) = start();
    engine.clear();

    session
        .set_position(Position::fen(STARTPOS_FEN).with_move("e7e5"))
        .unwrap();
    assert_eq!(
        engine.writes(),
        vec![
            "isready".to_string(),
            format!("position fen {STARTPOS_FEN} moves e7e5"),
        ]
    );
    assert!(matches!(
        session.set_position(Position::fen("not a fen")),
        Err(UciError::InvalidPosition(_))
    ));
}

#[test]
fn new_game_and_reset_return_to_the_start() {
    let (session, engine) = start();
    session.play_move("d2d4").unwrap();
    engine.clear();

    session.new_game().unwrap();
    assert_eq!(
        engine.writes(),
        vec!["stop", "ucinewgame", "isready", "position startpos"]
    );
    assert_eq!(session.position(), Position::startpos());

    session.play_move("d2d4").unwrap();
    session.stop_and_wait().unwrap();
    session.reset().unwrap();
    assert_eq!(session.position(), Position::startpos());
}

#[test]
fn ponderhit_requires_a_ponder_search() {
    let (session, engine) = start();
    assert!(matches!(
        session.ponderhit(),
        Err(UciError::IllegalState { operation: "send ponderhit", .. })
    ));

    session.go(GoParams::infinite()).unwrap();
    assert!(matches!(session.ponderhit(), Err(UciError::IllegalState { .. })));
    session.stop_and_wait().unwrap();

    session.go(GoParams::movetime(1000).with_ponder()).unwrap();
    assert_eq!(session.state(), SessionState::Searching { ponder: true });
    session.ponderhit().unwrap();
    assert_eq!(session.state(), SessionState::Searching { ponder: false });
    assert_eq!(engine.count("ponderhit"), 1);
}

#[test]
fn register_later_or_with_credentials() {
    let (session, engine) = start();
    engine.clear();

    session.register(None).unwrap();
    session
        .register(Some(Registration {
            name: "Stefan MK".to_string(),
            code: "4359874324".to_string(),
        }))
        .unwrap();
    assert_eq!(
        engine.writes(),
        vec!["register later", "register name Stefan MK code 4359874324"]
    );
}

#[test]
fn engine_output_becomes_events() {
    let (session, engine) = start();
    let infos = collect(&session, EventKind::Info);
    let output = collect(&session, EventKind::Output);
    let errors = collect(&session, EventKind::Error);

    engine.say("info depth 12 score cp -35 nodes 120000 pv e7e5 g1f3");
    engine.say("Stockfish diagnostics follow");
    engine.say("option name Broken type");
    engine.say("option name Hash type spin default 1 min 1 max 8");
    engine.say("");

    let infos = infos.lock();
    let [Event::Info(info)] = infos.as_slice() else {
        panic!("expected one info event, got {infos:?}");
    };
    assert_eq!(info.depth, Some(12));
    assert_eq!(info.score.unwrap().pawns(), Some(-0.35));

    assert_eq!(
        *output.lock(),
        vec![Event::Output("Stockfish diagnostics follow".to_string())]
    );

    let errors = errors.lock();
    assert_eq!(errors.len(), 2);
    assert!(matches!(errors[0], Event::Error(UciError::MalformedOption { .. })));
    assert!(matches!(
        errors[1],
        Event::Error(UciError::OptionAlreadyDefined { .. })
    ));
    assert_eq!(session.option("Hash").unwrap(), OptionValue::Int(16));
}

#[test]
fn once_resolves_with_the_next_bestmove() {
    let (session, engine) = start();
    let once = session.events().once(EventKind::BestMove);
    session.go(GoParams::depth(3)).unwrap();
    engine.say("bestmove g1f3");

    let Event::BestMove(best) = once.wait_timeout(Duration::from_secs(1)).unwrap().unwrap() else {
        panic!("expected bestmove");
    };
    assert_eq!(best.mv, "g1f3");
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.wait_bestmove().unwrap().mv, "g1f3");
}

#[test]
fn engine_exit_ends_the_session() {
    let (session, engine) = start();
    let exits = collect(&session, EventKind::Exit);
    let pending = session.events().once(EventKind::ReadyOk);

    session.go(GoParams::infinite()).unwrap();
    engine.exit(Some(1));

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.exit_code(), Some(1));
    assert_eq!(*exits.lock(), vec![Event::Exit(Some(1))]);
    assert_eq!(pending.wait(), Err(UciError::Closed));

    assert!(matches!(
        session.wait_bestmove(),
        Err(UciError::ProcessIo { .. })
    ));
    assert!(matches!(
        session.go(GoParams::depth(1)),
        Err(UciError::IllegalState { .. })
    ));
}

#[test]
fn quit_is_idempotent() {
    let (session, engine) = start();
    let exits = collect(&session, EventKind::Exit);

    session.quit().unwrap();
    session.quit().unwrap();
    assert_eq!(engine.count("quit"), 1);
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(exits.lock().len(), 1);
    assert!(matches!(session.wait_ready(), Err(UciError::IllegalState { .. })));
}

#[test]
fn dropping_the_session_quits_the_engine() {
    let (session, engine) = start();
    drop(session);
    assert_eq!(engine.count("quit"), 1);
    assert!(engine.exited.load(Ordering::SeqCst));
}

#[test]
fn multi_line_input_never_reaches_the_engine() {
    let (session, engine) = start();
    engine.clear();

    assert_eq!(
        session.set_position(Position::fen("8/8/8/8/8/8/8/K6k w - - 0 1\ngo infinite")),
        Err(UciError::InvalidPosition(FenError::LineBreak))
    );
    assert_eq!(
        session.set_position(Position::fen("8/8/8/8/8/8/8/K6k w - - 0 1 moves a1a2")),
        Err(UciError::InvalidPosition(FenError::TooManyParts { found: 8 }))
    );
    assert!(matches!(
        session.set_option("Debug Log File", "x\ngo infinite"),
        Err(UciError::LineBreak { .. })
    ));
    assert!(matches!(
        session.register(Some(Registration {
            name: "A\ngo infinite".to_string(),
            code: "1".to_string(),
        })),
        Err(UciError::LineBreak { .. })
    ));

    assert!(engine.writes().is_empty());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.position(), Position::startpos());
}

#[test]
fn empty_string_option_uses_the_empty_token() {
    let (session, engine) = start();
    session.set_option("Debug Log File", "").unwrap();
    assert_eq!(engine.count("setoption name Debug Log File value <empty>"), 1);
}

#[test]
fn stop_reaches_the_engine_while_another_thread_waits() {
    let (session, engine) = connect(config(), Script::Delayed).unwrap();
    let session = Arc::new(session);
    session.go(GoParams::infinite()).unwrap();

    let waiter = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.wait_bestmove())
    };
    thread::sleep(Duration::from_millis(20));

    let (tx, rx) = mpsc::channel();
    let stopper = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            let _ = tx.send(session.stop());
        })
    };
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Ok(()));
    stopper.join().unwrap();

    assert_eq!(waiter.join().unwrap().unwrap().mv, "e2e4");
    assert_eq!(engine.count("stop"), 1);
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn concurrent_search_requests_are_serialized() {
    let (session, engine) = connect(config(), Script::Delayed).unwrap();
    let session = Arc::new(session);
    engine.clear();
    session.go(GoParams::infinite()).unwrap();

    let handles: Vec<_> = [4, 6]
        .into_iter()
        .map(|depth| {
            let session = Arc::clone(&session);
            thread::spawn(move || session.go(GoParams::depth(depth)))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let writes = engine.writes();
    let mut in_flight = false;
    for line in &writes {
        if line.starts_with("go") {
            assert!(!in_flight, "second go while a search was running: {writes:?}");
            in_flight = true;
        } else if line == "(bestmove)" {
            in_flight = false;
        }
    }
    assert_eq!(engine.count("stop"), 2);
    assert_eq!(writes.iter().filter(|w| w.starts_with("go")).count(), 3);
    assert!(session.state().is_searching());
}

#[test]
fn stop_before_a_new_search_is_not_repeated() {
    let (session, engine) = connect(config(), Script::Delayed).unwrap();
    engine.clear();

    session.go(GoParams::infinite()).unwrap();
    session.stop().unwrap();
    session.stop().unwrap();
    assert!(session.state().is_searching());

    session.go(GoParams::depth(4)).unwrap();
    assert_eq!(
        engine.writes(),
        vec!["isready", "go infinite", "stop", "(bestmove)", "isready", "go depth 4"]
    );
}
