//! In-process publish/subscribe for engine events.
//!
//! Each session owns its own bus. Listeners run synchronously on the thread
//! that emits, in subscription order, and a panicking listener does not stop
//! the ones after it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, UciError};
use crate::uci::{BestMove, EngineMessage, IdInfo, Info, OptionDescriptor};

/// Everything a session publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Id(IdInfo),
    /// Handshake acknowledged.
    UciOk,
    /// Readiness probe acknowledged.
    ReadyOk,
    BestMove(BestMove),
    CopyProtection(String),
    Registration(String),
    Option(OptionDescriptor),
    Info(Info),
    /// A line with an unrecognized keyword, verbatim.
    Output(String),
    Error(UciError),
    /// The engine process ended.
    Exit(Option<i32>),
}

/// Subscription key for [`Event`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Id,
    UciOk,
    ReadyOk,
    BestMove,
    CopyProtection,
    Registration,
    Option,
    Info,
    Output,
    Error,
    Exit,
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Id(_) => EventKind::Id,
            Event::UciOk => EventKind::UciOk,
            Event::ReadyOk => EventKind::ReadyOk,
            Event::BestMove(_) => EventKind::BestMove,
            Event::CopyProtection(_) => EventKind::CopyProtection,
            Event::Registration(_) => EventKind::Registration,
            Event::Option(_) => EventKind::Option,
            Event::Info(_) => EventKind::Info,
            Event::Output(_) => EventKind::Output,
            Event::Error(_) => EventKind::Error,
            Event::Exit(_) => EventKind::Exit,
        }
    }
}

impl From<EngineMessage> for Event {
    fn from(message: EngineMessage) -> Self {
        match message {
            EngineMessage::Id(id) => Event::Id(id),
            EngineMessage::UciOk => Event::UciOk,
            EngineMessage::ReadyOk => Event::ReadyOk,
            EngineMessage::BestMove(best) => Event::BestMove(best),
            EngineMessage::CopyProtection(s) => Event::CopyProtection(s),
            EngineMessage::Registration(s) => Event::Registration(s),
            EngineMessage::Option(opt) => Event::Option(opt),
            EngineMessage::Info(info) => Event::Info(info),
            EngineMessage::Output(line) => Event::Output(line),
        }
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: ListenerId,
    kind: EventKind,
    listener: Listener,
    once: bool,
}

/// Fan-out from parsed engine output to subscribers.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    /// Set once the source is gone; later `once` calls resolve as closed.
    closed: AtomicBool,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `listener` for every future event of `kind`.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().push(Subscription {
            id,
            kind,
            listener: Arc::new(listener),
            once: false,
        });
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut subs = self.subscriptions.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Resolve with the next event of `kind`, then unsubscribe.
    ///
    /// Dropping the returned [`Once`] unsubscribes as well. After
    /// [`EventBus::close_pending`] the result fails immediately with
    /// [`UciError::Closed`].
    pub fn once(&self, kind: EventKind) -> Once {
        let (tx, rx) = mpsc::channel();
        let tx: Mutex<Option<Sender<Event>>> = Mutex::new(Some(tx));
        let listener: Listener = Arc::new(move |event: &Event| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(event.clone());
            }
        });
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        {
            let mut subs = self.subscriptions.lock();
            // Checked under the lock so a concurrent close cannot miss the entry.
            if !self.closed.load(Ordering::Acquire) {
                subs.push(Subscription {
                    id,
                    kind,
                    listener,
                    once: true,
                });
            }
        }

        Once {
            id,
            rx,
            subscriptions: Arc::downgrade(&self.subscriptions),
        }
    }

    /// Deliver `event` to the current listeners of its kind, in order.
    ///
    /// The subscription list is not locked while listeners run, so a listener
    /// may subscribe or unsubscribe without deadlocking.
    pub fn emit(&self, event: &Event) {
        let kind = event.kind();
        let listeners: Vec<Listener> = {
            let mut subs = self.subscriptions.lock();
            let matching = subs
                .iter()
                .filter(|s| s.kind == kind)
                .map(|s| Arc::clone(&s.listener))
                .collect();
            subs.retain(|s| !(s.once && s.kind == kind));
            matching
        };

        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::error!("{kind:?} listener panicked; continuing with the rest");
            }
        }
    }

    /// Drop every pending `once` subscription, failing their waiters with
    /// [`UciError::Closed`]. Later `once` calls fail the same way.
    pub fn close_pending(&self) {
        let mut subs = self.subscriptions.lock();
        self.closed.store(true, Ordering::Release);
        subs.retain(|s| !s.once);
    }

    /// Number of live subscriptions for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .lock()
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }
}

/// Single-shot subscription created by [`EventBus::once`].
pub struct Once {
    id: ListenerId,
    rx: Receiver<Event>,
    subscriptions: Weak<Mutex<Vec<Subscription>>>,
}

impl Once {
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Block until the event arrives.
    pub fn wait(self) -> Result<Event> {
        self.rx.recv().map_err(|_| UciError::Closed)
    }

    /// Block until the event arrives or `timeout` passes. `Ok(None)` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<Event>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(UciError::Closed),
        }
    }

    /// The event, if it has already arrived.
    #[must_use]
    pub fn try_take(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Once {
    fn drop(&mut self) {
        if let Some(subscriptions) = self.subscriptions.upgrade() {
            subscriptions.lock().retain(|s| s.id != self.id);
        }
    }
}
