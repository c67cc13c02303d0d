//! Engine child process with line-buffered output readers.

use std::ffi::OsStr;
use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{ensure_single_line, LineBuffer, Transport, TransportSink};
use crate::error::{Result, UciError};

/// Read size for the output pipes.
const CHUNK_SIZE: usize = 4096;

/// Poll interval while waiting for the process to exit
const EXIT_POLL_MS: u64 = 5;

/// A spawned engine. Terminal once exited: there is no respawn.
pub struct EngineProcess {
    program: String,
    child: Arc<Mutex<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    alive: Arc<AtomicBool>,
    exit_code: Arc<Mutex<Option<i32>>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

impl EngineProcess {
    /// Launch `program` and start delivering its output to `sink`.
    pub fn spawn<I, S>(
        program: impl AsRef<OsStr>,
        args: I,
        sink: Arc<dyn TransportSink>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program_name = program.as_ref().to_string_lossy().into_owned();
        let mut child = Command::new(program.as_ref())
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| UciError::io(format!("spawning '{program_name}'"), &e))?;

        log::debug!("spawned engine '{}' (pid {})", program_name, child.id());

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let child = Arc::new(Mutex::new(child));
        let alive = Arc::new(AtomicBool::new(true));
        let exit_code = Arc::new(Mutex::new(None));
        let mut readers = Vec::with_capacity(2);

        if let Some(mut stderr) = stderr {
            let sink = Arc::clone(&sink);
            readers.push(spawn_reader("engine-stderr", move || {
                let mut buffer = LineBuffer::new();
                pump(&mut stderr, &mut buffer, |line| {
                    log::warn!("engine stderr: {line}");
                    sink.on_error(UciError::EngineStderr {
                        line: line.to_string(),
                    });
                });
            })?);
        }

        if let Some(mut stdout) = stdout {
            let child = Arc::clone(&child);
            let alive = Arc::clone(&alive);
            let exit_code = Arc::clone(&exit_code);
            readers.push(spawn_reader("engine-stdout", move || {
                let mut buffer = LineBuffer::new();
                let fault = pump(&mut stdout, &mut buffer, |line| sink.on_line(line));
                if let Some(tail) = buffer.finish() {
                    sink.on_line(&tail);
                }
                if let Some(err) = fault {
                    sink.on_error(err);
                }

                let code = wait_for_exit(&child);
                *exit_code.lock() = code;
                alive.store(false, Ordering::Release);
                log::debug!("engine exited with code {code:?}");
                sink.on_exit(code);
            })?);
        }

        Ok(EngineProcess {
            program: program_name,
            child,
            stdin: Mutex::new(stdin),
            alive,
            exit_code,
            readers: Mutex::new(readers),
        })
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Exit code, once the process has exited. `None` while running or when
    /// killed by a signal.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }

    fn kill(&self) {
        let mut child = self.child.lock();
        if let Ok(None) = child.try_wait() {
            if let Err(e) = child.kill() {
                log::error!("failed to kill engine '{}': {e}", self.program);
            }
            let _ = child.wait();
        }
    }
}

impl Transport for EngineProcess {
    fn write(&self, command: &str) -> Result<()> {
        ensure_single_line(command)?;
        if !self.is_alive() {
            return Err(UciError::ProcessIo {
                context: format!("writing '{command}'"),
                message: "engine process has exited".to_string(),
            });
        }

        let mut guard = self.stdin.lock();
        let stdin = guard.as_mut().ok_or_else(|| UciError::ProcessIo {
            context: format!("writing '{command}'"),
            message: "engine input is closed".to_string(),
        })?;

        log::debug!(">> {command}");
        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .and_then(|()| stdin.flush())
            .map_err(|e| UciError::io(format!("writing '{command}'"), &e))
    }

    fn shutdown(&self, grace: Duration) {
        // Closing stdin is the polite signal; most engines exit on EOF.
        self.stdin.lock().take();

        let deadline = Instant::now() + grace;
        while self.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(EXIT_POLL_MS));
        }
        if self.is_alive() {
            log::warn!("engine '{}' ignored quit, killing it", self.program);
            self.kill();
        }

        // A listener may call shutdown from a reader thread; never join ourselves.
        let current = thread::current().id();
        for handle in self.readers.lock().drain(..) {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.stdin.get_mut().take();
        self.kill();
    }
}

fn spawn_reader<F>(name: &str, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| UciError::io(format!("starting {name} reader"), &e))
}

/// Copy chunks from `source` through `buffer` until EOF. Returns the read
/// error that ended the stream, if any.
fn pump<R: Read>(
    source: &mut R,
    buffer: &mut LineBuffer,
    mut on_line: impl FnMut(&str),
) -> Option<UciError> {
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        match source.read(&mut chunk) {
            Ok(0) => return None,
            Ok(n) => {
                for line in buffer.push(&chunk[..n]) {
                    on_line(&line);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Some(UciError::io("reading engine output", &e)),
        }
    }
}

/// Poll until the child exits without holding the lock across sleeps, so
/// `kill` stays reachable.
fn wait_for_exit(child: &Mutex<Child>) -> Option<i32> {
    loop {
        match child.lock().try_wait() {
            Ok(Some(status)) => return status.code(),
            Ok(None) => {}
            Err(e) => {
                log::error!("failed to poll engine exit status: {e}");
                return None;
            }
        }
        thread::sleep(Duration::from_millis(EXIT_POLL_MS));
    }
}
