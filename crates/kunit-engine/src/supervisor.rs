//! The engine child process and its output.
//!
//! One reader thread per pipe forwards lines over a crossbeam channel so the
//! owner can drain output without blocking.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::EngineError;

enum ReaderEvent {
    Line(String),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessState {
    Running,
    Exited(Option<i32>),
}

pub struct EngineProcess {
    child: Child,
    events: Receiver<ReaderEvent>,
    open_readers: usize,
    output_dir: PathBuf,
    state: ProcessState,
}

impl EngineProcess {
    /// Spawn `<executable> --output-dir=<dir> [extra args] <bitcode>` after
    /// removing any output directory left by an earlier run.
    pub fn start(config: &EngineConfig, bitcode: &Path) -> Result<Self, EngineError> {
        if config.output_dir.exists() {
            debug!(dir = %config.output_dir.display(), "removing stale output directory");
            std::fs::remove_dir_all(&config.output_dir)?;
        }

        let mut child = Command::new(&config.executable)
            .arg(format!("--output-dir={}", config.output_dir.display()))
            .args(&config.extra_args)
            .arg(bitcode)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| EngineError::Launch {
                program: config.executable.display().to_string(),
                error,
            })?;

        let (tx, events) = unbounded();
        let mut open_readers = 0;
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, tx.clone());
            open_readers += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, tx);
            open_readers += 1;
        }

        info!(
            pid = child.id(),
            bitcode = %bitcode.display(),
            output_dir = %config.output_dir.display(),
            "engine started"
        );
        Ok(Self {
            child,
            events,
            open_readers,
            output_dir: config.output_dir.clone(),
            state: ProcessState::Running,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Lines gathered since the last call, each ending in a newline. Never
    /// blocks; returns an empty string when nothing new arrived.
    pub fn poll_output(&mut self) -> String {
        let mut out = String::new();
        for event in self.events.try_iter() {
            match event {
                ReaderEvent::Line(line) => {
                    out.push_str(&line);
                    out.push('\n');
                }
                ReaderEvent::Closed => self.open_readers = self.open_readers.saturating_sub(1),
            }
        }
        out
    }

    /// Whether both output pipes have reached end of file and every line
    /// has been handed out by [`poll_output`](Self::poll_output).
    pub fn output_closed(&self) -> bool {
        self.open_readers == 0 && self.events.is_empty()
    }

    pub fn is_running(&mut self) -> bool {
        if self.state == ProcessState::Running {
            match self.child.try_wait() {
                Ok(Some(status)) => self.mark_exited(status.code()),
                Ok(None) => {}
                Err(error) => {
                    warn!(%error, "could not query engine status; treating it as exited");
                    self.mark_exited(None);
                }
            }
        }
        self.state == ProcessState::Running
    }

    /// Exit code once the process has exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            ProcessState::Exited(code) => code,
            ProcessState::Running => None,
        }
    }

    /// Kill and reap the process. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        let _ = self.child.kill();
        let code = self.child.wait().ok().and_then(|status| status.code());
        self.mark_exited(code);
        info!("engine stopped");
    }

    fn mark_exited(&mut self, code: Option<i32>) {
        self.state = ProcessState::Exited(code);
        info!(exit_code = ?code, "engine exited");
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for EngineProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineProcess")
            .field("pid", &self.child.id())
            .field("output_dir", &self.output_dir)
            .field("state", &self.state)
            .finish()
    }
}

/// Lines are split on raw `\n` bytes; bytes that are not UTF-8 are replaced
/// rather than ending the read, so the pipe stays open for the engine.
fn spawn_reader<R: Read + Send + 'static>(pipe: R, tx: Sender<ReaderEvent>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(error) => {
                    debug!(%error, "engine output pipe failed");
                    break;
                }
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }
            let line = String::from_utf8_lossy(&buf).into_owned();
            if tx.send(ReaderEvent::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(ReaderEvent::Closed);
    });
}
