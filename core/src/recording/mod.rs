//! Recording session lifecycle.
//!
//! Workloads talk to a [`Recorder`] unconditionally; when recording is disabled the
//! [`NoopRecorder`] absorbs every call, so the workload shape never depends on it.

mod artifact;
mod event;

pub use artifact::Recording;
pub use event::{Event, EventKind, parse_event_list, parse_threshold};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam::channel::{self, Receiver, Sender};
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::error::WorkloadError;

/// Lifecycle of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct RecordingConfig {
    pub destination: PathBuf,
    pub events: Vec<EventKind>,
    /// Duration events shorter than this are dropped.
    pub threshold: Option<Duration>,
}

impl RecordingConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            events: vec![EventKind::MonitorEnter],
            threshold: None,
        }
    }

    pub fn with_events(mut self, events: Vec<EventKind>) -> Self {
        self.events = events;
        self
    }

    pub fn with_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Start/stop/dump lifecycle of an external recording session.
pub trait Recorder: Send + Sync {
    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    fn dump(&self, path: &Path) -> Result<()>;

    /// Where the session should be dumped once stopped, if anywhere.
    fn destination(&self) -> Option<&Path>;

    fn state(&self) -> SessionState;

    /// Cheap check so callers can skip building events nobody wants.
    fn accepts(&self, kind: EventKind) -> bool;

    /// Report an event that began at `at` and lasted `duration` on the current thread.
    fn record(&self, kind: EventKind, at: Instant, duration: Duration);
}

/// Recorder used when no destination is configured.
#[derive(Debug, Default)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn dump(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn destination(&self) -> Option<&Path> {
        None
    }

    fn state(&self) -> SessionState {
        SessionState::Unstarted
    }

    fn accepts(&self, _kind: EventKind) -> bool {
        false
    }

    fn record(&self, _kind: EventKind, _at: Instant, _duration: Duration) {}
}

/// In-process recorder that captures events and writes them as a [`Recording`].
///
/// Events travel through an unbounded channel, so the contended path never takes a
/// second lock. The mutexes only guard lifecycle transitions, the drained buffer and the
/// destination opened by [`EventRecorder::new`].
#[derive(Debug)]
pub struct EventRecorder {
    config: RecordingConfig,
    mask: u8,
    active: AtomicBool,
    origin: OnceCell<Instant>,
    state: Mutex<SessionState>,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    captured: Mutex<Vec<Event>>,
    output: Mutex<Option<BufWriter<File>>>,
}

impl EventRecorder {
    /// Creates the destination file up front, so an unwritable path fails before any
    /// workload starts.
    pub fn new(config: RecordingConfig) -> Result<Self> {
        if config.events.is_empty() {
            return Err(WorkloadError::config("recording needs at least one event kind").into());
        }
        let file = File::create(&config.destination).map_err(|e| {
            WorkloadError::startup(
                format!("recording session at '{}'", config.destination.display()),
                e,
            )
        })?;
        let mask = config.events.iter().fold(0u8, |mask, kind| mask | kind.bit());
        let (tx, rx) = channel::unbounded();
        Ok(Self {
            config,
            mask,
            active: AtomicBool::new(false),
            origin: OnceCell::new(),
            state: Mutex::new(SessionState::Unstarted),
            tx,
            rx,
            captured: Mutex::new(Vec::new()),
            output: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Snapshot of the events drained by `stop`.
    pub fn recording(&self) -> Result<Recording> {
        let captured = self
            .captured
            .lock()
            .map_err(|_| WorkloadError::Recording("event buffer poisoned".into()))?;
        Ok(Recording::new(captured.clone()))
    }

    fn transition(&self, from: SessionState, to: SessionState) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| WorkloadError::Recording("session state poisoned".into()))?;
        if *state != from {
            return Err(WorkloadError::Recording(format!("cannot move session from {:?} to {:?}", *state, to)).into());
        }
        *state = to;
        Ok(())
    }
}

impl Recorder for EventRecorder {
    fn start(&self) -> Result<()> {
        self.transition(SessionState::Unstarted, SessionState::Running)?;
        let _ = self.origin.set(Instant::now());
        self.active.store(true, Ordering::Release);
        info!(
            destination = %self.config.destination.display(),
            events = ?self.config.events,
            threshold = ?self.config.threshold,
            "recording started"
        );
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.transition(SessionState::Running, SessionState::Stopped)?;
        self.active.store(false, Ordering::Release);

        let mut captured = self
            .captured
            .lock()
            .map_err(|_| WorkloadError::Recording("event buffer poisoned".into()))?;
        captured.extend(self.rx.try_iter());
        info!(events = captured.len(), "recording stopped");
        Ok(())
    }

    fn dump(&self, path: &Path) -> Result<()> {
        if self.state() != SessionState::Stopped {
            return Err(WorkloadError::Recording("dump requested before the session was stopped".into()).into());
        }
        let recording = self.recording()?;
        let reserved = if path == self.config.destination {
            self.output
                .lock()
                .map_err(|_| WorkloadError::Recording("output handle poisoned".into()))?
                .take()
        } else {
            None
        };
        let written = match reserved {
            Some(mut out) => recording
                .encode(&mut out)
                .and_then(|()| out.flush().map_err(Into::into)),
            None => recording.write_to(path),
        };
        written.map_err(|e| WorkloadError::Recording(format!("{:#}", e)))?;
        debug!(path = %path.display(), events = recording.events.len(), "recording dumped");
        Ok(())
    }

    fn destination(&self) -> Option<&Path> {
        Some(&self.config.destination)
    }

    fn state(&self) -> SessionState {
        self.state.lock().map(|s| *s).unwrap_or(SessionState::Stopped)
    }

    #[inline]
    fn accepts(&self, kind: EventKind) -> bool {
        self.mask & kind.bit() != 0
    }

    fn record(&self, kind: EventKind, at: Instant, duration: Duration) {
        if !self.accepts(kind) || !self.active.load(Ordering::Acquire) {
            return;
        }
        if kind.has_duration()
            && let Some(threshold) = self.config.threshold
            && duration < threshold
        {
            return;
        }
        let Some(origin) = self.origin.get() else {
            return;
        };

        let current = thread::current();
        let event = Event {
            kind,
            thread: current.name().unwrap_or("unnamed").to_string(),
            start: at.saturating_duration_since(*origin),
            duration,
        };
        let _ = self.tx.send(event);
    }
}
