//! Pool of busy-spinning threads.
//!
//! Every worker does nothing but poll a [`SignalFlag`]; the pool exists to put a known
//! number of runnable threads in front of the scheduler and the sampler.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::WorkloadError;
use crate::signal::SignalFlag;

/// Lifecycle of a single worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Terminated,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Created,
            1 => WorkerState::Running,
            _ => WorkerState::Terminated,
        }
    }
}

/// Handle to one spawned spin worker, owned by its pool.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    state: Arc<AtomicU8>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Outcome of stopping a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpinSummary {
    pub started: usize,
    pub terminated: usize,
}

type Spawner<'a> = dyn FnMut(String, Box<dyn FnOnce() + Send + 'static>) -> io::Result<JoinHandle<()>> + 'a;

#[derive(Debug)]
pub struct SpinPool {
    flag: SignalFlag,
    workers: Vec<WorkerHandle>,
    exits: Receiver<usize>,
}

impl SpinPool {
    /// Start `threads` spinners named `spinner-<i>`. Zero is allowed.
    ///
    /// Fails atomically: if any thread cannot be spawned, the ones already running are
    /// stopped and joined before the error is returned.
    pub fn start(threads: usize) -> Result<Self> {
        Self::start_with(threads, &mut |name, body| thread::Builder::new().name(name).spawn(body))
    }

    pub(crate) fn start_with(threads: usize, spawn: &mut Spawner<'_>) -> Result<Self> {
        let flag = SignalFlag::new();
        let (exit_tx, exits) = channel::unbounded();
        let mut workers = Vec::with_capacity(threads);

        for index in 0..threads {
            let name = format!("spinner-{}", index);
            let state = Arc::new(AtomicU8::new(WorkerState::Created as u8));
            let body = spin_body(index, flag.clone(), state.clone(), exit_tx.clone());

            match spawn(name.clone(), body) {
                Ok(handle) => workers.push(WorkerHandle {
                    name,
                    state,
                    thread: Some(handle),
                }),
                Err(err) => {
                    flag.stop();
                    for worker in &mut workers {
                        if let Some(handle) = worker.thread.take() {
                            let _ = handle.join();
                        }
                    }
                    return Err(WorkloadError::startup(name, err).into());
                }
            }
        }

        info!(threads, "spin pool started");
        Ok(Self { flag, workers, exits })
    }

    /// A clone of the pool's stop signal, for triggering shutdown from elsewhere.
    pub fn signal(&self) -> SignalFlag {
        self.flag.clone()
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn running(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.state() != WorkerState::Terminated)
            .count()
    }

    /// Clear the flag and wait for every worker to exit, at most `timeout` in total.
    pub fn stop_and_join(mut self, timeout: Duration) -> Result<SpinSummary> {
        self.flag.stop();
        let started = self.workers.len();
        let deadline = Instant::now() + timeout;

        for _ in 0..started {
            match self.exits.recv_deadline(deadline) {
                Ok(index) => debug!(index, "spinner exited"),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(WorkloadError::timeout(format!("{} spin workers to exit", self.running()), timeout).into());
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut terminated = 0;
        for worker in &mut self.workers {
            if let Some(handle) = worker.thread.take() {
                handle
                    .join()
                    .map_err(|_| WorkloadError::WorkerFailed(format!("{} panicked", worker.name)))?;
                terminated += 1;
            }
        }

        info!(started, terminated, "spin pool stopped");
        Ok(SpinSummary { started, terminated })
    }
}

impl Drop for SpinPool {
    fn drop(&mut self) {
        self.flag.stop();
        for worker in &mut self.workers {
            if let Some(handle) = worker.thread.take() {
                let _ = handle.join();
            }
        }
    }
}

fn spin_body(
    index: usize,
    flag: SignalFlag,
    state: Arc<AtomicU8>,
    exit_tx: Sender<usize>,
) -> Box<dyn FnOnce() + Send + 'static> {
    Box::new(move || {
        state.store(WorkerState::Running as u8, Ordering::Release);
        spin_until_stopped(&flag);
        state.store(WorkerState::Terminated as u8, Ordering::Release);
        let _ = exit_tx.send(index);
    })
}

#[inline(never)]
fn spin_until_stopped(flag: &SignalFlag) {
    while flag.is_running() {}
}
