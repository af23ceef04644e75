//! Lock-contention generator.
//!
//! A fixed pool of workers hammers one mutex-protected counter. The single shared lock
//! is what produces blocked time for the sampler to attribute; the value mixed into the
//! counter is irrelevant beyond defeating dead-code elimination.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::future::join_all;
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::WorkloadError;
use crate::recording::{EventKind, Recorder};

pub const WORKER_THREAD_NAME: &str = "cpu-intensive-increment";

/// Hash of the process environment, looked up once and folded into every increment.
static PROPERTY_SEED: Lazy<u64> = Lazy::new(|| {
    let mut vars: Vec<(String, String)> = std::env::vars().collect();
    vars.sort();
    let mut hasher = DefaultHasher::new();
    vars.hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    hasher.finish()
});

#[derive(Debug, Clone)]
pub struct ContentionConfig {
    pub workers: usize,
    pub iterations: u64,
    /// Upper bound on the wait for the whole pool.
    pub timeout: Duration,
}

impl Default for ContentionConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            iterations: 100_000,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Blocking observed by one worker while acquiring the shared lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerContention {
    pub worker: usize,
    pub increments: u64,
    pub blocked_count: u64,
    pub blocked_time: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentionReport {
    pub workers: usize,
    pub total_increments: u64,
    pub count: i64,
    pub elapsed: Duration,
    pub per_worker: Vec<WorkerContention>,
}

impl ContentionReport {
    pub fn blocked_count(&self) -> u64 {
        self.per_worker.iter().map(|w| w.blocked_count).sum()
    }

    pub fn blocked_time(&self) -> Duration {
        self.per_worker.iter().map(|w| w.blocked_time).sum()
    }
}

#[derive(Debug, Default)]
struct SharedRegion {
    count: i64,
    increments: u64,
}

pub struct ContentionGenerator {
    config: ContentionConfig,
}

impl ContentionGenerator {
    pub fn new(config: ContentionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContentionConfig {
        &self.config
    }

    /// Run every worker to completion, waiting at most `config.timeout`.
    ///
    /// On timeout the pool is shut down in the background and a
    /// [`WorkloadError::Timeout`] is returned. Workers already inside their loop cannot be
    /// interrupted: they keep running on detached threads until they reach `iterations`
    /// or the process exits.
    pub fn run(&self, recorder: Arc<dyn Recorder>) -> Result<ContentionReport> {
        let ContentionConfig {
            workers,
            iterations,
            timeout,
        } = self.config;
        if workers == 0 {
            return Err(WorkloadError::config("contention needs at least one worker").into());
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name(WORKER_THREAD_NAME)
            .enable_time()
            .build()
            .map_err(|e| WorkloadError::startup("contention pool", e))?;

        let seed = *PROPERTY_SEED;
        let region = Arc::new(Mutex::new(SharedRegion::default()));
        info!(workers, iterations, ?timeout, "contention phase started");
        let started = Instant::now();

        let outcome = runtime.block_on(async {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let region = Arc::clone(&region);
                    let recorder = Arc::clone(&recorder);
                    tokio::task::spawn_blocking(move || {
                        cpu_intensive_increment(worker, iterations, seed, &region, recorder.as_ref())
                    })
                })
                .collect();
            tokio::time::timeout(timeout, join_all(handles)).await
        });

        let joined = match outcome {
            Ok(joined) => joined,
            Err(_) => {
                runtime.shutdown_background();
                return Err(WorkloadError::timeout("contention workers", timeout).into());
            }
        };
        let elapsed = started.elapsed();

        let mut per_worker = Vec::with_capacity(workers);
        for result in joined {
            let stats = result.map_err(|e| WorkloadError::WorkerFailed(format!("contention task: {}", e)))??;
            per_worker.push(stats);
        }
        drop(runtime);

        let region = region
            .lock()
            .map_err(|_| WorkloadError::WorkerFailed("shared region poisoned".into()))?;
        let report = ContentionReport {
            workers,
            total_increments: region.increments,
            count: region.count,
            elapsed,
            per_worker,
        };
        info!(
            total_increments = report.total_increments,
            blocked_count = report.blocked_count(),
            ?elapsed,
            "contention phase finished"
        );
        Ok(report)
    }
}

#[inline(never)]
fn cpu_intensive_increment(
    worker: usize,
    iterations: u64,
    seed: u64,
    region: &Mutex<SharedRegion>,
    recorder: &dyn Recorder,
) -> Result<WorkerContention, WorkloadError> {
    let poisoned = || WorkloadError::WorkerFailed(format!("worker {} found the shared region poisoned", worker));
    let monitor_enter = recorder.accepts(EventKind::MonitorEnter);
    if recorder.accepts(EventKind::ThreadStart) {
        recorder.record(EventKind::ThreadStart, Instant::now(), Duration::ZERO);
    }

    let mut stats = WorkerContention {
        worker,
        ..WorkerContention::default()
    };

    for i in 0..iterations {
        let mut blocked = None;
        let mut guard = match region.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                let waited_from = Instant::now();
                let guard = region.lock().map_err(|_| poisoned())?;
                blocked = Some((waited_from, waited_from.elapsed()));
                guard
            }
            Err(TryLockError::Poisoned(_)) => return Err(poisoned()),
        };
        guard.count = guard.count.wrapping_add(mix(seed, i) as i64);
        guard.increments += 1;
        drop(guard);

        stats.increments += 1;
        if let Some((at, waited)) = blocked {
            stats.blocked_count += 1;
            stats.blocked_time += waited;
            if monitor_enter {
                recorder.record(EventKind::MonitorEnter, at, waited);
            }
        }
    }

    if recorder.accepts(EventKind::ThreadEnd) {
        recorder.record(EventKind::ThreadEnd, Instant::now(), Duration::ZERO);
    }
    debug!(
        worker,
        blocked_count = stats.blocked_count,
        blocked_time = ?stats.blocked_time,
        "contention worker finished"
    );
    Ok(stats)
}

/// A few rounds of splitmix64 over the seed and iteration index.
#[inline]
fn mix(seed: u64, iteration: u64) -> u64 {
    let mut z = seed ^ iteration.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    for _ in 0..8 {
        z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
    }
    z
}
