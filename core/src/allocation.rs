//! Allocation-pressure generator.
//!
//! Each iteration throws away either a large byte buffer or a formatted string, while a
//! capped retention buffer keeps growing alongside the churn.

use std::hint::black_box;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::recording::{EventKind, Recorder};

#[derive(Debug, Clone)]
pub struct AllocationConfig {
    pub duration: Duration,
    /// Size of each discarded byte buffer.
    pub chunk_size: usize,
    pub retention_cap: usize,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(1000),
            chunk_size: 64 * 1024,
            retention_cap: 100_000,
        }
    }
}

/// Bounded, append-only set of tiny buffers. Never shrinks while it lives.
#[derive(Debug)]
pub struct RetentionBuffer {
    items: Vec<Vec<u8>>,
    cap: usize,
}

impl RetentionBuffer {
    pub fn new(cap: usize) -> Self {
        Self { items: Vec::new(), cap }
    }

    /// Retain one 1-byte buffer unless the cap is reached.
    pub fn push_if_room(&mut self) -> bool {
        if self.items.len() >= self.cap {
            return false;
        }
        self.items.push(vec![0u8; 1]);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.cap
    }
}

/// Whatever the last iteration produced. Overwritten every iteration.
#[derive(Debug)]
enum Garbage {
    Bytes(Vec<u8>),
    Text(String),
}

impl Garbage {
    fn footprint(&self) -> usize {
        match self {
            Garbage::Bytes(bytes) => bytes.len(),
            Garbage::Text(text) => text.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllocationReport {
    pub iterations: u64,
    pub buffers: u64,
    pub strings: u64,
    /// Bytes handed to the sink and dropped on the next iteration.
    pub discarded_bytes: u64,
    pub retained: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct AllocationGenerator {
    config: AllocationConfig,
    retention: RetentionBuffer,
    sink: Option<Garbage>,
}

impl AllocationGenerator {
    pub fn new(config: AllocationConfig) -> Self {
        let retention = RetentionBuffer::new(config.retention_cap);
        Self {
            config,
            retention,
            sink: None,
        }
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    pub fn retention(&self) -> &RetentionBuffer {
        &self.retention
    }

    /// Churn allocations until `config.duration` has elapsed, checked once per iteration.
    pub fn run_for(&mut self, recorder: &dyn Recorder) -> AllocationReport {
        let duration = self.config.duration;
        let chunk_size = self.config.chunk_size;
        let mut rng = rand::rng();
        let mut report = AllocationReport::default();
        let record_allocations = recorder.accepts(EventKind::Allocation);
        info!(?duration, chunk_size, retention_cap = self.retention.cap(), "allocation phase started");

        let started = Instant::now();
        while started.elapsed() <= duration {
            if rng.random::<bool>() {
                let at = record_allocations.then(Instant::now);
                self.sink = Some(Garbage::Bytes(vec![0u8; chunk_size]));
                if let Some(at) = at {
                    recorder.record(EventKind::Allocation, at, Duration::ZERO);
                }
                report.buffers += 1;
            } else {
                let text = format!("some string: {}, some number: {}", Utc::now(), rng.random::<i32>());
                self.sink = Some(Garbage::Text(text));
                report.strings += 1;
            }
            if let Some(garbage) = black_box(&self.sink) {
                report.discarded_bytes += garbage.footprint() as u64;
            }

            self.retention.push_if_room();
            report.iterations += 1;
        }

        report.elapsed = started.elapsed();
        report.retained = self.retention.len();
        info!(
            iterations = report.iterations,
            retained = report.retained,
            elapsed = ?report.elapsed,
            "allocation phase finished"
        );
        report
    }
}
