//! CPU-bound call-path generator.
//!
//! Burns CPU in one leaf function reached through a known call path, so a sampler has
//! a predictable stack to attribute: directly from the entry point, through a chain of
//! recursive frames, or from a single oversized frame.

use std::fmt;
use std::hint::black_box;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::error::WorkloadError;

pub const STACK_THREAD_NAME: &str = "stack-generator";

/// Bytes reserved by each recursive frame of the deep path.
pub const DEEP_FRAME_BYTES: usize = 0x20000;
/// Bytes reserved by the entry frame of the deep path.
pub const DEEP_ENTRY_FRAME_BYTES: usize = 0x30000;
/// Bytes reserved by the single frame of the large path.
pub const LARGE_FRAME_BYTES: usize = 0x50000;
/// Recursion past this depth would need a stack far larger than any default.
pub const MAX_DEPTH: usize = 64;

const STACK_SLACK: usize = 1024 * 1024;

/// Which call path leads to the CPU task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StackShape {
    Leaf,
    Deep,
    Large,
}

impl StackShape {
    pub const ALL: [StackShape; 3] = [StackShape::Leaf, StackShape::Deep, StackShape::Large];

    pub fn name(self) -> &'static str {
        match self {
            StackShape::Leaf => "leaf",
            StackShape::Deep => "deep",
            StackShape::Large => "large",
        }
    }

    /// Stack bytes the path's own frames reserve for a given recursion depth.
    pub fn frame_bytes(self, depth: usize) -> usize {
        match self {
            StackShape::Leaf => 0,
            StackShape::Deep => DEEP_ENTRY_FRAME_BYTES + (depth + 1) * DEEP_FRAME_BYTES,
            StackShape::Large => LARGE_FRAME_BYTES,
        }
    }
}

impl fmt::Display for StackShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StackShape {
    type Err = WorkloadError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        StackShape::ALL
            .into_iter()
            .find(|shape| shape.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| WorkloadError::config(format!("unknown stack shape '{}'", trimmed)))
    }
}

#[derive(Debug, Clone)]
pub struct StackConfig {
    pub shape: StackShape,
    /// Loop iterations of the CPU task.
    pub iterations: u64,
    /// Recursive frames below the entry frame; only the deep path uses it.
    pub depth: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            shape: StackShape::Leaf,
            iterations: 100_000_000,
            depth: 6,
        }
    }
}

impl StackConfig {
    pub fn validate(&self) -> Result<(), WorkloadError> {
        if self.depth > MAX_DEPTH {
            return Err(WorkloadError::config(format!(
                "stack depth {} exceeds the maximum of {}",
                self.depth, MAX_DEPTH
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StackReport {
    pub shape: StackShape,
    pub depth: usize,
    pub frame_bytes: usize,
    pub iterations: u64,
    /// Accumulated value of the CPU task, kept so the work cannot be discarded.
    pub result: f64,
    pub elapsed: Duration,
}

pub struct StackGenerator {
    config: StackConfig,
}

impl StackGenerator {
    pub fn new(config: StackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Run the CPU task through the configured call path on a dedicated thread whose
    /// stack is sized for the path's frames.
    pub fn run(&self) -> Result<StackReport> {
        self.config.validate()?;
        let StackConfig {
            shape,
            iterations,
            depth,
        } = self.config;
        let frame_bytes = shape.frame_bytes(depth);

        info!(%shape, depth, iterations, frame_bytes, "stack workload started");
        let started = Instant::now();
        let handle = thread::Builder::new()
            .name(STACK_THREAD_NAME.into())
            .stack_size(frame_bytes * 2 + STACK_SLACK)
            .spawn(move || match shape {
                StackShape::Leaf => leaf_frame(iterations),
                StackShape::Deep => deep_frame(depth, iterations),
                StackShape::Large => large_frame(iterations),
            })
            .map_err(|e| WorkloadError::startup(STACK_THREAD_NAME, e))?;
        let result = handle
            .join()
            .map_err(|_| WorkloadError::WorkerFailed(format!("{} panicked", STACK_THREAD_NAME)))?;
        let elapsed = started.elapsed();

        info!(%shape, ?elapsed, "stack workload finished");
        Ok(StackReport {
            shape,
            depth,
            frame_bytes,
            iterations,
            result,
            elapsed,
        })
    }
}

#[inline(never)]
fn cpu_task(iterations: u64) -> f64 {
    let mut result = 0.0;
    for i in 1..=iterations {
        let x = black_box(i) as f64;
        let root = x.sqrt();
        result += root;
        result += x.powf(root);
    }
    result
}

#[inline(never)]
fn leaf_frame(iterations: u64) -> f64 {
    cpu_task(iterations)
}

#[inline(never)]
fn deep_frame(depth: usize, iterations: u64) -> f64 {
    let mut frame = [0u8; DEEP_ENTRY_FRAME_BYTES];
    black_box(&mut frame);
    let result = deep_stack(depth, iterations);
    black_box(&frame);
    result
}

#[inline(never)]
fn deep_stack(remaining: usize, iterations: u64) -> f64 {
    let mut frame = [0u8; DEEP_FRAME_BYTES];
    black_box(&mut frame);
    let result = if remaining == 0 {
        cpu_task(iterations)
    } else {
        deep_stack(remaining - 1, iterations)
    };
    // Touching the frame after the call keeps it live across the recursion.
    black_box(&frame);
    result
}

#[inline(never)]
fn large_frame(iterations: u64) -> f64 {
    let mut frame = [0u8; LARGE_FRAME_BYTES];
    black_box(&mut frame);
    let result = cpu_task(iterations);
    black_box(&frame);
    result
}
