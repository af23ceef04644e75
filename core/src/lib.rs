pub mod allocation;
pub mod contention;
pub mod error;
pub mod harness;
pub mod recording;
pub mod signal;
pub mod spin;
pub mod stack;

#[cfg(test)]
mod harness_test;
#[cfg(test)]
mod stack_test;

pub use error::WorkloadError;
pub use harness::{Harness, HarnessConfig, RunReport, StopTrigger};
pub use signal::SignalFlag;
