//! Fixed run sequence shared by every driver mode.
//!
//! Order: start spinners → start recording → contention and allocation concurrently →
//! clear the signal flag → await contention → stop/dump recording → join spinners.

use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::allocation::{AllocationConfig, AllocationGenerator, AllocationReport};
use crate::contention::{ContentionConfig, ContentionGenerator, ContentionReport};
use crate::error::WorkloadError;
use crate::recording::{EventRecorder, NoopRecorder, Recorder, RecordingConfig};
use crate::signal::SignalFlag;
use crate::spin::{SpinPool, SpinSummary};

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Spin workers kept busy for the whole run. Zero disables them.
    pub spinners: usize,
    pub contention: ContentionConfig,
    pub allocation: AllocationConfig,
    /// `None` runs the same workload without a recording session.
    pub recording: Option<RecordingConfig>,
    pub join_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            spinners: 0,
            contention: ContentionConfig::default(),
            allocation: AllocationConfig::default(),
            recording: None,
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<(), WorkloadError> {
        if self.contention.workers == 0 {
            return Err(WorkloadError::config("contention needs at least one worker"));
        }
        if self.contention.timeout.is_zero() {
            return Err(WorkloadError::config("contention timeout must be positive"));
        }
        if let Some(recording) = &self.recording {
            if recording.events.is_empty() {
                return Err(WorkloadError::config("recording needs at least one event kind"));
            }
            if recording.destination.as_os_str().is_empty() {
                return Err(WorkloadError::config("recording destination is empty"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub spin: SpinSummary,
    pub contention: ContentionReport,
    pub allocation: AllocationReport,
    pub recording: Option<PathBuf>,
}

/// What ends a manually stopped run.
pub enum StopTrigger {
    /// One line, or end of input, from a control stream. The bytes need not be UTF-8.
    Input(Box<dyn BufRead + Send>),
    After(Duration),
}

impl StopTrigger {
    pub fn stdin() -> Self {
        StopTrigger::Input(Box::new(BufReader::new(io::stdin())))
    }

    pub fn wait(self) -> Result<()> {
        match self {
            StopTrigger::Input(mut reader) => {
                let mut line = Vec::new();
                reader.read_until(b'\n', &mut line).context("read stop trigger")?;
                Ok(())
            }
            StopTrigger::After(duration) => {
                thread::sleep(duration);
                Ok(())
            }
        }
    }
}

pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn run(&self) -> Result<RunReport> {
        let recorder: Arc<dyn Recorder> = match &self.config.recording {
            Some(recording) => Arc::new(EventRecorder::new(recording.clone()).context("create recording session")?),
            None => Arc::new(NoopRecorder),
        };
        self.run_with(recorder)
    }

    /// Run the full sequence against a caller-supplied recorder.
    pub fn run_with(&self, recorder: Arc<dyn Recorder>) -> Result<RunReport> {
        let pool = SpinPool::start(self.config.spinners).context("start spin workers")?;
        let signal = pool.signal();

        recorder.start().context("start recording")?;

        let phases = self.run_phases(&signal, Arc::clone(&recorder));
        let cleanup = finish_recording(recorder.as_ref());

        let (contention, allocation) = match phases {
            Ok(reports) => reports,
            Err(err) => {
                if let Err(cleanup_err) = cleanup {
                    warn!(error = %format!("{:#}", cleanup_err), "recording cleanup failed after a phase error");
                }
                if let Err(join_err) = pool.stop_and_join(self.config.join_timeout) {
                    warn!(error = %format!("{:#}", join_err), "spin workers did not stop after a phase error");
                }
                return Err(err);
            }
        };
        cleanup?;
        let spin = pool.stop_and_join(self.config.join_timeout)?;

        info!(
            spinners = spin.terminated,
            increments = contention.total_increments,
            allocations = allocation.iterations,
            "harness run finished"
        );
        Ok(RunReport {
            spin,
            contention,
            allocation,
            recording: recorder.destination().map(|p| p.to_path_buf()),
        })
    }

    fn run_phases(
        &self,
        signal: &SignalFlag,
        recorder: Arc<dyn Recorder>,
    ) -> Result<(ContentionReport, AllocationReport)> {
        let contention = ContentionGenerator::new(self.config.contention.clone());
        let mut allocation = AllocationGenerator::new(self.config.allocation.clone());

        thread::scope(|scope| -> Result<_> {
            let contention_recorder = Arc::clone(&recorder);
            let handle = thread::Builder::new()
                .name("contention-driver".into())
                .spawn_scoped(scope, move || contention.run(contention_recorder))
                .map_err(|e| WorkloadError::startup("contention driver", e))?;

            let allocation_report = allocation.run_for(recorder.as_ref());
            signal.stop();

            let contention_report = handle
                .join()
                .map_err(|_| WorkloadError::WorkerFailed("contention driver panicked".into()))?
                .context("contention phase")?;
            Ok((contention_report, allocation_report))
        })
    }
}

/// Stop the session and dump it to its destination, if it has one.
fn finish_recording(recorder: &dyn Recorder) -> Result<()> {
    recorder.stop().context("stop recording")?;
    if let Some(destination) = recorder.destination() {
        recorder
            .dump(destination)
            .with_context(|| format!("dump recording to '{}'", destination.display()))?;
    }
    Ok(())
}
