use std::fmt;
use std::io;
use std::time::Duration;

/// Categorized failure raised by a workload or the recording lifecycle.
///
/// Library functions return `anyhow::Result`; this type sits at the root of the chain
/// whenever the caller may want to tell the categories apart.
#[derive(Debug)]
pub enum WorkloadError {
    /// Invalid configuration, detected before any worker starts.
    Config(String),
    /// A worker, pool or recording session could not be created.
    Startup { what: String, source: io::Error },
    /// A bounded wait elapsed before the awaited work completed.
    Timeout { what: String, waited: Duration },
    /// A worker panicked or was cancelled before finishing its loop.
    WorkerFailed(String),
    /// Illegal lifecycle transition or artifact I/O failure.
    Recording(String),
}

impl WorkloadError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn startup(what: impl Into<String>, source: io::Error) -> Self {
        Self::Startup {
            what: what.into(),
            source,
        }
    }

    pub fn timeout(what: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            waited,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl fmt::Display for WorkloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(message) => write!(f, "invalid configuration: {}", message),
            Self::Startup { what, source } => write!(f, "failed to start {}: {}", what, source),
            Self::Timeout { what, waited } => write!(f, "timed out after {:?} waiting for {}", waited, what),
            Self::WorkerFailed(message) => write!(f, "worker failed: {}", message),
            Self::Recording(message) => write!(f, "recording error: {}", message),
        }
    }
}

impl std::error::Error for WorkloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Startup { source, .. } => Some(source),
            _ => None,
        }
    }
}
