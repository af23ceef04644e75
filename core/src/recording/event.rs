use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::WorkloadError;

/// Category of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ThreadStart,
    ThreadEnd,
    /// A lock acquisition that had to block.
    MonitorEnter,
    /// A large buffer allocation from the allocation loop.
    Allocation,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::ThreadStart,
        EventKind::ThreadEnd,
        EventKind::MonitorEnter,
        EventKind::Allocation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::ThreadStart => "thread-start",
            EventKind::ThreadEnd => "thread-end",
            EventKind::MonitorEnter => "monitor-enter",
            EventKind::Allocation => "allocation",
        }
    }

    pub(crate) fn code(self) -> u8 {
        match self {
            EventKind::ThreadStart => 0,
            EventKind::ThreadEnd => 1,
            EventKind::MonitorEnter => 2,
            EventKind::Allocation => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        EventKind::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Only kinds with a meaningful duration are subject to the threshold filter.
    pub fn has_duration(self) -> bool {
        matches!(self, EventKind::MonitorEnter)
    }

    pub(crate) fn bit(self) -> u8 {
        1 << self.code()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = WorkloadError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| WorkloadError::config(format!("unknown event kind '{}'", trimmed)))
    }
}

/// Parse a comma separated list such as `monitor-enter,allocation`.
pub fn parse_event_list(raw: &str) -> Result<Vec<EventKind>, WorkloadError> {
    let mut kinds = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let kind = part.parse::<EventKind>()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err(WorkloadError::config("event list is empty"));
    }
    Ok(kinds)
}

/// Parse a threshold like `10ms`, `250us`, `500ns` or `1s`. A bare number means milliseconds.
pub fn parse_threshold(raw: &str) -> Result<Duration, WorkloadError> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| WorkloadError::config(format!("invalid threshold '{}'", trimmed)))?;

    match unit {
        "" | "ms" => Ok(Duration::from_millis(value)),
        "us" => Ok(Duration::from_micros(value)),
        "ns" => Ok(Duration::from_nanos(value)),
        "s" => Ok(Duration::from_secs(value)),
        other => Err(WorkloadError::config(format!("unknown threshold unit '{}'", other))),
    }
}

/// One captured event, timestamped relative to the start of its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub thread: String,
    pub start: Duration,
    pub duration: Duration,
}
