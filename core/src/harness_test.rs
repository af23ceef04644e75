#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use anyhow::Result;

    use crate::allocation::AllocationConfig;
    use crate::contention::ContentionConfig;
    use crate::error::WorkloadError;
    use crate::harness::{Harness, HarnessConfig, StopTrigger};
    use crate::recording::{EventKind, NoopRecorder, Recorder, Recording, RecordingConfig, SessionState};

    fn quick_config() -> HarnessConfig {
        HarnessConfig {
            spinners: 2,
            contention: ContentionConfig {
                workers: 4,
                iterations: 10_000,
                timeout: Duration::from_secs(60),
            },
            allocation: AllocationConfig {
                duration: Duration::from_millis(50),
                chunk_size: 4 * 1024,
                retention_cap: 1_000,
            },
            recording: None,
            join_timeout: Duration::from_secs(5),
        }
    }

    /// Records the order in which lifecycle calls arrive.
    #[derive(Default)]
    struct CallLog {
        calls: Mutex<Vec<&'static str>>,
        fail_stop: bool,
    }

    impl CallLog {
        fn push(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Recorder for CallLog {
        fn start(&self) -> Result<()> {
            self.push("start");
            Ok(())
        }

        fn stop(&self) -> Result<()> {
            self.push("stop");
            if self.fail_stop {
                anyhow::bail!("session vanished");
            }
            Ok(())
        }

        fn dump(&self, _path: &Path) -> Result<()> {
            self.push("dump");
            Ok(())
        }

        fn destination(&self) -> Option<&Path> {
            Some(Path::new("log.sgrc"))
        }

        fn state(&self) -> SessionState {
            SessionState::Unstarted
        }

        fn accepts(&self, _kind: EventKind) -> bool {
            true
        }

        fn record(&self, kind: EventKind, _at: Instant, _duration: Duration) {
            if kind == EventKind::ThreadEnd {
                self.push("thread-end");
            }
        }
    }

    #[test]
    fn test_run_without_recording() {
        let report = Harness::new(quick_config()).unwrap().run().expect("run");
        assert_eq!(report.spin.started, 2);
        assert_eq!(report.spin.terminated, 2);
        assert_eq!(report.contention.total_increments, 40_000);
        assert!(report.allocation.retained <= 1_000);
        assert!(report.recording.is_none());
    }

    #[test]
    fn test_recording_brackets_both_phases() {
        let log = Arc::new(CallLog::default());
        Harness::new(quick_config())
            .unwrap()
            .run_with(log.clone())
            .expect("run");

        let calls = log.calls();
        assert_eq!(calls.first(), Some(&"start"));
        assert_eq!(&calls[calls.len() - 2..], ["stop", "dump"]);
        assert_eq!(calls.iter().filter(|c| **c == "thread-end").count(), 4);
    }

    #[test]
    fn test_recorded_run_writes_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let destination = dir.path().join("multi.sgrc");
        let mut config = quick_config();
        config.recording = Some(
            RecordingConfig::new(&destination).with_events(vec![EventKind::ThreadStart, EventKind::Allocation]),
        );

        let report = Harness::new(config).unwrap().run().expect("run");
        assert_eq!(report.recording.as_deref(), Some(destination.as_path()));

        let recording = Recording::read_from(&destination).expect("artifact");
        assert_eq!(recording.count(EventKind::ThreadStart), 4);
        assert_eq!(recording.count(EventKind::Allocation) as u64, report.allocation.buffers);
    }

    #[test]
    fn test_recording_does_not_change_workload_totals() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut recorded = quick_config();
        recorded.recording = Some(RecordingConfig::new(dir.path().join("r.sgrc")));

        let with = Harness::new(recorded).unwrap().run().expect("recorded run");
        let without = Harness::new(quick_config()).unwrap().run().expect("plain run");
        assert_eq!(with.contention.total_increments, without.contention.total_increments);
        assert_eq!(with.contention.count, without.contention.count);
        assert_eq!(with.allocation.retained, without.allocation.retained);
    }

    #[test]
    fn test_cleanup_runs_after_phase_timeout() {
        let log = Arc::new(CallLog::default());
        let mut config = quick_config();
        config.contention = ContentionConfig {
            workers: 2,
            iterations: 2_000_000,
            timeout: Duration::from_millis(1),
        };

        let err = Harness::new(config).unwrap().run_with(log.clone()).expect_err("timeout");
        let root = err.root_cause().downcast_ref::<WorkloadError>().expect("categorized");
        assert!(root.is_timeout());
        assert_eq!(&log.calls()[log.calls().len() - 2..], ["stop", "dump"]);
    }

    #[test]
    fn test_cleanup_failure_does_not_mask_phase_error() {
        let log = Arc::new(CallLog {
            fail_stop: true,
            ..CallLog::default()
        });
        let mut config = quick_config();
        config.contention = ContentionConfig {
            workers: 2,
            iterations: 2_000_000,
            timeout: Duration::from_millis(1),
        };

        let err = Harness::new(config).unwrap().run_with(log).expect_err("timeout");
        assert!(format!("{:#}", err).contains("timed out"));
    }

    #[test]
    fn test_cleanup_failure_fails_a_clean_run() {
        let log = Arc::new(CallLog {
            fail_stop: true,
            ..CallLog::default()
        });
        let err = Harness::new(quick_config()).unwrap().run_with(log).expect_err("stop fails");
        assert!(format!("{:#}", err).contains("session vanished"));
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let mut config = quick_config();
        config.contention.workers = 0;
        assert!(Harness::new(config).is_err());

        let mut config = quick_config();
        config.recording = Some(RecordingConfig::new("x.sgrc").with_events(Vec::new()));
        let err = Harness::new(config).err().expect("empty events");
        assert!(matches!(err.downcast_ref::<WorkloadError>(), Some(WorkloadError::Config(_))));
    }

    #[test]
    fn test_unwritable_destination_fails_before_workers_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = quick_config();
        config.allocation.duration = Duration::from_secs(3);
        config.recording = Some(RecordingConfig::new(dir.path().join("missing").join("out.sgrc")));

        let started = Instant::now();
        let err = Harness::new(config).unwrap().run().expect_err("destination cannot be created");
        assert!(started.elapsed() < Duration::from_secs(1), "no phase ran");
        assert!(
            err.chain()
                .any(|e| matches!(e.downcast_ref::<WorkloadError>(), Some(WorkloadError::Startup { .. })))
        );
        assert!(format!("{:#}", err).contains("create recording session"));
    }

    #[test]
    fn test_noop_run_reports_no_destination() {
        let report = Harness::new(quick_config())
            .unwrap()
            .run_with(Arc::new(NoopRecorder))
            .expect("run");
        assert!(report.recording.is_none());
    }

    #[test]
    fn test_stop_trigger_fires_on_line_and_eof() {
        StopTrigger::Input(Box::new(Cursor::new("\n"))).wait().expect("line");
        StopTrigger::Input(Box::new(Cursor::new(""))).wait().expect("eof");
        StopTrigger::Input(Box::new(Cursor::new(vec![0xff, 0xfe, b'\n'])))
            .wait()
            .expect("non-utf8 line");

        let started = Instant::now();
        StopTrigger::After(Duration::from_millis(20)).wait().expect("timer");
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
