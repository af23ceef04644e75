use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "stressgen_core=info,stressgen=info";

use anyhow::Context;
use clap::{Parser, Subcommand};
use stressgen_core::{
    Harness, HarnessConfig, StopTrigger,
    allocation::AllocationConfig,
    contention::ContentionConfig,
    recording::{EventKind, RecordingConfig, parse_event_list, parse_threshold},
    spin::SpinPool,
    stack::{StackConfig, StackGenerator, StackShape},
};

mod report;

#[derive(Debug, Parser)]
#[command(
    name = "stressgen",
    author,
    version,
    about = "Synthetic concurrency workloads for profiler testing",
    long_about = None
)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

/// Comma separated event kinds, validated at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EventList(Vec<EventKind>);

#[derive(Debug, Subcommand)]
enum Commands {
    /// Busy-spin THREADS threads until a line (or EOF) arrives on stdin.
    Spin {
        /// Number of spinning threads
        #[arg(value_name = "THREADS")]
        threads: usize,
        /// Stop after this many milliseconds instead of waiting for input
        #[arg(long)]
        duration_ms: Option<u64>,
        /// Upper bound on joining the spinners once stopped
        #[arg(long, default_value_t = 5_000)]
        join_timeout_ms: u64,
    },
    /// Run lock contention and allocation pressure concurrently, optionally recorded.
    Contend {
        /// Recording destination; omit to run without a recording session
        #[arg(value_name = "OUTPUT", value_parser = parse_sanitized_path)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        workers: usize,
        /// Increments per contention worker
        #[arg(long, default_value_t = 100_000)]
        iterations: u64,
        /// Length of the allocation loop
        #[arg(long, default_value_t = 1_000)]
        alloc_ms: u64,
        #[arg(long, default_value_t = 100_000)]
        retention_cap: usize,
        /// Bytes per discarded buffer
        #[arg(long, default_value_t = 64 * 1024)]
        chunk_size: usize,
        /// Upper bound on waiting for the contention workers
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
        /// Event kinds to record, e.g. `monitor-enter,allocation`
        #[arg(long, default_value = "monitor-enter", value_parser = parse_events)]
        events: EventList,
        /// Drop duration events shorter than this (`10ms`, `250us`, ...)
        #[arg(long, value_parser = parse_threshold_arg)]
        threshold: Option<Duration>,
        /// Spin threads kept busy for the whole run
        #[arg(long, default_value_t = 0)]
        spinners: usize,
        /// Write the run report as JSON
        #[arg(long, value_parser = parse_sanitized_path)]
        report: Option<PathBuf>,
    },
    /// Burn CPU through a known call path: `leaf`, `deep` or `large`.
    Stack {
        #[arg(value_name = "SHAPE")]
        shape: StackShape,
        /// Loop iterations of the CPU task
        #[arg(long, default_value_t = 100_000_000)]
        iterations: u64,
        /// Recursive frames below the entry frame of the deep path
        #[arg(long, default_value_t = 6)]
        depth: usize,
        /// Write the run report as JSON
        #[arg(long, value_parser = parse_sanitized_path)]
        report: Option<PathBuf>,
    },
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);
    if p.as_os_str().is_empty() {
        anyhow::bail!("Path must not be empty.");
    }

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn parse_events(raw: &str) -> Result<EventList, String> {
    parse_event_list(raw).map(EventList).map_err(|e| e.to_string())
}

fn parse_threshold_arg(raw: &str) -> Result<Duration, String> {
    parse_threshold(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("STRESSGEN_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr).with_thread_names(true);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn build_contend_config(command: &Commands) -> anyhow::Result<HarnessConfig> {
    let Commands::Contend {
        output,
        workers,
        iterations,
        alloc_ms,
        retention_cap,
        chunk_size,
        timeout_ms,
        events,
        threshold,
        spinners,
        ..
    } = command
    else {
        anyhow::bail!("not a contend command");
    };

    let recording = output.as_ref().map(|destination| {
        RecordingConfig::new(destination)
            .with_events(events.0.clone())
            .with_threshold(*threshold)
    });

    let config = HarnessConfig {
        spinners: *spinners,
        contention: ContentionConfig {
            workers: *workers,
            iterations: *iterations,
            timeout: Duration::from_millis(*timeout_ms),
        },
        allocation: AllocationConfig {
            duration: Duration::from_millis(*alloc_ms),
            chunk_size: *chunk_size,
            retention_cap: *retention_cap,
        },
        recording,
        ..HarnessConfig::default()
    };
    config.validate()?;
    Ok(config)
}

fn run_spin(threads: usize, duration_ms: Option<u64>, join_timeout_ms: u64) -> anyhow::Result<()> {
    let pool = SpinPool::start(threads)?;
    println!("Started {} spinning threads.", pool.len());

    let trigger = match duration_ms {
        Some(ms) => StopTrigger::After(Duration::from_millis(ms)),
        None => {
            println!("Press Enter to stop...");
            StopTrigger::stdin()
        }
    };
    io::stdout().flush().context("flush stdout")?;
    trigger.wait()?;

    let summary = pool.stop_and_join(Duration::from_millis(join_timeout_ms))?;
    println!("All threads stopped. ({} joined)", summary.terminated);
    Ok(())
}

fn run_contend(command: &Commands) -> anyhow::Result<()> {
    let config = build_contend_config(command)?;
    let report_path = match command {
        Commands::Contend { report, .. } => report.clone(),
        _ => None,
    };

    let harness = Harness::new(config)?;
    let run = harness.run()?;

    report::print_run(&run);
    if let Some(path) = report_path {
        report::write_json(&run, &path)?;
    }
    Ok(())
}

fn run_stack(config: StackConfig, report_path: Option<&Path>) -> anyhow::Result<()> {
    let stack = StackGenerator::new(config).run()?;
    report::print_stack(&stack);
    if let Some(path) = report_path {
        report::write_json(&stack, path)?;
    }
    Ok(())
}

fn main() {
    maybe_init_tracing();

    let CliArgs { command } = CliArgs::parse();
    let result = match &command {
        Commands::Spin {
            threads,
            duration_ms,
            join_timeout_ms,
        } => run_spin(*threads, *duration_ms, *join_timeout_ms),
        Commands::Contend { .. } => run_contend(&command),
        Commands::Stack {
            shape,
            iterations,
            depth,
            report,
        } => run_stack(
            StackConfig {
                shape: *shape,
                iterations: *iterations,
                depth: *depth,
            },
            report.as_deref(),
        ),
    };

    if let Err(err) = result {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
