use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use stressgen_core::RunReport;
use stressgen_core::stack::StackReport;

/// Human-readable run diagnostics. Not a stable format.
pub(crate) fn print_run(run: &RunReport) {
    for worker in &run.contention.per_worker {
        println!("{}", worker.blocked_time.as_millis());
    }
    eprintln!("Count => {}", run.contention.blocked_count());

    println!(
        "Increments: {} across {} workers in {:?}",
        run.contention.total_increments, run.contention.workers, run.contention.elapsed
    );
    println!(
        "Allocations: {} iterations ({} buffers, {} strings), {} retained in {:?}",
        run.allocation.iterations,
        run.allocation.buffers,
        run.allocation.strings,
        run.allocation.retained,
        run.allocation.elapsed
    );
    if run.spin.started > 0 {
        println!("Spinners: {} started, {} joined", run.spin.started, run.spin.terminated);
    }
    if let Some(path) = &run.recording {
        println!("Recording written to {}", path.display());
    }
}

pub(crate) fn print_stack(stack: &StackReport) {
    eprintln!("{:.2}", stack.result);
    println!(
        "Stack: {} path, {} frame bytes, {} iterations in {:?}",
        stack.shape, stack.frame_bytes, stack.iterations, stack.elapsed
    );
}

pub(crate) fn write_json<T: Serialize>(report: &T, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("create report '{}'", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("write report '{}'", path.display()))?;
    Ok(())
}
