//! Boot sequence and end-of-run reporting.
//!
//! Builds the whole system on the simulated kernel: the shared resource, the
//! rate-monotonic set, the deferrable server, the sporadic generator and the
//! log drain, registers the traced tasks, runs for the configured number of
//! ticks and prints the reports.

use core::fmt::{self, Write};

use crate::config::{
    HarnessConfig, APERIODIC_PRIORITY, APERIODIC_TASK_ID, HIGH_PRIORITY, HIGH_TASK_ID,
    LOG_PRIORITY, LOW_PRIORITY, LOW_TASK_ID, MEDIUM_PRIORITY, MEDIUM_TASK_ID, MINIMAL_STACK_SIZE,
    SERVER_PRIORITY, SERVER_TASK_ID,
};
use crate::error::HarnessError;
use crate::port::{Priority, Tick};
use crate::registry::TaskRegistry;
use crate::report::{self, LogDrain};
use crate::scheduler::{Kernel, KernelStats, TaskSpec};
use crate::server::{ServerStats, ServerTask, ServiceWindow};
use crate::sporadic::SporadicGenerator;
use crate::trace::{Counters, Tracer};
use crate::workload::PeriodicTask;

/// What a run left behind, for callers that want numbers rather than text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Summary {
    /// Tick count when the run stopped; at least the requested run length.
    pub ticks: Tick,
    pub counters: Counters,
    pub kernel: KernelStats,
    pub server: ServerStats,
    pub server_remaining: Tick,
    /// Requests still waiting at the server.
    pub pending: u32,
    /// Requests the generator produced.
    pub generated: u32,
    /// CSV rows the drain wrote.
    pub printed: u32,
    /// Records still in the log queue when the run stopped.
    pub queued: usize,
}

/// Boot, run `config.run_ticks` ticks, report to `console`.
pub fn run<W: Write>(console: &mut W, config: &HarnessConfig) -> Result<Summary, HarnessError> {
    let window = ServiceWindow::new();
    let mut server = ServerTask::new(&config.server, &window);
    let mut drain = LogDrain::new(&mut *console);
    // Bound after the kernel hands out the semaphore and the server handle,
    // but declared first so they outlive its borrows.
    let mut low: PeriodicTask;
    let mut medium: PeriodicTask;
    let mut high: PeriodicTask;
    let mut generator: SporadicGenerator;

    let mut kernel = Kernel::new(Tracer::new(&window));
    let resource = kernel.create_binary_semaphore(true)?;
    low = PeriodicTask::new(config.low, resource);
    medium = PeriodicTask::new(config.medium, resource);
    high = PeriodicTask::new(config.high, resource);

    let low_handle = kernel.spawn(&mut low, task_spec("Low", LOW_PRIORITY, 1))?;
    let medium_handle = kernel.spawn(&mut medium, task_spec("Med", MEDIUM_PRIORITY, 2))?;
    let high_handle = kernel.spawn(&mut high, task_spec("High", HIGH_PRIORITY, 4))?;
    let server_handle = kernel.spawn(&mut server, task_spec("DeferrableServer", SERVER_PRIORITY, 1))?;
    generator = SporadicGenerator::new(&config.sporadic, server_handle);
    let aperiodic_handle = kernel.spawn(&mut generator, task_spec("Aperiodic", APERIODIC_PRIORITY, 1))?;
    // Not registered: tracing the drain would feed its own queue.
    kernel.spawn(&mut drain, task_spec("RMS Log Switch Task", LOG_PRIORITY, 2))?;

    let tracer = kernel.hooks_mut();
    tracer.register(LOW_TASK_ID, "Low", low_handle)?;
    tracer.register(MEDIUM_TASK_ID, "Med", medium_handle)?;
    tracer.register(HIGH_TASK_ID, "High", high_handle)?;
    tracer.register(APERIODIC_TASK_ID, "Aperiodic", aperiodic_handle)?;
    tracer.register(SERVER_TASK_ID, "DeferrableServer", server_handle)?;

    for source in config.interrupts {
        kernel.add_interrupt(source)?;
    }
    kernel.start(config.timer_service_period)?;
    kernel.run(config.run_ticks);

    let ticks = kernel.tick_count();
    let kernel_stats = kernel.stats();
    let pending = kernel.pending_notifications(server_handle);
    let queued = kernel.queued_logs();
    let tracer = kernel.into_hooks();

    let summary = Summary {
        ticks,
        counters: *tracer.counters(),
        kernel: kernel_stats,
        server: server.server().stats(),
        server_remaining: server.server().remaining_budget(),
        pending,
        generated: generator.generated(),
        printed: drain.printed(),
        queued,
    };
    log::info!(
        "run stopped at tick {}: {} rows printed, {} queued, {} dropped",
        ticks,
        summary.printed,
        queued,
        summary.counters.dropped_logs
    );

    let _ = write_reports(console, &summary, tracer.registry());
    Ok(summary)
}

fn task_spec(name: &str, priority: Priority, stack_words: usize) -> TaskSpec<'_> {
    TaskSpec {
        name,
        priority,
        stack_hint: MINIMAL_STACK_SIZE * stack_words,
    }
}

fn write_reports<W: Write>(out: &mut W, s: &Summary, registry: &TaskRegistry) -> fmt::Result {
    report::print_latency_overhead(out, s.ticks, &s.counters)?;
    report::print_task_counts(out, &s.counters)?;
    report::print_aperiodic_contribution(out, &s.counters)?;
    report::print_server_report(out, &s.server, s.pending, s.server_remaining)?;
    report::print_trace_loss(out, &s.counters)?;
    report::print_task_table(out, registry)
}
