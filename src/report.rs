//! Console output: the CSV log drain and the end-of-run reports.
//!
//! Everything writes to a caller-supplied [`core::fmt::Write`]. Console write
//! errors are not fatal to the system and are swallowed by the drain.

use core::fmt::{self, Write};

use crate::port::Tick;
use crate::registry::TaskRegistry;
use crate::scheduler::{Api, Step, Syscall, Task};
use crate::server::ServerStats;
use crate::trace::{Counters, Tracer};

pub const CSV_HEADER: &str =
    "Task Name,Priority,Switched In (ticks), Switched Out (ticks), Spent In task(ticks)";

/// Fixed-point percentage in hundredths of a percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Percent(u32);

impl Percent {
    /// `part / whole × 100`, zero when `whole` is zero. Truncates.
    pub fn ratio(part: u64, whole: u64) -> Self {
        if whole == 0 {
            return Self(0);
        }
        let hundredths = part.saturating_mul(10_000) / whole;
        Self(u32::try_from(hundredths).unwrap_or(u32::MAX))
    }

    pub fn hundredths(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Lowest-priority task that empties the log queue onto the console, one
/// CSV row per record.
pub struct LogDrain<'c, W> {
    out: &'c mut W,
    header_written: bool,
    printed: u32,
}

impl<'c, W: Write> LogDrain<'c, W> {
    pub fn new(out: &'c mut W) -> Self {
        Self {
            out,
            header_written: false,
            printed: 0,
        }
    }

    /// Rows written so far, header excluded.
    pub fn printed(&self) -> u32 {
        self.printed
    }
}

impl<'w, W: Write> Task<Tracer<'w>> for LogDrain<'_, W> {
    fn step(&mut self, api: &mut Api<'_, Tracer<'w>>) -> Step {
        if !self.header_written {
            let _ = writeln!(self.out, "{}", CSV_HEADER);
            self.header_written = true;
        }
        let Some(rec) = api.receive() else {
            return Step::Call(Syscall::Receive);
        };
        let name = api.hooks().registry().name(rec.task).unwrap_or("?");
        let _ = writeln!(
            self.out,
            "\"{}\",{},{},{},{}",
            name, rec.priority, rec.timestamp_in, rec.timestamp_out, rec.duration
        );
        self.printed = self.printed.saturating_add(1);
        Step::Compute
    }
}

/// Latency figures at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyOverhead {
    pub system_time: u64,
    pub task_execution_time: u64,
    pub context_switch_time: u64,
    pub interrupt_time: u64,
    /// `(context switch + interrupt) / system time`.
    pub overhead: Percent,
}

impl LatencyOverhead {
    pub fn new(now: Tick, c: &Counters) -> Self {
        let system_time = u64::from(now);
        Self {
            system_time,
            task_execution_time: c.task_execution_time,
            context_switch_time: c.context_switch_time,
            interrupt_time: c.interrupt_time,
            overhead: Percent::ratio(c.context_switch_time + c.interrupt_time, system_time),
        }
    }
}

pub fn print_latency_overhead<W: Write>(out: &mut W, now: Tick, c: &Counters) -> fmt::Result {
    let l = LatencyOverhead::new(now, c);
    writeln!(out)?;
    writeln!(out, "==== Latency Overhead Report ====")?;
    writeln!(out, "Total System Time: {} ticks", l.system_time)?;
    writeln!(out, "Task Execution Time: {} ticks", l.task_execution_time)?;
    writeln!(out, "Context Switch Time: {} ticks", l.context_switch_time)?;
    writeln!(out, "Interrupt Time: {} ticks", l.interrupt_time)?;
    writeln!(out, "Latency Overhead: {}", l.overhead)
}

pub fn print_task_counts<W: Write>(out: &mut W, c: &Counters) -> fmt::Result {
    let d = &c.dispatch;
    writeln!(out)?;
    writeln!(out, "========= Task Counts =========")?;
    writeln!(out, "High Priority Tasks: {}", d.high)?;
    writeln!(out, "Medium Priority Tasks: {}", d.medium)?;
    writeln!(out, "Low Priority Tasks: {}", d.low)?;
    writeln!(out, "Aperiodic Tasks: {}", d.aperiodic)
}

/// Share of interrupt time that opened while the server was serving.
pub fn aperiodic_share(c: &Counters) -> Percent {
    Percent::ratio(c.server_interrupt_time, c.interrupt_time)
}

pub fn print_aperiodic_contribution<W: Write>(out: &mut W, c: &Counters) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "==== Aperiodic Interrupt Contribution ====")?;
    writeln!(out, "Total Interrupt Time: {} ticks", c.interrupt_time)?;
    writeln!(out, "Aperiodic Interrupt Time: {} ticks", c.server_interrupt_time)?;
    writeln!(out, "Deferred Server Interrupt Count: {}", c.server_interrupt_count)?;
    writeln!(out, "Aperiodic Interrupt Contribution: {}", aperiodic_share(c))
}

pub fn print_server_report<W: Write>(
    out: &mut W,
    stats: &ServerStats,
    pending: u32,
    remaining_budget: Tick,
) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "====== Deferrable Server ======")?;
    writeln!(out, "Requests Served: {}", stats.served)?;
    writeln!(out, "Requests Pending: {}", pending)?;
    writeln!(out, "Budget Exhaustions: {}", stats.exhaustions)?;
    writeln!(out, "Replenishments: {}", stats.replenishments)?;
    writeln!(out, "Remaining Budget: {} ticks", remaining_budget)
}

pub fn print_trace_loss<W: Write>(out: &mut W, c: &Counters) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "========= Trace Loss ==========")?;
    writeln!(out, "Switch-outs Traced: {}", c.dispatch_outs)?;
    writeln!(out, "Records Dropped: {}", c.dropped_logs)
}

pub fn print_task_table<W: Write>(out: &mut W, registry: &TaskRegistry) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "========== Task Table =========")?;
    writeln!(out, "Id,Name,Dispatches,Time In Task (ticks),Last State")?;
    for r in registry.iter() {
        writeln!(
            out,
            "{},\"{}\",{},{},{:?}",
            r.id().index(),
            r.name(),
            r.switch_ins,
            r.time_in_task,
            r.state
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LOG_PRIORITY;
    use crate::port::TaskHandle;
    use crate::scheduler::{Kernel, TaskSpec};
    use crate::server::ServiceWindow;

    #[test]
    fn test_percent_fixed_point() {
        assert_eq!(Percent::ratio(1, 3).to_string(), "33.33%");
        assert_eq!(Percent::ratio(3, 3).to_string(), "100.00%");
        assert_eq!(Percent::ratio(1, 200).to_string(), "0.50%");
        assert_eq!(Percent::ratio(5, 0), Percent::default());
    }

    #[test]
    fn test_latency_overhead() {
        let c = Counters {
            context_switch_time: 150,
            interrupt_time: 50,
            task_execution_time: 900,
            ..Counters::default()
        };
        let l = LatencyOverhead::new(1000, &c);
        assert_eq!(l.system_time, 1000);
        assert_eq!(l.overhead.hundredths(), 2000);

        let mut out = String::new();
        print_latency_overhead(&mut out, 1000, &c).unwrap();
        assert!(out.contains("Total System Time: 1000 ticks"));
        assert!(out.contains("Latency Overhead: 20.00%"));
    }

    #[test]
    fn test_aperiodic_share_zero_without_interrupts() {
        let c = Counters::default();
        assert_eq!(aperiodic_share(&c), Percent::default());
        let mut out = String::new();
        print_aperiodic_contribution(&mut out, &c).unwrap();
        assert!(out.contains("Aperiodic Interrupt Contribution: 0.00%"));
    }

    #[test]
    fn test_aperiodic_share() {
        let c = Counters {
            interrupt_time: 40,
            server_interrupt_time: 10,
            server_interrupt_count: 3,
            ..Counters::default()
        };
        assert_eq!(aperiodic_share(&c).to_string(), "25.00%");
    }

    #[test]
    fn test_task_counts_report() {
        let mut c = Counters::default();
        c.dispatch.high = 7;
        c.dispatch.aperiodic = 2;
        let mut out = String::new();
        print_task_counts(&mut out, &c).unwrap();
        assert!(out.contains("High Priority Tasks: 7"));
        assert!(out.contains("Medium Priority Tasks: 0"));
        assert!(out.contains("Aperiodic Tasks: 2"));
    }

    #[test]
    fn test_task_table_lists_registered() {
        let mut reg = TaskRegistry::new();
        reg.register(3, "High", TaskHandle::new(4).unwrap()).unwrap();
        reg.register(1, "Low", TaskHandle::new(2).unwrap()).unwrap();
        let mut out = String::new();
        print_task_table(&mut out, &reg).unwrap();
        let rows: Vec<&str> = out.lines().filter(|l| l.starts_with(char::is_numeric)).collect();
        assert_eq!(rows, ["1,\"Low\",0,0,Suspended", "3,\"High\",0,0,Suspended"]);
    }

    /// Zero-time body sleeping 3 ticks; every wake yields one record.
    struct Blinker;

    impl<H> Task<H> for Blinker {
        fn step(&mut self, _api: &mut Api<'_, H>) -> Step {
            Step::Call(Syscall::Delay(3))
        }
    }

    #[test]
    fn test_drain_prints_header_and_rows() {
        let window = ServiceWindow::new();
        let mut out = String::new();
        let mut blinker = Blinker;
        let printed;
        {
            let mut drain = LogDrain::new(&mut out);
            let mut kernel = Kernel::new(Tracer::new(&window));
            let h = kernel
                .spawn(&mut blinker, TaskSpec { name: "Blink", priority: 1, stack_hint: 0 })
                .unwrap();
            kernel
                .spawn(&mut drain, TaskSpec { name: "Log", priority: LOG_PRIORITY, stack_hint: 0 })
                .unwrap();
            kernel.hooks_mut().register(1, "Blink", h).unwrap();
            kernel.start(0).unwrap();
            kernel.run(10);
            assert_eq!(kernel.queued_logs(), 0);
            let tracer = kernel.into_hooks();
            assert_eq!(tracer.counters().dispatch_outs, 4);
            printed = drain.printed();
        }
        assert_eq!(printed, 4);
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(lines.next(), Some("\"Blink\",1,0,0,0"));
        assert_eq!(lines.next(), Some("\"Blink\",1,3,3,0"));
        assert_eq!(lines.count(), 2);
    }
}
