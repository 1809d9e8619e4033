//! Context-switch and interrupt tracing.
//!
//! [`Tracer`] is the [`TraceHooks`] implementation. It owns the task registry
//! and the global time accounting, and hands one [`LogRecord`] per
//! dispatch→undispatch interval to the kernel's log queue.
//!
//! Accounting:
//! - task execution time: sum of gaps between consecutive dispatches of the
//!   same task, an approximation of scheduler-visible time;
//! - context-switch time: sum of dispatch intervals, used as a latency proxy;
//! - interrupt time: sum of closed `isr_enter`..`isr_exit` intervals, with the
//!   share that opened while the deferrable server was serving kept apart.
//!
//! Hooks run inside the kernel's critical section. Nothing here blocks,
//! allocates or logs.

use heapless::Vec;

use crate::config::MAX_IRQ_NESTING;
use crate::error::RegistryError;
use crate::port::{KernelPort, Priority, QueueFull, TaskHandle, Tick, TraceHooks};
use crate::registry::TaskRegistry;
use crate::server::ServiceWindow;
use crate::task::{PriorityClass, TaskId, TaskRecord, TaskState};

/// Tag carried by every record, naming the edge that produced it.
pub const SWITCH_OUT_TAG: &str = "out";

/// One observed dispatch interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub task: TaskId,
    pub priority: Priority,
    pub timestamp_in: Tick,
    pub timestamp_out: Tick,
    /// `timestamp_out - timestamp_in`.
    pub duration: Tick,
    pub tag: &'static str,
}

/// Dispatch-outs per priority class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchCounts {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub aperiodic: u32,
}

impl DispatchCounts {
    pub fn record(&mut self, class: PriorityClass) {
        let slot = match class {
            PriorityClass::High => &mut self.high,
            PriorityClass::Medium => &mut self.medium,
            PriorityClass::Low => &mut self.low,
            PriorityClass::Aperiodic => &mut self.aperiodic,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn total(&self) -> u64 {
        u64::from(self.high) + u64::from(self.medium) + u64::from(self.low) + u64::from(self.aperiodic)
    }
}

/// Global accounting. Every field only ever grows during a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub task_execution_time: u64,
    pub context_switch_time: u64,
    pub interrupt_time: u64,
    pub interrupt_count: u32,
    pub server_interrupt_time: u64,
    pub server_interrupt_count: u32,
    pub dispatch: DispatchCounts,
    pub dispatch_outs: u32,
    pub dropped_logs: u32,
}

#[derive(Clone, Copy, Debug)]
struct OpenInterrupt {
    entered_at: Tick,
    server_active: bool,
}

pub struct Tracer<'w> {
    registry: TaskRegistry,
    counters: Counters,
    window: &'w ServiceWindow,
    open: Vec<OpenInterrupt, MAX_IRQ_NESTING>,
    /// Nesting levels past `MAX_IRQ_NESTING`; their intervals are not measured.
    overflow_depth: u32,
}

impl<'w> Tracer<'w> {
    pub fn new(window: &'w ServiceWindow) -> Self {
        Self {
            registry: TaskRegistry::new(),
            counters: Counters::default(),
            window,
            open: Vec::new(),
            overflow_depth: 0,
        }
    }

    pub fn register(
        &mut self,
        id: usize,
        name: &str,
        handle: TaskHandle,
    ) -> Result<TaskId, RegistryError> {
        self.registry.register(id, name, handle)
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Interrupt intervals currently open.
    pub fn open_interrupts(&self) -> usize {
        self.open.len() + self.overflow_depth as usize
    }
}

/// Registry slot of the running task, unless it is idle, housekeeping or
/// unregistered.
fn traced<'r, K: KernelPort>(
    registry: &'r mut TaskRegistry,
    kernel: &K,
) -> Option<(TaskHandle, &'r mut TaskRecord)> {
    let handle = kernel.current_task()?;
    if kernel.is_housekeeping(handle) {
        return None;
    }
    registry.record_for_mut(handle).map(|record| (handle, record))
}

impl TraceHooks for Tracer<'_> {
    fn task_switched_in<K: KernelPort>(&mut self, kernel: &mut K) {
        let now = kernel.tick_count();
        let Some((_, record)) = traced(&mut self.registry, kernel) else {
            return;
        };
        if let Some(gap) = record.switch_in(now) {
            self.counters.task_execution_time += u64::from(gap);
        }
    }

    fn task_switched_out<K: KernelPort>(&mut self, kernel: &mut K) {
        let now = kernel.tick_count();
        let Some((handle, record)) = traced(&mut self.registry, kernel) else {
            return;
        };
        let state = kernel.state_of(handle).unwrap_or(TaskState::Blocked);
        let (timestamp_in, spent) = record.switch_out(now, state);
        let task = record.id();
        let priority = kernel.priority_of(handle);

        self.counters.context_switch_time += u64::from(spent);
        if let Some(class) = PriorityClass::classify(priority) {
            self.counters.dispatch.record(class);
        }
        self.counters.dispatch_outs = self.counters.dispatch_outs.saturating_add(1);

        let record = LogRecord {
            task,
            priority,
            timestamp_in,
            timestamp_out: now,
            duration: spent,
            tag: SWITCH_OUT_TAG,
        };
        match kernel.send_from_isr(record) {
            Ok(true) => kernel.yield_from_isr(),
            Ok(false) => {}
            Err(QueueFull) => {
                self.counters.dropped_logs = self.counters.dropped_logs.saturating_add(1);
            }
        }
    }

    fn isr_enter<K: KernelPort>(&mut self, kernel: &mut K) {
        let frame = OpenInterrupt {
            entered_at: kernel.tick_count(),
            server_active: self.window.is_active(),
        };
        if self.open.push(frame).is_err() {
            self.overflow_depth += 1;
        }
    }

    fn isr_exit<K: KernelPort>(&mut self, kernel: &mut K) {
        if self.overflow_depth > 0 {
            self.overflow_depth -= 1;
            return;
        }
        // Unpaired exit: nothing open to close.
        let Some(frame) = self.open.pop() else {
            return;
        };
        let elapsed = u64::from(kernel.tick_count().wrapping_sub(frame.entered_at));
        let c = &mut self.counters;
        c.interrupt_time += elapsed;
        c.interrupt_count = c.interrupt_count.saturating_add(1);
        if frame.server_active {
            c.server_interrupt_time += elapsed;
            c.server_interrupt_count = c.server_interrupt_count.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HIGH_PRIORITY, LOG_QUEUE_CAPACITY, LOW_PRIORITY, SERVER_PRIORITY};
    use heapless::Deque;

    /// Minimal kernel double: a clock, a current task, a priority per handle
    /// and a bounded queue.
    struct FakeKernel {
        now: Tick,
        current: Option<TaskHandle>,
        priorities: [Priority; 8],
        housekeeping: Option<TaskHandle>,
        queue: Deque<LogRecord, LOG_QUEUE_CAPACITY>,
        wake_higher: bool,
        yields: u32,
    }

    impl FakeKernel {
        fn new() -> Self {
            Self {
                now: 0,
                current: None,
                priorities: [0; 8],
                housekeeping: None,
                queue: Deque::new(),
                wake_higher: false,
                yields: 0,
            }
        }
    }

    impl KernelPort for FakeKernel {
        fn tick_count(&self) -> Tick {
            self.now
        }
        fn current_task(&self) -> Option<TaskHandle> {
            self.current
        }
        fn priority_of(&self, task: TaskHandle) -> Priority {
            self.priorities[task.get() as usize]
        }
        fn state_of(&self, _task: TaskHandle) -> Option<TaskState> {
            None
        }
        fn is_housekeeping(&self, task: TaskHandle) -> bool {
            self.housekeeping == Some(task)
        }
        fn send_from_isr(&mut self, record: LogRecord) -> Result<bool, QueueFull> {
            self.queue.push_back(record).map_err(|_| QueueFull)?;
            Ok(self.wake_higher)
        }
        fn yield_from_isr(&mut self) {
            self.yields += 1;
        }
    }

    fn h(raw: u8) -> TaskHandle {
        TaskHandle::new(raw).unwrap()
    }

    fn setup(window: &ServiceWindow) -> (Tracer<'_>, FakeKernel) {
        let mut tracer = Tracer::new(window);
        tracer.register(3, "High", h(1)).unwrap();
        tracer.register(1, "Low", h(2)).unwrap();
        let mut kernel = FakeKernel::new();
        kernel.priorities[1] = HIGH_PRIORITY;
        kernel.priorities[2] = LOW_PRIORITY;
        (tracer, kernel)
    }

    fn dispatch(tracer: &mut Tracer<'_>, k: &mut FakeKernel, task: u8, from: Tick, to: Tick) {
        k.current = Some(h(task));
        k.now = from;
        tracer.task_switched_in(k);
        k.now = to;
        tracer.task_switched_out(k);
    }

    #[test]
    fn test_switch_out_emits_record() {
        let window = ServiceWindow::new();
        let (mut tracer, mut k) = setup(&window);
        dispatch(&mut tracer, &mut k, 1, 10, 14);

        let rec = k.queue.pop_front().unwrap();
        assert_eq!(rec.task.index(), 3);
        assert_eq!(rec.priority, HIGH_PRIORITY);
        assert_eq!((rec.timestamp_in, rec.timestamp_out, rec.duration), (10, 14, 4));
        assert_eq!(rec.tag, SWITCH_OUT_TAG);
        assert_eq!(tracer.counters().context_switch_time, 4);
        assert_eq!(tracer.counters().dispatch.high, 1);
        assert_eq!(tracer.registry().get(rec.task).unwrap().state, TaskState::Blocked);
    }

    #[test]
    fn test_execution_time_counts_gap_between_dispatches() {
        let window = ServiceWindow::new();
        let (mut tracer, mut k) = setup(&window);
        dispatch(&mut tracer, &mut k, 1, 5, 7);
        assert_eq!(tracer.counters().task_execution_time, 0);
        dispatch(&mut tracer, &mut k, 1, 105, 107);
        assert_eq!(tracer.counters().task_execution_time, 100);
    }

    #[test]
    fn test_idle_unregistered_and_housekeeping_ignored() {
        let window = ServiceWindow::new();
        let (mut tracer, mut k) = setup(&window);
        k.current = None;
        tracer.task_switched_in(&mut k);
        tracer.task_switched_out(&mut k);

        dispatch(&mut tracer, &mut k, 5, 0, 3);

        k.housekeeping = Some(h(1));
        dispatch(&mut tracer, &mut k, 1, 10, 12);

        assert!(k.queue.is_empty());
        assert_eq!(tracer.counters().dispatch_outs, 0);
        assert_eq!(tracer.counters().context_switch_time, 0);
    }

    #[test]
    fn test_unclassified_priority_logged_not_counted() {
        let window = ServiceWindow::new();
        let (mut tracer, mut k) = setup(&window);
        tracer.register(5, "Server", h(3)).unwrap();
        k.priorities[3] = SERVER_PRIORITY;
        dispatch(&mut tracer, &mut k, 3, 0, 10);
        assert_eq!(k.queue.len(), 1);
        assert_eq!(tracer.counters().dispatch.total(), 0);
        assert_eq!(tracer.counters().dispatch_outs, 1);
    }

    #[test]
    fn test_wake_of_higher_receiver_requests_yield() {
        let window = ServiceWindow::new();
        let (mut tracer, mut k) = setup(&window);
        k.wake_higher = true;
        dispatch(&mut tracer, &mut k, 2, 0, 1);
        assert_eq!(k.yields, 1);
    }

    #[test]
    fn test_queue_full_drops_record_but_counts() {
        let window = ServiceWindow::new();
        let (mut tracer, mut k) = setup(&window);
        for i in 0..LOG_QUEUE_CAPACITY as Tick {
            dispatch(&mut tracer, &mut k, 2, i * 10, i * 10 + 2);
        }
        assert!(k.queue.is_full());
        let before = *tracer.counters();

        dispatch(&mut tracer, &mut k, 2, 1000, 1003);

        let after = tracer.counters();
        assert_eq!(after.dropped_logs, 1);
        assert_eq!(after.dispatch_outs, before.dispatch_outs + 1);
        assert_eq!(after.context_switch_time, before.context_switch_time + 3);
        assert!(after.task_execution_time > before.task_execution_time);
        assert_eq!(k.queue.len(), LOG_QUEUE_CAPACITY);
        assert_eq!(
            k.queue.len() as u32,
            after.dispatch_outs - after.dropped_logs
        );
    }

    #[test]
    fn test_records_in_timestamp_order() {
        let window = ServiceWindow::new();
        let (mut tracer, mut k) = setup(&window);
        dispatch(&mut tracer, &mut k, 2, 0, 4);
        dispatch(&mut tracer, &mut k, 1, 4, 6);
        dispatch(&mut tracer, &mut k, 2, 6, 9);
        let outs: std::vec::Vec<Tick> = k.queue.iter().map(|r| r.timestamp_out).collect();
        assert!(outs.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_zero_length_interrupt_is_noop() {
        let window = ServiceWindow::new();
        let (mut tracer, mut k) = setup(&window);
        k.now = 42;
        tracer.isr_enter(&mut k);
        tracer.isr_exit(&mut k);
        assert_eq!(tracer.counters().interrupt_time, 0);
        assert_eq!(tracer.counters().interrupt_count, 1);
        assert_eq!(tracer.open_interrupts(), 0);
    }

    #[test]
    fn test_interrupt_interval_measured() {
        let window = ServiceWindow::new();
        let (mut tracer, mut k) = setup(&window);
        k.now = 10;
        tracer.isr_enter(&mut k);
        assert_eq!(tracer.open_interrupts(), 1);
        k.now = 13;
        tracer.isr_exit(&mut k);
        assert_eq!(tracer.counters().interrupt_time, 3);
        assert_eq!(tracer.counters().server_interrupt_time, 0);
    }

    #[test]
    fn test_interrupt_during_service_window_attributed() {
        let window = ServiceWindow::new();
        let (mut tracer, mut k) = setup(&window);
        window.open();
        k.now = 20;
        tracer.isr_enter(&mut k);
        window.close();
        k.now = 22;
        tracer.isr_exit(&mut k);

        k.now = 30;
        tracer.isr_enter(&mut k);
        k.now = 31;
        tracer.isr_exit(&mut k);

        let c = tracer.counters();
        assert_eq!(c.interrupt_time, 3);
        assert_eq!(c.server_interrupt_time, 2);
        assert_eq!(c.server_interrupt_count, 1);
    }

    #[test]
    fn test_nested_interrupts_and_unpaired_exit() {
        let window = ServiceWindow::new();
        let (mut tracer, mut k) = setup(&window);
        k.now = 0;
        tracer.isr_exit(&mut k);
        assert_eq!(tracer.counters().interrupt_count, 0);

        for _ in 0..MAX_IRQ_NESTING + 2 {
            tracer.isr_enter(&mut k);
        }
        k.now = 5;
        for _ in 0..MAX_IRQ_NESTING + 2 {
            tracer.isr_exit(&mut k);
        }
        assert_eq!(tracer.open_interrupts(), 0);
        assert_eq!(tracer.counters().interrupt_count, MAX_IRQ_NESTING as u32);
        assert_eq!(tracer.counters().interrupt_time, 5 * MAX_IRQ_NESTING as u64);
    }
}
