//! Contract between the tracing core and the fixed-priority kernel it runs under.
//!
//! The kernel drives the core through [`TraceHooks`] (one call per context
//! switch edge and per interrupt edge) and the core reads kernel state back
//! through [`KernelPort`]. Both sides run with the kernel's own exclusion held,
//! so neither trait takes a lock or blocks.

use core::num::NonZeroU8;

use crate::task::TaskState;
use crate::trace::LogRecord;

/// Kernel tick count. Wraps like a hardware tick counter; differences are
/// always taken with `wrapping_sub`.
pub type Tick = u32;

/// Fixed task priority. Larger is more urgent.
pub type Priority = u8;

/// Scheduler-assigned task handle. Never null.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(NonZeroU8);

impl TaskHandle {
    pub const fn new(raw: u8) -> Option<Self> {
        match NonZeroU8::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    pub const fn get(self) -> u8 {
        self.0.get()
    }
}

/// Returned by [`KernelPort::send_from_isr`] when the log queue has no room.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFull;

/// Kernel services readable from hook context.
pub trait KernelPort {
    fn tick_count(&self) -> Tick;

    /// Task owning the CPU, `None` while idle.
    fn current_task(&self) -> Option<TaskHandle>;

    fn priority_of(&self, task: TaskHandle) -> Priority;

    /// Scheduler view of the task, if the handle is known.
    fn state_of(&self, task: TaskHandle) -> Option<TaskState>;

    /// Kernel-internal tasks (timer service and the like) that must not show
    /// up in measurements.
    fn is_housekeeping(&self, task: TaskHandle) -> bool;

    /// Non-blocking push onto the log queue. `Ok(true)` means a receiver with
    /// a higher priority than the current task was woken.
    fn send_from_isr(&mut self, record: LogRecord) -> Result<bool, QueueFull>;

    /// Ask for a reschedule once the hook returns.
    fn yield_from_isr(&mut self);
}

/// Callbacks fired by the kernel. Each must return in bounded time without
/// blocking or allocating.
pub trait TraceHooks {
    fn task_switched_in<K: KernelPort>(&mut self, kernel: &mut K);
    fn task_switched_out<K: KernelPort>(&mut self, kernel: &mut K);
    fn isr_enter<K: KernelPort>(&mut self, kernel: &mut K);
    fn isr_exit<K: KernelPort>(&mut self, kernel: &mut K);
}

/// No tracing at all.
impl TraceHooks for () {
    fn task_switched_in<K: KernelPort>(&mut self, _kernel: &mut K) {}
    fn task_switched_out<K: KernelPort>(&mut self, _kernel: &mut K) {}
    fn isr_enter<K: KernelPort>(&mut self, _kernel: &mut K) {}
    fn isr_exit<K: KernelPort>(&mut self, _kernel: &mut K) {}
}
