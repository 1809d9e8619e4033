use heapless::String;

use crate::config::{
    APERIODIC_PRIORITY, HIGH_PRIORITY, LOW_PRIORITY, MAX_TASK_NAME_LEN, MEDIUM_PRIORITY,
};
use crate::port::{Priority, TaskHandle, Tick};

/// Task states as observed by the tracer.
/// Ready: runnable, waiting for the CPU. Running: owns the CPU.
/// Blocked: waiting on a delay, semaphore or queue. Suspended: not started,
/// also the state of a cleared registry slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
    #[default]
    Suspended,
}

/// Registry identity, always below `MAX_TASKS`. Only the registry mints these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u8);

impl TaskId {
    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index as u8)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dispatch-counter buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriorityClass {
    High,
    Medium,
    Low,
    Aperiodic,
}

impl PriorityClass {
    /// Exact-match classification; anything else (server, drain) is unclassed.
    pub const fn classify(priority: Priority) -> Option<Self> {
        match priority {
            HIGH_PRIORITY => Some(Self::High),
            MEDIUM_PRIORITY => Some(Self::Medium),
            LOW_PRIORITY => Some(Self::Low),
            APERIODIC_PRIORITY => Some(Self::Aperiodic),
            _ => None,
        }
    }
}

/// Per-task trace bookkeeping.
#[derive(Clone, Debug)]
pub struct TaskRecord {
    id: TaskId,
    name: String<MAX_TASK_NAME_LEN>,
    handle: TaskHandle,
    /// Tick of the most recent dispatch; `None` until first dispatched.
    pub last_switch_in: Option<Tick>,
    pub state: TaskState,
    pub switch_ins: u32,
    /// Sum of completed dispatch intervals.
    pub time_in_task: u64,
}

impl TaskRecord {
    pub(crate) fn new(id: TaskId, name: &str, handle: TaskHandle) -> Self {
        Self {
            id,
            name: truncated(name),
            handle,
            last_switch_in: None,
            state: TaskState::Suspended,
            switch_ins: 0,
            time_in_task: 0,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    /// Mark a dispatch at `now`. Returns the gap since the previous dispatch,
    /// or `None` on the first one.
    pub fn switch_in(&mut self, now: Tick) -> Option<Tick> {
        let gap = self.last_switch_in.map(|prev| now.wrapping_sub(prev));
        self.last_switch_in = Some(now);
        self.state = TaskState::Running;
        self.switch_ins = self.switch_ins.saturating_add(1);
        gap
    }

    /// Mark an undispatch at `now`, leaving the task in `state`.
    /// Returns `(timestamp_in, time spent)`. An undispatch never preceded by
    /// a dispatch counts as a zero-length interval at `now`.
    pub fn switch_out(&mut self, now: Tick, state: TaskState) -> (Tick, Tick) {
        let since = self.last_switch_in.unwrap_or(now);
        let spent = now.wrapping_sub(since);
        self.time_in_task += u64::from(spent);
        self.state = state;
        (since, spent)
    }
}

/// Copy `name` into a bounded string, cutting at a char boundary.
pub(crate) fn truncated(name: &str) -> String<MAX_TASK_NAME_LEN> {
    let mut out = String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
