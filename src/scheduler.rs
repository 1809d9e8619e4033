/// Tick-driven fixed-priority preemptive kernel.
///
/// Every tick: run the SysTick interrupt, service due peripheral interrupts,
/// wake sleepers whose deadline has arrived, then give the CPU to the
/// highest-priority ready task for the rest of the tick. Tasks are state
/// machines; each [`Task::step`] either spends the tick computing, finishes
/// instantly, or calls a blocking kernel primitive. Every change of CPU owner
/// goes through the trace hooks, exactly as a real kernel's context switch
/// would.
///
/// This is the collaborator the tracing core is measured under, not a
/// general-purpose RTOS: no stacks, no time slicing between equal
/// priorities, no task deletion.
use heapless::{Deque, String, Vec};

use crate::config::{
    LOG_QUEUE_CAPACITY, MAX_INTERRUPT_SOURCES, MAX_ISR_CATCH_UP_TICKS, MAX_SEMAPHORES,
    MAX_STEPS_PER_TICK, MAX_TASKS, MAX_TASK_NAME_LEN, TIMER_SERVICE_PRIORITY,
};
use crate::error::KernelError;
use crate::port::{KernelPort, Priority, QueueFull, TaskHandle, Tick, TraceHooks};
use crate::task::{truncated, TaskState};
use crate::trace::LogRecord;

/// What a task did with its turn on the CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Busy for the rest of this tick.
    Compute,
    /// Took no time; step again.
    Continue,
    /// Enter a blocking primitive. The next step runs once it has completed.
    Call(Syscall),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Syscall {
    /// Sleep for this many ticks. Zero is a plain yield.
    Delay(Tick),
    /// Sleep until this tick; a deadline already reached returns at once.
    DelayUntil(Tick),
    /// Take a binary semaphore, waiting as long as it takes.
    Take(SemaphoreId),
    /// Wait until the log queue holds a record.
    Receive,
}

/// A schedulable body. `H` is the trace-hook type, readable through [`Api`].
pub trait Task<H> {
    fn step(&mut self, api: &mut Api<'_, H>) -> Step;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SemaphoreId(u8);

/// Creation parameters, as handed to `xTaskCreate`-style APIs.
#[derive(Clone, Copy, Debug)]
pub struct TaskSpec<'n> {
    pub name: &'n str,
    pub priority: Priority,
    /// Only reported at start; the simulation runs tasks on the caller's stack.
    pub stack_hint: usize,
}

/// Periodic peripheral interrupt occupying the CPU for `duration` ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterruptSource {
    pub period: Tick,
    pub phase: Tick,
    pub duration: Tick,
}

impl InterruptSource {
    pub const fn new(period: Tick, phase: Tick, duration: Tick) -> Self {
        Self { period, phase, duration }
    }

    fn due(&self, now: Tick) -> bool {
        self.period > 0 && now >= self.phase && (now - self.phase) % self.period == 0
    }
}

/// Wall-clock busy wait: done once `length` ticks have elapsed since the first
/// poll, whether or not the task was preempted in between.
#[derive(Clone, Copy, Debug)]
pub struct BusyFor {
    length: Tick,
    started: Option<Tick>,
}

impl BusyFor {
    pub const fn new(length: Tick) -> Self {
        Self { length, started: None }
    }

    pub fn poll(&mut self, now: Tick) -> bool {
        let start = *self.started.get_or_insert(now);
        now.wrapping_sub(start) >= self.length
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KernelStats {
    pub context_switches: u32,
    pub preemptions: u32,
    pub semaphore_blocks: u32,
    pub idle_ticks: u32,
    pub isr_yields: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Wait {
    Delay { until: Tick },
    Semaphore(SemaphoreId),
    Queue,
}

/// Who runs a slot: a caller-owned body or the kernel's own timer service.
enum Body<'a, H> {
    User(&'a mut dyn Task<H>),
    TimerService { period: Tick },
}

struct Tcb {
    handle: TaskHandle,
    name: String<MAX_TASK_NAME_LEN>,
    priority: Priority,
    state: TaskState,
    wait: Option<Wait>,
    notifications: u32,
    stack_hint: usize,
    housekeeping: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct BinarySemaphore {
    available: bool,
    holder: Option<usize>,
}

/// Kernel state visible to hooks and tasks.
pub struct KernelCore {
    tick: Tick,
    tasks: Vec<Tcb, MAX_TASKS>,
    current: Option<usize>,
    semaphores: Vec<BinarySemaphore, MAX_SEMAPHORES>,
    log_queue: Deque<LogRecord, LOG_QUEUE_CAPACITY>,
    interrupts: Vec<InterruptSource, MAX_INTERRUPT_SOURCES>,
    stats: KernelStats,
}

impl KernelCore {
    fn new() -> Self {
        Self {
            tick: 0,
            tasks: Vec::new(),
            current: None,
            semaphores: Vec::new(),
            log_queue: Deque::new(),
            interrupts: Vec::new(),
            stats: KernelStats::default(),
        }
    }

    fn index_of(&self, handle: TaskHandle) -> Option<usize> {
        let index = usize::from(handle.get()) - 1;
        (index < self.tasks.len()).then_some(index)
    }

    fn add_task(&mut self, spec: TaskSpec<'_>, housekeeping: bool) -> Result<TaskHandle, KernelError> {
        let index = self.tasks.len();
        let handle = u8::try_from(index + 1)
            .ok()
            .and_then(TaskHandle::new)
            .ok_or(KernelError::TaskTableFull)?;
        self.tasks
            .push(Tcb {
                handle,
                name: truncated(spec.name),
                priority: spec.priority,
                state: TaskState::Ready,
                wait: None,
                notifications: 0,
                stack_hint: spec.stack_hint,
                housekeeping,
            })
            .map_err(|_| KernelError::TaskTableFull)?;
        Ok(handle)
    }

    /// Highest-priority ready task. The current task keeps the CPU against
    /// equal priorities; otherwise the earliest created wins.
    fn select(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, t) in self.tasks.iter().enumerate() {
            let runnable = matches!(t.state, TaskState::Ready | TaskState::Running);
            if !runnable {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let bp = self.tasks[b].priority;
                    if t.priority > bp || (t.priority == bp && Some(i) == self.current) {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        best
    }

    fn wake_sleepers(&mut self) {
        let now = self.tick;
        for t in self.tasks.iter_mut() {
            if let Some(Wait::Delay { until }) = t.wait {
                // Signed distance so the comparison survives tick wrap.
                if now.wrapping_sub(until) as i32 >= 0 {
                    t.wait = None;
                    t.state = TaskState::Ready;
                }
            }
        }
    }

    /// Highest-priority task blocked on `wait`.
    fn top_waiter(&self, wait: Wait) -> Option<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.wait == Some(wait))
            .max_by(|(ia, a), (ib, b)| a.priority.cmp(&b.priority).then(ib.cmp(ia)))
            .map(|(i, _)| i)
    }

    fn unblock(&mut self, index: usize) {
        let t = &mut self.tasks[index];
        t.wait = None;
        t.state = TaskState::Ready;
    }

    fn block(&mut self, index: usize, wait: Wait) {
        let t = &mut self.tasks[index];
        t.wait = Some(wait);
        t.state = TaskState::Blocked;
    }

    fn give(&mut self, sem: SemaphoreId) -> bool {
        let Some(s) = self.semaphores.get(usize::from(sem.0)).copied() else {
            return false;
        };
        if s.available {
            return false;
        }
        // Ownership passes straight to the most urgent waiter.
        let next = self.top_waiter(Wait::Semaphore(sem));
        if let Some(w) = next {
            self.unblock(w);
        }
        let s = &mut self.semaphores[usize::from(sem.0)];
        s.holder = next;
        s.available = next.is_none();
        true
    }

    /// Returns `true` if the caller may continue at once.
    fn syscall(&mut self, index: usize, call: Syscall) -> bool {
        match call {
            Syscall::Delay(0) => true,
            Syscall::Delay(ticks) => {
                let until = self.tick.wrapping_add(ticks);
                self.block(index, Wait::Delay { until });
                false
            }
            Syscall::DelayUntil(until) if until.wrapping_sub(self.tick) as i32 <= 0 => true,
            Syscall::DelayUntil(until) => {
                self.block(index, Wait::Delay { until });
                false
            }
            Syscall::Take(sem) => match self.semaphores.get_mut(usize::from(sem.0)) {
                Some(s) if s.available => {
                    s.available = false;
                    s.holder = Some(index);
                    true
                }
                Some(_) => {
                    self.stats.semaphore_blocks += 1;
                    self.block(index, Wait::Semaphore(sem));
                    false
                }
                // Unknown semaphore: nothing will ever give it.
                None => {
                    self.block(index, Wait::Semaphore(sem));
                    false
                }
            },
            Syscall::Receive if !self.log_queue.is_empty() => true,
            Syscall::Receive => {
                self.block(index, Wait::Queue);
                false
            }
        }
    }
}

impl KernelPort for KernelCore {
    fn tick_count(&self) -> Tick {
        self.tick
    }

    fn current_task(&self) -> Option<TaskHandle> {
        self.current.map(|i| self.tasks[i].handle)
    }

    fn priority_of(&self, task: TaskHandle) -> Priority {
        self.index_of(task).map_or(0, |i| self.tasks[i].priority)
    }

    fn state_of(&self, task: TaskHandle) -> Option<TaskState> {
        self.index_of(task).map(|i| self.tasks[i].state)
    }

    fn is_housekeeping(&self, task: TaskHandle) -> bool {
        self.index_of(task).is_some_and(|i| self.tasks[i].housekeeping)
    }

    fn send_from_isr(&mut self, record: LogRecord) -> Result<bool, QueueFull> {
        self.log_queue.push_back(record).map_err(|_| QueueFull)?;
        let Some(receiver) = self.top_waiter(Wait::Queue) else {
            return Ok(false);
        };
        self.unblock(receiver);
        let current = self.current.map(|i| self.tasks[i].priority);
        Ok(current.map_or(true, |p| self.tasks[receiver].priority > p))
    }

    // The dispatch loop reschedules after every step, so a request only
    // needs counting.
    fn yield_from_isr(&mut self) {
        self.stats.isr_yields += 1;
    }
}

/// Kernel services available to a task while it steps.
pub struct Api<'k, H> {
    core: &'k mut KernelCore,
    hooks: &'k H,
    me: usize,
}

impl<'k, H> Api<'k, H> {
    pub fn tick_count(&self) -> Tick {
        self.core.tick
    }

    pub fn current(&self) -> TaskHandle {
        self.core.tasks[self.me].handle
    }

    pub fn priority(&self) -> Priority {
        self.core.tasks[self.me].priority
    }

    /// Takes effect at the next scheduling point.
    pub fn set_priority(&mut self, priority: Priority) {
        self.core.tasks[self.me].priority = priority;
    }

    /// Release a binary semaphore. `false` if it was already available.
    pub fn give(&mut self, sem: SemaphoreId) -> bool {
        self.core.give(sem)
    }

    pub fn semaphore_holder(&self, sem: SemaphoreId) -> Option<TaskHandle> {
        let s = self.core.semaphores.get(usize::from(sem.0))?;
        s.holder.map(|i| self.core.tasks[i].handle)
    }

    /// Add one to `task`'s notification count. Counts coalesce.
    pub fn notify_give(&mut self, task: TaskHandle) {
        if let Some(i) = self.core.index_of(task) {
            let t = &mut self.core.tasks[i];
            t.notifications = t.notifications.saturating_add(1);
        }
    }

    pub fn pending_notifications(&self) -> u32 {
        self.core.tasks[self.me].notifications
    }

    /// Consume one pending notification without blocking.
    pub fn notify_take_one(&mut self) -> bool {
        let n = &mut self.core.tasks[self.me].notifications;
        if *n == 0 {
            return false;
        }
        *n -= 1;
        true
    }

    /// Consume every pending notification, returning how many there were.
    pub fn notify_take_clear(&mut self) -> u32 {
        core::mem::take(&mut self.core.tasks[self.me].notifications)
    }

    pub fn receive(&mut self) -> Option<LogRecord> {
        self.core.log_queue.pop_front()
    }

    pub fn hooks(&self) -> &H {
        self.hooks
    }
}

pub struct Kernel<'a, H> {
    core: KernelCore,
    hooks: H,
    bodies: Vec<Body<'a, H>, MAX_TASKS>,
    started: bool,
}

impl<'a, H: TraceHooks> Kernel<'a, H> {
    pub fn new(hooks: H) -> Self {
        Self {
            core: KernelCore::new(),
            hooks,
            bodies: Vec::new(),
            started: false,
        }
    }

    pub fn spawn(
        &mut self,
        body: &'a mut dyn Task<H>,
        spec: TaskSpec<'_>,
    ) -> Result<TaskHandle, KernelError> {
        self.add(Body::User(body), spec, false)
    }

    fn add(&mut self, body: Body<'a, H>, spec: TaskSpec<'_>, housekeeping: bool) -> Result<TaskHandle, KernelError> {
        if self.bodies.is_full() {
            return Err(KernelError::TaskTableFull);
        }
        let handle = self.core.add_task(spec, housekeeping)?;
        self.bodies.push(body).map_err(|_| KernelError::TaskTableFull)?;
        Ok(handle)
    }

    pub fn create_binary_semaphore(&mut self, available: bool) -> Result<SemaphoreId, KernelError> {
        let id = u8::try_from(self.core.semaphores.len()).map_err(|_| KernelError::SemaphoreTableFull)?;
        self.core
            .semaphores
            .push(BinarySemaphore { available, holder: None })
            .map_err(|_| KernelError::SemaphoreTableFull)?;
        Ok(SemaphoreId(id))
    }

    pub fn add_interrupt(&mut self, source: InterruptSource) -> Result<(), KernelError> {
        self.core
            .interrupts
            .push(source)
            .map_err(|_| KernelError::InterruptTableFull)
    }

    /// Create the timer service task and open the scheduler. A zero period
    /// leaves the timer service out.
    pub fn start(&mut self, timer_service_period: Tick) -> Result<(), KernelError> {
        if self.started {
            return Err(KernelError::AlreadyStarted);
        }
        if timer_service_period > 0 {
            let spec = TaskSpec {
                name: "Tmr Svc",
                priority: TIMER_SERVICE_PRIORITY,
                stack_hint: 0,
            };
            self.add(Body::TimerService { period: timer_service_period }, spec, true)?;
        }
        self.started = true;
        let stack_words: usize = self.core.tasks.iter().map(|t| t.stack_hint).sum();
        log::info!(
            "kernel started: {} tasks ({} stack words), {} semaphores, {} interrupt sources",
            self.core.tasks.len(),
            stack_words,
            self.core.semaphores.len(),
            self.core.interrupts.len()
        );
        Ok(())
    }

    /// Run until `ticks` ticks have elapsed.
    pub fn run(&mut self, ticks: Tick) {
        let end = self.core.tick.wrapping_add(ticks);
        while end.wrapping_sub(self.core.tick) as i32 > 0 {
            self.tick_once();
        }
    }

    /// Advance one tick (more if a peripheral interrupt holds the CPU).
    pub fn tick_once(&mut self) {
        // SysTick: the count has already advanced when the hooks read it.
        self.hooks.isr_enter(&mut self.core);
        self.hooks.isr_exit(&mut self.core);

        self.service_interrupts();
        self.core.wake_sleepers();

        let mut computed = false;
        for _ in 0..MAX_STEPS_PER_TICK {
            self.reschedule();
            let Some(index) = self.core.current else {
                break;
            };
            match self.step(index) {
                Step::Compute => {
                    computed = true;
                    break;
                }
                Step::Continue => {}
                Step::Call(call) => {
                    self.core.syscall(index, call);
                }
            }
        }
        if !computed && self.core.current.is_none() {
            self.core.stats.idle_ticks += 1;
        }
        self.core.tick = self.core.tick.wrapping_add(1);
    }

    /// Run every peripheral interrupt due now. The ISR owns the CPU for its
    /// whole duration, so the clock moves while it runs; each tick it held
    /// the CPU through still gets its SysTick and its due sources, late.
    fn service_interrupts(&mut self) {
        let mut at = self.core.tick;
        for _ in 0..MAX_ISR_CATCH_UP_TICKS {
            for i in 0..self.core.interrupts.len() {
                let source = self.core.interrupts[i];
                if source.due(at) {
                    self.hooks.isr_enter(&mut self.core);
                    self.core.tick = self.core.tick.wrapping_add(source.duration);
                    self.hooks.isr_exit(&mut self.core);
                }
            }
            if at == self.core.tick {
                return;
            }
            at = at.wrapping_add(1);
            self.hooks.isr_enter(&mut self.core);
            self.hooks.isr_exit(&mut self.core);
        }
        log::warn!("interrupt storm: stopped replaying at tick {}", at);
    }

    fn step(&mut self, index: usize) -> Step {
        match &mut self.bodies[index] {
            Body::User(body) => {
                let mut api = Api {
                    core: &mut self.core,
                    hooks: &self.hooks,
                    me: index,
                };
                body.step(&mut api)
            }
            Body::TimerService { period } => Step::Call(Syscall::Delay(*period)),
        }
    }

    /// Hand the CPU to the best ready task, firing the switch hooks if the
    /// owner changes.
    fn reschedule(&mut self) {
        if self.core.select() == self.core.current {
            return;
        }
        if let Some(prev) = self.core.current {
            let t = &mut self.core.tasks[prev];
            if t.state == TaskState::Running {
                t.state = TaskState::Ready;
                self.core.stats.preemptions += 1;
            }
            self.hooks.task_switched_out(&mut self.core);
        }
        // The switch-out hook may have woken the queue receiver.
        let next = self.core.select();
        self.core.current = next;
        if let Some(n) = next {
            self.core.tasks[n].state = TaskState::Running;
            self.core.stats.context_switches += 1;
        }
        self.hooks.task_switched_in(&mut self.core);
    }

    pub fn tick_count(&self) -> Tick {
        self.core.tick
    }

    pub fn stats(&self) -> KernelStats {
        self.core.stats
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Tear down, handing back the hooks and releasing every task borrow.
    pub fn into_hooks(self) -> H {
        self.hooks
    }

    pub fn task_state(&self, task: TaskHandle) -> Option<TaskState> {
        self.core.state_of(task)
    }

    pub fn task_name(&self, task: TaskHandle) -> Option<&str> {
        self.core.index_of(task).map(|i| self.core.tasks[i].name.as_str())
    }

    pub fn current_task(&self) -> Option<TaskHandle> {
        self.core.current_task()
    }

    pub fn pending_notifications(&self, task: TaskHandle) -> u32 {
        self.core
            .index_of(task)
            .map_or(0, |i| self.core.tasks[i].notifications)
    }

    pub fn semaphore_holder(&self, sem: SemaphoreId) -> Option<TaskHandle> {
        let s = self.core.semaphores.get(usize::from(sem.0))?;
        s.holder.map(|i| self.core.tasks[i].handle)
    }

    pub fn queued_logs(&self) -> usize {
        self.core.log_queue.len()
    }
}
