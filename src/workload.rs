//! Rate-monotonic periodic task set.
//!
//! Three tasks at strictly ordered priorities share one binary semaphore.
//! Every cycle: take, burn a fixed burst, give, sleep until the next
//! release. Releases are anchored at start plus the task's offset, so a late
//! cycle does not push the later ones back. The contention produces the
//! preemption and blocking the tracer measures.

use crate::config::PeriodicConfig;
use crate::port::Tick;
use crate::scheduler::{Api, BusyFor, SemaphoreId, Step, Syscall, Task};

#[derive(Clone, Copy, Debug)]
enum Phase {
    /// Not yet released; anchors the release schedule.
    Start,
    Acquire,
    /// Inside the take; the next step runs with the resource held.
    Taking,
    Compute(BusyFor),
}

pub struct PeriodicTask {
    config: PeriodicConfig,
    resource: SemaphoreId,
    phase: Phase,
    next_release: Tick,
    cycles: u32,
}

impl PeriodicTask {
    pub fn new(config: PeriodicConfig, resource: SemaphoreId) -> Self {
        Self {
            config,
            resource,
            phase: Phase::Start,
            next_release: 0,
            cycles: 0,
        }
    }

    /// Completed take/compute/give cycles.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn holds_resource(&self) -> bool {
        matches!(self.phase, Phase::Compute(_))
    }
}

impl<H> Task<H> for PeriodicTask {
    fn step(&mut self, api: &mut Api<'_, H>) -> Step {
        match self.phase {
            Phase::Start => {
                self.next_release = api.tick_count().wrapping_add(self.config.offset);
                self.phase = Phase::Acquire;
                Step::Call(Syscall::DelayUntil(self.next_release))
            }
            Phase::Acquire => {
                self.phase = Phase::Taking;
                Step::Call(Syscall::Take(self.resource))
            }
            Phase::Taking => {
                self.phase = Phase::Compute(BusyFor::new(self.config.burst));
                Step::Continue
            }
            Phase::Compute(mut busy) => {
                debug_assert_eq!(api.semaphore_holder(self.resource), Some(api.current()));
                if !busy.poll(api.tick_count()) {
                    self.phase = Phase::Compute(busy);
                    return Step::Compute;
                }
                api.give(self.resource);
                self.cycles += 1;
                self.phase = Phase::Acquire;
                self.next_release = self.next_release.wrapping_add(self.config.period);
                Step::Call(Syscall::DelayUntil(self.next_release))
            }
        }
    }
}
