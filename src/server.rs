//! Deferrable server for aperiodic work.
//!
//! The server reserves `budget` ticks of service per `period`. Each queued
//! request costs one fixed `quantum`; a request that does not fit waits for
//! the next replenishment instead of being dropped. Replenishment happens on
//! whole-period boundaries measured from an anchor, so a late server catches
//! up without drifting.
//!
//! ```text
//!            pending && budget >= quantum
//!   Idle ─────────────────────────────────▶ Serving ──┐
//!    ▲  ▲                                     │        │ quantum elapsed,
//!    │  └─────────────────────────────────────┘◀───────┘ budget -= quantum
//!    │
//!    │ period boundary (Replenishing: budget = full, instantaneous)
//!    │
//!   Exhausted ◀── pending && budget < quantum
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::ServerConfig;
use crate::port::Tick;
use crate::scheduler::{Api, BusyFor, Step, Syscall, Task};

/// Marks the interval during which the server is serving a request.
/// Shared with the tracer, which reads it from interrupt context.
#[derive(Debug, Default)]
pub struct ServiceWindow {
    active: AtomicBool,
}

impl ServiceWindow {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    pub fn open(&self) {
        self.active.store(true, Ordering::Release);
    }

    pub fn close(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerPhase {
    Idle,
    Serving,
    Exhausted,
}

/// Outcome of offering the server its pending work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Nothing pending.
    Idle,
    /// One request admitted; its quantum is charged on completion.
    Admitted,
    /// Work pending but the budget cannot cover a quantum.
    Exhausted,
}

/// A budget reset at a period boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Replenishment {
    /// Whole periods the anchor moved forward.
    pub periods: Tick,
    pub anchor: Tick,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub served: u32,
    /// Entries into `Exhausted`.
    pub exhaustions: u32,
    pub replenishments: u32,
}

pub struct DeferrableServer {
    budget: Tick,
    period: Tick,
    quantum: Tick,
    remaining: Tick,
    anchor: Tick,
    phase: ServerPhase,
    stats: ServerStats,
}

impl DeferrableServer {
    /// Full budget, anchored at `now`. Period and quantum are at least one
    /// tick.
    pub fn new(config: &ServerConfig, now: Tick) -> Self {
        Self {
            budget: config.budget,
            period: config.period.max(1),
            quantum: config.quantum.max(1),
            remaining: config.budget,
            anchor: now,
            phase: ServerPhase::Idle,
            stats: ServerStats::default(),
        }
    }

    pub fn phase(&self) -> ServerPhase {
        self.phase
    }

    pub fn remaining_budget(&self) -> Tick {
        self.remaining
    }

    pub fn full_budget(&self) -> Tick {
        self.budget
    }

    pub fn quantum(&self) -> Tick {
        self.quantum
    }

    pub fn anchor(&self) -> Tick {
        self.anchor
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Move the anchor to `now` without touching the budget.
    pub fn rebase(&mut self, now: Tick) {
        self.anchor = now;
    }

    /// Decide what to do with `pending` queued requests. Never called while
    /// a request is being served.
    pub fn admit(&mut self, pending: u32) -> Admission {
        debug_assert_ne!(self.phase, ServerPhase::Serving);
        if pending == 0 {
            self.phase = ServerPhase::Idle;
            return Admission::Idle;
        }
        if self.remaining >= self.quantum {
            self.phase = ServerPhase::Serving;
            return Admission::Admitted;
        }
        if self.phase != ServerPhase::Exhausted {
            self.stats.exhaustions += 1;
        }
        self.phase = ServerPhase::Exhausted;
        Admission::Exhausted
    }

    /// Finish the request admitted last and charge its quantum.
    pub fn complete(&mut self) {
        debug_assert_eq!(self.phase, ServerPhase::Serving);
        self.remaining = self.remaining.saturating_sub(self.quantum);
        self.stats.served += 1;
        self.phase = ServerPhase::Idle;
    }

    /// Replenish if at least one whole period has passed since the anchor.
    pub fn check_period(&mut self, now: Tick) -> Option<Replenishment> {
        let elapsed = now.wrapping_sub(self.anchor);
        if elapsed < self.period {
            return None;
        }
        let periods = elapsed / self.period;
        self.anchor = self.anchor.wrapping_add(periods * self.period);
        self.remaining = self.budget;
        if self.phase == ServerPhase::Exhausted {
            self.phase = ServerPhase::Idle;
        }
        self.stats.replenishments += 1;
        Some(Replenishment {
            periods,
            anchor: self.anchor,
        })
    }
}

#[derive(Clone, Copy, Debug)]
enum Cycle {
    Start,
    Dispatch,
    Serve(BusyFor),
}

/// Kernel task driving a [`DeferrableServer`] from its notification count.
///
/// Cycle: check the period, then serve pending requests one quantum at a time
/// while the budget lasts, then sleep `poll` ticks.
pub struct ServerTask<'w> {
    server: DeferrableServer,
    window: &'w ServiceWindow,
    poll: Tick,
    cycle: Cycle,
}

impl<'w> ServerTask<'w> {
    pub fn new(config: &ServerConfig, window: &'w ServiceWindow) -> Self {
        Self {
            server: DeferrableServer::new(config, 0),
            window,
            poll: config.poll,
            cycle: Cycle::Start,
        }
    }

    pub fn server(&self) -> &DeferrableServer {
        &self.server
    }
}

impl<H> Task<H> for ServerTask<'_> {
    fn step(&mut self, api: &mut Api<'_, H>) -> Step {
        let now = api.tick_count();
        match self.cycle {
            Cycle::Start => {
                // The first period starts when the task first runs.
                self.server.rebase(now);
                self.cycle = Cycle::Dispatch;
                Step::Continue
            }
            Cycle::Dispatch => {
                if let Some(r) = self.server.check_period(now) {
                    log::debug!("server replenished at {} ({} periods)", now, r.periods);
                }
                match self.server.admit(api.pending_notifications()) {
                    Admission::Admitted => {
                        api.notify_take_one();
                        self.window.open();
                        self.cycle = Cycle::Serve(BusyFor::new(self.server.quantum()));
                        Step::Continue
                    }
                    Admission::Exhausted => {
                        log::debug!(
                            "server exhausted at {}, {} pending",
                            now,
                            api.pending_notifications()
                        );
                        Step::Call(Syscall::Delay(self.poll))
                    }
                    Admission::Idle => Step::Call(Syscall::Delay(self.poll)),
                }
            }
            Cycle::Serve(mut busy) => {
                if !busy.poll(now) {
                    self.cycle = Cycle::Serve(busy);
                    return Step::Compute;
                }
                self.window.close();
                self.server.complete();
                self.cycle = Cycle::Dispatch;
                Step::Continue
            }
        }
    }
}
