//! Compile-time configuration.
//!
//! One tick is one millisecond, so every duration below reads directly in ms.
//! The `*Config` structs default to these constants; tests build their own.

use crate::port::{Priority, Tick};
use crate::scheduler::InterruptSource;

/// Capacity of the task registry. Task identities live in `0..MAX_TASKS`.
pub const MAX_TASKS: usize = 10;

/// Longest task name kept by the registry; longer names are truncated.
pub const MAX_TASK_NAME_LEN: usize = 24;

/// Depth of the log queue between the trace hooks and the drain task.
pub const LOG_QUEUE_CAPACITY: usize = 50;

/// Deepest interrupt nesting the tracer keeps open intervals for.
pub const MAX_IRQ_NESTING: usize = 4;

/// Kernel object tables.
pub const MAX_SEMAPHORES: usize = 4;
pub const MAX_INTERRUPT_SOURCES: usize = 4;

/// Ticks an ISR burst may hold the CPU before skipped ticks stop being
/// replayed.
pub const MAX_ISR_CATCH_UP_TICKS: usize = 64;

/// Stack hint, in words, handed to task creation. Scaled per task at boot.
pub const MINIMAL_STACK_SIZE: usize = 128;

/// Upper bound on zero-time task steps the kernel runs inside one tick.
pub const MAX_STEPS_PER_TICK: usize = 32;

// ── Priorities ───────────────────────────────────────────────────────
// Strictly ordered; the periodic set is rate-monotonic (shorter period,
// higher priority) and sits above the aperiodic machinery.

pub const IDLE_PRIORITY: Priority = 0;
pub const LOG_PRIORITY: Priority = IDLE_PRIORITY;
pub const APERIODIC_PRIORITY: Priority = IDLE_PRIORITY + 1;
pub const SERVER_PRIORITY: Priority = IDLE_PRIORITY + 2;
pub const LOW_PRIORITY: Priority = IDLE_PRIORITY + 3;
pub const MEDIUM_PRIORITY: Priority = IDLE_PRIORITY + 4;
pub const HIGH_PRIORITY: Priority = IDLE_PRIORITY + 5;
pub const TIMER_SERVICE_PRIORITY: Priority = IDLE_PRIORITY + 6;

// ── Registry identities ──────────────────────────────────────────────

pub const LOW_TASK_ID: usize = 1;
pub const MEDIUM_TASK_ID: usize = 2;
pub const HIGH_TASK_ID: usize = 3;
pub const APERIODIC_TASK_ID: usize = 4;
pub const SERVER_TASK_ID: usize = 5;

// ── Periodic set: (burst, period, first release) ─────────────────────

pub const HIGH_COMPUTATION: Tick = 2;
pub const HIGH_PERIOD: Tick = 100;
pub const MEDIUM_COMPUTATION: Tick = 3;
pub const MEDIUM_PERIOD: Tick = 200;
pub const LOW_COMPUTATION: Tick = 5;
pub const LOW_PERIOD: Tick = 300;
// First releases land inside Low's first burst so the set contends for the
// resource from the start.
pub const HIGH_RELEASE_OFFSET: Tick = 1;
pub const MEDIUM_RELEASE_OFFSET: Tick = 2;
pub const LOW_RELEASE_OFFSET: Tick = 0;

// ── Deferrable server ────────────────────────────────────────────────

pub const SERVER_BUDGET: Tick = 50;
pub const SERVER_PERIOD: Tick = 100;
pub const SERVICE_QUANTUM: Tick = 10;
/// Sleep between server cycles.
pub const SERVER_POLL_TICKS: Tick = 10;

// ── Sporadic generator ───────────────────────────────────────────────

pub const APERIODIC_DELAY_MIN: Tick = 30;
pub const APERIODIC_DELAY_MAX: Tick = 100;
pub const APERIODIC_COMPUTATION_MIN: Tick = 1;
pub const APERIODIC_COMPUTATION_MAX: Tick = 7;
pub const RNG_SEED: u32 = 1;

// ── Kernel housekeeping and interrupts ───────────────────────────────

/// Wake-up period of the kernel's timer service task.
pub const TIMER_SERVICE_PERIOD: Tick = 250;

/// Peripheral timers of the reference board, as (period, phase, duration).
pub const TIMER0_IRQ: InterruptSource = InterruptSource::new(50, 7, 1);
pub const TIMER1_IRQ: InterruptSource = InterruptSource::new(75, 13, 2);

/// Two hyperperiods of the periodic set (LCM of 100, 200, 300 is 600).
pub const RUN_TICKS: Tick = 1200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Budget restored at every period boundary.
    pub budget: Tick,
    pub period: Tick,
    /// Budget charged per served request.
    pub quantum: Tick,
    pub poll: Tick,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            budget: SERVER_BUDGET,
            period: SERVER_PERIOD,
            quantum: SERVICE_QUANTUM,
            poll: SERVER_POLL_TICKS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SporadicConfig {
    pub seed: u32,
    /// Inclusive inter-arrival range.
    pub delay_min: Tick,
    pub delay_max: Tick,
    /// Inclusive service-length range.
    pub length_min: Tick,
    pub length_max: Tick,
}

impl Default for SporadicConfig {
    fn default() -> Self {
        Self {
            seed: RNG_SEED,
            delay_min: APERIODIC_DELAY_MIN,
            delay_max: APERIODIC_DELAY_MAX,
            length_min: APERIODIC_COMPUTATION_MIN,
            length_max: APERIODIC_COMPUTATION_MAX,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodicConfig {
    pub burst: Tick,
    pub period: Tick,
    /// Ticks from start to the first release.
    pub offset: Tick,
}

impl PeriodicConfig {
    pub const HIGH: Self = Self {
        burst: HIGH_COMPUTATION,
        period: HIGH_PERIOD,
        offset: HIGH_RELEASE_OFFSET,
    };
    pub const MEDIUM: Self = Self {
        burst: MEDIUM_COMPUTATION,
        period: MEDIUM_PERIOD,
        offset: MEDIUM_RELEASE_OFFSET,
    };
    pub const LOW: Self = Self {
        burst: LOW_COMPUTATION,
        period: LOW_PERIOD,
        offset: LOW_RELEASE_OFFSET,
    };
}

/// Everything `harness::run` needs to boot the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    pub server: ServerConfig,
    pub sporadic: SporadicConfig,
    pub high: PeriodicConfig,
    pub medium: PeriodicConfig,
    pub low: PeriodicConfig,
    pub interrupts: [InterruptSource; 2],
    pub timer_service_period: Tick,
    pub run_ticks: Tick,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sporadic: SporadicConfig::default(),
            high: PeriodicConfig::HIGH,
            medium: PeriodicConfig::MEDIUM,
            low: PeriodicConfig::LOW,
            interrupts: [TIMER0_IRQ, TIMER1_IRQ],
            timer_service_period: TIMER_SERVICE_PERIOD,
            run_ticks: RUN_TICKS,
        }
    }
}
