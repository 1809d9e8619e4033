//! Error types. Backpressure (server budget exhaustion, a full log queue) is
//! deliberately absent: those are normal operating conditions, not errors.

use core::fmt;

use crate::port::TaskHandle;
use crate::task::TaskId;

/// Misuse of [`TaskRegistry::register`](crate::registry::TaskRegistry::register).
/// Always a configuration bug.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryError {
    IdOutOfRange { id: usize },
    EmptyName,
    /// Identities are never reused.
    IdInUse(TaskId),
    HandleInUse(TaskHandle),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdOutOfRange { id } => write!(f, "task id {} out of range", id),
            Self::EmptyName => f.write_str("empty task name"),
            Self::IdInUse(id) => write!(f, "task id {} already registered", id.index()),
            Self::HandleInUse(h) => write!(f, "task handle {} already registered", h.get()),
        }
    }
}

/// Kernel object creation failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelError {
    TaskTableFull,
    SemaphoreTableFull,
    InterruptTableFull,
    AlreadyStarted,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::TaskTableFull => "task table full",
            Self::SemaphoreTableFull => "semaphore table full",
            Self::InterruptTableFull => "interrupt table full",
            Self::AlreadyStarted => "kernel already started",
        };
        f.write_str(msg)
    }
}

/// Boot failure. There is no degraded mode: the firmware halts on any of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarnessError {
    Registry(RegistryError),
    Kernel(KernelError),
}

impl From<RegistryError> for HarnessError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<KernelError> for HarnessError {
    fn from(e: KernelError) -> Self {
        Self::Kernel(e)
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "task registration failed: {}", e),
            Self::Kernel(e) => write!(f, "kernel init failed: {}", e),
        }
    }
}
