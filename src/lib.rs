//! Rate-monotonic task set plus a deferrable server, traced at every context
//! switch and interrupt edge.
//!
//! Three periodic tasks share one binary semaphore, a sporadic generator
//! feeds a deferrable server with a fixed budget per period, and a trace
//! layer hooked into the kernel turns every dispatch interval into a log
//! record that a low-priority task prints as CSV. After the run, reports
//! summarize latency overhead, dispatch counts and the share of interrupt
//! time spent while the server was serving.
//!
//! The kernel is a tick-driven fixed-priority simulation (see [`scheduler`]),
//! so the whole system runs identically on the Cortex-M3 target and on the
//! host.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod harness;
pub mod port;
pub mod registry;
pub mod report;
pub mod rng;
pub mod scheduler;
pub mod server;
pub mod sporadic;
pub mod task;
pub mod trace;
pub mod workload;
