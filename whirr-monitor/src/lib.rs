//! System load monitoring for Whirr
//!
//! Produces a low-noise, slowly varying estimate of system-wide CPU
//! utilization:
//! - Ticks: per-core busy/idle counter sources (`/proc/stat` on Linux,
//!   sysinfo-backed elsewhere)
//! - Sampler: periodic delta computation, bounded moving average, and
//!   publication of the smoothed load to subscribers

mod sampler;
mod ticks;

pub use sampler::{LoadConfig, LoadSampler};
pub use ticks::{default_tick_source, logical_core_count, CpuTicks, TickError, TickSource};
