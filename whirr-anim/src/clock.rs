//! Refresh clock - periodic driver for the animation scheduler
//!
//! Stands in for a display vsync callback: one thread ticks the scheduler at
//! a fixed cadence (~60Hz by default) while animations are in flight and
//! parks on the registry condvar while idle. One clock serves every
//! animation regardless of how many are active.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::Scheduler;

/// Thread-backed periodic driver for a [`Scheduler`].
pub struct RefreshClock {
    shutdown: Arc<AtomicBool>,
    scheduler: Scheduler,
    handle: Option<JoinHandle<()>>,
}

impl RefreshClock {
    /// Default tick interval, approximating a 60Hz display.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_micros(16_667);

    /// How long an idle clock sleeps between checks for shutdown.
    const IDLE_WAIT: Duration = Duration::from_millis(250);

    /// Spawn the clock thread at the default (~60Hz) cadence.
    pub fn spawn(scheduler: Scheduler) -> Self {
        Self::spawn_with_interval(scheduler, Self::DEFAULT_INTERVAL)
    }

    /// Spawn the clock thread with an explicit tick interval.
    pub fn spawn_with_interval(scheduler: Scheduler, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();
        let thread_scheduler = scheduler.clone();

        let handle = thread::Builder::new()
            .name("whirr-refresh".into())
            .spawn(move || {
                debug!(interval_us = interval.as_micros() as u64, "refresh clock running");
                while !thread_shutdown.load(Ordering::Relaxed) {
                    if !thread_scheduler.wait_for_work(Self::IDLE_WAIT) {
                        continue;
                    }
                    while thread_scheduler.active_count() > 0
                        && !thread_shutdown.load(Ordering::Relaxed)
                    {
                        thread_scheduler.advance(Instant::now());
                        thread::sleep(interval);
                    }
                }
            })
            .expect("failed to spawn refresh clock thread");

        Self {
            shutdown,
            scheduler,
            handle: Some(handle),
        }
    }

    /// Stop the clock thread and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.scheduler.notify();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RefreshClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc as StdArc;

    #[test]
    fn test_clock_drives_animation_to_target() {
        let scheduler = Scheduler::new();
        let mut clock =
            RefreshClock::spawn_with_interval(scheduler.clone(), Duration::from_millis(2));

        let values: StdArc<Mutex<Vec<f64>>> = StdArc::new(Mutex::new(Vec::new()));
        let sink = values.clone();
        scheduler.animate(0.0, 1.0, Duration::from_millis(50), move |v| {
            sink.lock().push(v)
        });

        // Generous wait: the animation self-terminates after its duration.
        let deadline = Instant::now() + Duration::from_secs(2);
        while scheduler.active_count() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        clock.stop();

        let values = values.lock();
        assert!(!values.is_empty());
        assert_eq!(*values.last().unwrap(), 1.0);
        assert!(values.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut clock = RefreshClock::spawn(Scheduler::new());
        clock.stop();
        clock.stop();
    }
}
