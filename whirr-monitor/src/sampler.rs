//! Load sampler - periodic CPU utilization smoothing and publication

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::ticks::{logical_core_count, CpuTicks, TickSource};

/// Sampling configuration.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Time between samples.
    pub period: Duration,
    /// Moving-average window length in samples.
    pub window: usize,
    /// Published load before the first successful sample.
    pub rest_load: f32,
    /// Capacity of each subscriber channel.
    pub channel_capacity: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(1500),
            window: 24,
            rest_load: 0.0,
            channel_capacity: 32,
        }
    }
}

/// State mutated on the sampling cadence, all under one lock so a sampling
/// cycle is atomic with respect to any other.
struct SampleState {
    source: Box<dyn TickSource>,
    prev: Option<Vec<CpuTicks>>,
    window: VecDeque<f32>,
}

/// Periodically samples CPU tick counters and publishes a smoothed load
/// in [0, 1] to subscribers.
///
/// A failed counter read skips the cycle and keeps the prior value; the
/// sampler keeps running.
pub struct LoadSampler {
    config: LoadConfig,
    cores: usize,
    state: Arc<Mutex<SampleState>>,
    current: Arc<Mutex<f32>>,
    subscribers: Arc<Mutex<Vec<Sender<f32>>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LoadSampler {
    pub fn new(source: Box<dyn TickSource>, config: LoadConfig) -> Self {
        let cores = logical_core_count();
        debug!(cores, period_ms = config.period.as_millis() as u64, "load sampler created");
        let rest = config.rest_load.clamp(0.0, 1.0);
        Self {
            config,
            cores,
            state: Arc::new(Mutex::new(SampleState {
                source,
                prev: None,
                window: VecDeque::new(),
            })),
            current: Arc::new(Mutex::new(rest)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Number of logical processors detected at construction.
    pub fn cores(&self) -> usize {
        self.cores
    }

    /// Last published smoothed load, or the resting value before the first
    /// successful sample.
    pub fn current_load(&self) -> f32 {
        *self.current.lock()
    }

    /// Register a subscriber. Each published value is delivered to every
    /// subscriber on that subscriber's own receiving thread.
    pub fn subscribe(&self) -> Receiver<f32> {
        let (tx, rx) = bounded(self.config.channel_capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Run one sampling cycle immediately. Used by the sampling thread and
    /// callable directly for deterministic testing.
    pub fn sample_now(&self) {
        Self::sample_cycle(
            &self.state,
            self.config.window,
            &self.current,
            &self.subscribers,
        );
    }

    /// Spawn the sampling thread: one immediate sample, then one per period.
    /// Idempotent while running.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        self.shutdown.store(false, Ordering::Relaxed);

        let state = self.state.clone();
        let current = self.current.clone();
        let subscribers = self.subscribers.clone();
        let shutdown = self.shutdown.clone();
        let window = self.config.window;
        let period = self.config.period;

        let handle = thread::Builder::new()
            .name("whirr-load".into())
            .spawn(move || {
                Self::sample_cycle(&state, window, &current, &subscribers);
                let ticker = crossbeam_channel::tick(period);
                while !shutdown.load(Ordering::Relaxed) {
                    match ticker.recv_timeout(Duration::from_millis(200)) {
                        Ok(_) => Self::sample_cycle(&state, window, &current, &subscribers),
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .expect("failed to spawn load sampling thread");
        self.handle = Some(handle);
    }

    /// Stop the sampling thread and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn sample_cycle(
        state: &Mutex<SampleState>,
        window: usize,
        current: &Mutex<f32>,
        subscribers: &Mutex<Vec<Sender<f32>>>,
    ) {
        // Counter read, delta, and window update happen under one lock.
        let smoothed = {
            let mut state = state.lock();
            let ticks = match state.source.read() {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "failed to read CPU counters, skipping cycle");
                    return;
                }
            };

            let ratio = cycle_ratio(state.prev.as_deref(), &ticks);
            state.prev = Some(ticks);

            if state.window.len() >= window {
                state.window.pop_front();
            }
            state.window.push_back(ratio);

            state.window.iter().sum::<f32>() / state.window.len() as f32
        };

        {
            let mut cur = current.lock();
            if *cur != smoothed {
                debug!(load = smoothed, "smoothed load updated");
            }
            *cur = smoothed;
        }

        subscribers.lock().retain(|tx| match tx.try_send(smoothed) {
            Ok(()) => true,
            // Slow subscriber: drop this value, keep the subscription.
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

impl Drop for LoadSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Mean per-core utilization for one cycle.
///
/// With a previous snapshot, each core's ratio comes from the counter delta;
/// the first cycle uses the absolute counters. A core whose total did not
/// move contributes zero rather than dividing by zero.
fn cycle_ratio(prev: Option<&[CpuTicks]>, ticks: &[CpuTicks]) -> f32 {
    let mut sum = 0.0f32;
    let mut cores = 0usize;

    match prev {
        Some(prev) => {
            for (p, c) in prev.iter().zip(ticks) {
                let busy = c.busy.saturating_sub(p.busy);
                let idle = c.idle.saturating_sub(p.idle);
                let total = busy + idle;
                if total > 0 {
                    sum += busy as f32 / total as f32;
                }
                cores += 1;
            }
        }
        None => {
            for c in ticks {
                let total = c.total();
                if total > 0 {
                    sum += c.busy as f32 / total as f32;
                }
                cores += 1;
            }
        }
    }

    if cores == 0 {
        0.0
    } else {
        sum / cores as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticks::TickError;

    /// Deterministic tick source replaying queued reads.
    struct FakeTicks {
        reads: VecDeque<Result<Vec<CpuTicks>, TickError>>,
    }

    impl FakeTicks {
        fn new(reads: Vec<Result<Vec<CpuTicks>, TickError>>) -> Self {
            Self {
                reads: reads.into(),
            }
        }
    }

    impl TickSource for FakeTicks {
        fn read(&mut self) -> Result<Vec<CpuTicks>, TickError> {
            self.reads.pop_front().unwrap_or(Err(TickError::NoCores))
        }
    }

    fn ticks(busy: u64, idle: u64) -> Vec<CpuTicks> {
        vec![CpuTicks { busy, idle }]
    }

    #[test]
    fn test_first_sample_uses_absolute_counters() {
        let source = FakeTicks::new(vec![Ok(ticks(100, 900))]);
        let sampler = LoadSampler::new(Box::new(source), LoadConfig::default());
        sampler.sample_now();
        assert!((sampler.current_load() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_smoothed_load_is_window_mean() {
        // Cumulative counters producing per-cycle ratios 0.1, 0.5, 0.9.
        let source = FakeTicks::new(vec![
            Ok(ticks(100, 900)),
            Ok(ticks(600, 1400)),
            Ok(ticks(1500, 1500)),
        ]);
        let sampler = LoadSampler::new(Box::new(source), LoadConfig::default());

        let rx = sampler.subscribe();
        sampler.sample_now();
        sampler.sample_now();
        sampler.sample_now();

        let published: Vec<f32> = rx.try_iter().collect();
        assert_eq!(published.len(), 3);
        assert!((published[0] - 0.1).abs() < 1e-6);
        assert!((published[1] - 0.3).abs() < 1e-6);
        assert!((published[2] - 0.5).abs() < 1e-6);
        assert!((sampler.current_load() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_window_evicts_oldest() {
        // Ratios: 0.0 then three 1.0 cycles, window of 3.
        let source = FakeTicks::new(vec![
            Ok(ticks(0, 1000)),
            Ok(ticks(1000, 1000)),
            Ok(ticks(2000, 1000)),
            Ok(ticks(3000, 1000)),
        ]);
        let config = LoadConfig {
            window: 3,
            ..LoadConfig::default()
        };
        let sampler = LoadSampler::new(Box::new(source), config);

        for _ in 0..4 {
            sampler.sample_now();
        }
        // The 0.0 cycle fell out of the window.
        assert_eq!(sampler.current_load(), 1.0);
    }

    #[test]
    fn test_failed_read_skips_cycle() {
        let source = FakeTicks::new(vec![
            Ok(ticks(500, 500)),
            Err(TickError::NoCores),
            Ok(ticks(1000, 1000)),
        ]);
        let sampler = LoadSampler::new(Box::new(source), LoadConfig::default());
        let rx = sampler.subscribe();

        sampler.sample_now();
        let before = sampler.current_load();
        sampler.sample_now();
        assert_eq!(sampler.current_load(), before);

        sampler.sample_now();
        // Only two values were ever published.
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_rest_load_before_first_sample() {
        let source = FakeTicks::new(vec![]);
        let config = LoadConfig {
            rest_load: 0.25,
            ..LoadConfig::default()
        };
        let sampler = LoadSampler::new(Box::new(source), config);
        assert_eq!(sampler.current_load(), 0.25);
    }

    #[test]
    fn test_load_stays_in_unit_interval() {
        // Counters that run backwards must not produce ratios outside [0, 1].
        let source = FakeTicks::new(vec![Ok(ticks(1000, 0)), Ok(ticks(900, 100))]);
        let sampler = LoadSampler::new(Box::new(source), LoadConfig::default());
        sampler.sample_now();
        sampler.sample_now();
        let load = sampler.current_load();
        assert!((0.0..=1.0).contains(&load));
    }

    #[test]
    fn test_multicore_ratio_is_mean_across_cores() {
        let cores = vec![
            CpuTicks { busy: 100, idle: 0 },
            CpuTicks { busy: 0, idle: 100 },
        ];
        assert!((cycle_ratio(None, &cores) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sampling_thread_publishes() {
        let source = FakeTicks::new(vec![
            Ok(ticks(100, 900)),
            Ok(ticks(600, 1400)),
            Ok(ticks(1500, 1500)),
        ]);
        let config = LoadConfig {
            period: Duration::from_millis(10),
            ..LoadConfig::default()
        };
        let mut sampler = LoadSampler::new(Box::new(source), config);
        let rx = sampler.subscribe();
        sampler.start();
        sampler.start(); // idempotent

        let first = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("no load published");
        assert!((first - 0.1).abs() < 1e-6);
        sampler.stop();
        sampler.stop();
    }
}
