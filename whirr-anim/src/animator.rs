//! Animation scheduler - eased transitions ticked from a shared clock
//!
//! Every in-flight transition lives in one registry owned by the [`Scheduler`].
//! A single periodic driver (see [`crate::RefreshClock`]) calls
//! [`Scheduler::advance`] at display-refresh cadence and each registered
//! animation emits one eased value per tick until it reaches its target.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::easing::ease_in_out_sine;

type TickFn = Box<dyn FnMut(f64) + Send>;

/// A single eased transition between two scalar values.
struct Animation {
    id: u64,
    from: f64,
    to: f64,
    /// `to - from`, cached at registration
    change: f64,
    duration: Duration,
    /// Anchored on the first refresh tick, so that tick emits exactly `from`
    started_at: Option<Instant>,
    finished: bool,
    callback: TickFn,
}

impl Animation {
    /// Advance to `now`, invoking the callback with the new value.
    /// Returns true once the target has been emitted.
    fn tick(&mut self, now: Instant) -> bool {
        let started = *self.started_at.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started);

        let value = if elapsed < self.duration {
            ease_in_out_sine(
                elapsed.as_secs_f64(),
                self.from,
                self.change,
                self.duration.as_secs_f64(),
            )
        } else {
            self.from = self.to;
            self.finished = true;
            self.to
        };

        (self.callback)(value);
        self.finished
    }
}

#[derive(Default)]
struct Registry {
    animations: Vec<Animation>,
    next_id: u64,
}

struct Shared {
    registry: Mutex<Registry>,
    /// Signalled when a new animation arrives, so an idle clock can wake
    work_available: Condvar,
}

/// Cloneable handle over the animation registry.
///
/// `advance` ticks every active animation under the registry lock; a
/// cancellation takes the same lock, so once [`AnimationHandle::cancel`]
/// returns no further callback from that animation can execute.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                work_available: Condvar::new(),
            }),
        }
    }

    /// Register a transition from `from` to `to` over `duration`.
    ///
    /// The callback receives one eased value per refresh tick, ending with
    /// exactly `to`. A zero duration snaps immediately: the callback runs
    /// once with `to` and nothing is registered.
    ///
    /// Callbacks run with the registry lock held, which is what makes
    /// `AnimationHandle::cancel` take effect before the next tick. The lock
    /// is not reentrant, so a callback must not call back into the scheduler
    /// (`animate`, `advance`, `cancel`, `active_count`); deliver values to
    /// shared state and let the owner react outside the tick.
    pub fn animate(
        &self,
        from: f64,
        to: f64,
        duration: Duration,
        callback: impl FnMut(f64) + Send + 'static,
    ) -> AnimationHandle {
        let mut callback: TickFn = Box::new(callback);

        if duration.is_zero() {
            callback(to);
            return AnimationHandle {
                id: 0,
                shared: Weak::new(),
            };
        }

        let mut registry = self.shared.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.animations.push(Animation {
            id,
            from,
            to,
            change: to - from,
            duration,
            started_at: None,
            finished: false,
            callback,
        });
        self.shared.work_available.notify_all();

        AnimationHandle {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Tick all active animations at `now`, dropping the finished ones.
    pub fn advance(&self, now: Instant) {
        let mut registry = self.shared.registry.lock();
        registry.animations.retain_mut(|a| !a.tick(now));
    }

    /// Number of in-flight animations.
    pub fn active_count(&self) -> usize {
        self.shared.registry.lock().animations.len()
    }

    /// Block until at least one animation is registered, or the timeout
    /// elapses. Used by the refresh clock to park while idle.
    pub(crate) fn wait_for_work(&self, timeout: Duration) -> bool {
        let mut registry = self.shared.registry.lock();
        if !registry.animations.is_empty() {
            return true;
        }
        let _ = self
            .shared
            .work_available
            .wait_for(&mut registry, timeout);
        !registry.animations.is_empty()
    }

    /// Wake a parked clock (used on shutdown).
    pub(crate) fn notify(&self) {
        self.shared.work_available.notify_all();
    }
}

/// Handle for cancelling an in-flight animation.
///
/// Dropping the handle does not cancel; superseding logic must call
/// [`AnimationHandle::cancel`] explicitly.
pub struct AnimationHandle {
    id: u64,
    shared: Weak<Shared>,
}

impl AnimationHandle {
    /// Deregister the animation immediately. No further callbacks are
    /// delivered once this returns, even if a clock tick is already pending.
    pub fn cancel(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut registry = shared.registry.lock();
            registry.animations.retain(|a| a.id != self.id);
        }
    }

    /// Whether the animation is still registered.
    pub fn is_active(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared
                .registry
                .lock()
                .animations
                .iter()
                .any(|a| a.id == self.id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    fn collector() -> (StdArc<Mutex<Vec<f64>>>, impl FnMut(f64) + Send + 'static) {
        let values = StdArc::new(Mutex::new(Vec::new()));
        let sink = values.clone();
        (values, move |v| sink.lock().push(v))
    }

    #[test]
    fn test_first_tick_emits_from() {
        let scheduler = Scheduler::new();
        let (values, cb) = collector();
        scheduler.animate(0.1, 0.9, Duration::from_millis(800), cb);

        scheduler.advance(Instant::now());
        assert_eq!(values.lock().as_slice(), &[0.1]);
    }

    #[test]
    fn test_final_tick_emits_exact_target_and_deregisters() {
        let scheduler = Scheduler::new();
        let (values, cb) = collector();
        scheduler.animate(0.1, 0.9, Duration::from_millis(800), cb);

        let t0 = Instant::now();
        scheduler.advance(t0);
        scheduler.advance(t0 + Duration::from_millis(400));
        scheduler.advance(t0 + Duration::from_millis(800));
        assert_eq!(*values.lock().last().unwrap(), 0.9);
        assert_eq!(scheduler.active_count(), 0);

        // Further ticks deliver nothing.
        let count = values.lock().len();
        scheduler.advance(t0 + Duration::from_millis(900));
        assert_eq!(values.lock().len(), count);
    }

    #[test]
    fn test_values_monotonic_increasing() {
        let scheduler = Scheduler::new();
        let (values, cb) = collector();
        scheduler.animate(0.0, 1.0, Duration::from_millis(800), cb);

        let t0 = Instant::now();
        for ms in (0..=800).step_by(16) {
            scheduler.advance(t0 + Duration::from_millis(ms));
        }
        let values = values.lock();
        assert!(values.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(values[0], 0.0);
        assert_eq!(*values.last().unwrap(), 1.0);
    }

    #[test]
    fn test_values_monotonic_decreasing() {
        let scheduler = Scheduler::new();
        let (values, cb) = collector();
        scheduler.animate(0.9, 0.2, Duration::from_millis(800), cb);

        let t0 = Instant::now();
        for ms in (0..=800).step_by(16) {
            scheduler.advance(t0 + Duration::from_millis(ms));
        }
        let values = values.lock();
        assert!(values.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(*values.last().unwrap(), 0.2);
    }

    #[test]
    fn test_cancel_stops_callbacks() {
        let scheduler = Scheduler::new();
        let (values, cb) = collector();
        let handle = scheduler.animate(0.0, 1.0, Duration::from_millis(800), cb);

        let t0 = Instant::now();
        scheduler.advance(t0);
        assert!(handle.is_active());

        handle.cancel();
        assert!(!handle.is_active());
        assert_eq!(scheduler.active_count(), 0);

        let count = values.lock().len();
        scheduler.advance(t0 + Duration::from_millis(400));
        assert_eq!(values.lock().len(), count);
    }

    #[test]
    fn test_zero_duration_snaps_once() {
        let scheduler = Scheduler::new();
        let (values, cb) = collector();
        let handle = scheduler.animate(0.0, 0.7, Duration::ZERO, cb);

        assert_eq!(values.lock().as_slice(), &[0.7]);
        assert!(!handle.is_active());
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_concurrent_animations_tick_together() {
        let scheduler = Scheduler::new();
        let (a_values, a_cb) = collector();
        let (b_values, b_cb) = collector();
        scheduler.animate(0.0, 1.0, Duration::from_millis(800), a_cb);
        scheduler.animate(1.0, 0.0, Duration::from_millis(400), b_cb);
        assert_eq!(scheduler.active_count(), 2);

        let t0 = Instant::now();
        scheduler.advance(t0);
        scheduler.advance(t0 + Duration::from_millis(400));
        // The shorter animation finished on its second tick.
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(*b_values.lock().last().unwrap(), 0.0);
        assert_eq!(a_values.lock().len(), 2);
    }
}
