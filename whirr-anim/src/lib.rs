//! Value animation for Whirr - eased scalar transitions on a shared clock
//!
//! This module provides the glue between a discrete target signal and a
//! continuously varying presentation value:
//! - Easing: lerp/ilerp helpers and the ease-in-out-sine curve
//! - Scheduler: registry of in-flight animations, ticked as a group
//! - RefreshClock: thread-backed periodic driver (~60Hz) for the scheduler

mod animator;
mod clock;
mod easing;

pub use animator::{AnimationHandle, Scheduler};
pub use clock::RefreshClock;
pub use easing::{ease_in_out_sine, ilerp, lerp};
