//! Interpolation and easing math

use std::f64::consts::FRAC_PI_2;

/// Linear interpolation between `min` and `max`.
///
/// `weight` is typically in 0.0..=1.0 but other values extrapolate.
#[inline]
pub fn lerp(weight: f32, min: f32, max: f32) -> f32 {
    min + weight * (max - min)
}

/// Inverse linear interpolation: the weighting of `value` between `min` and `max`.
#[inline]
pub fn ilerp(value: f32, min: f32, max: f32) -> f32 {
    (value - min) / (max - min)
}

/// Ease-in-out-sine curve in the classic `(t, b, c, d)` parameterization:
/// elapsed time, start value, total change, duration.
///
/// Yields `b` at `t = 0` and approaches `b + c` as `t` approaches `d`.
/// Monotonic in `t` over `0..=d` for either sign of `c`.
#[inline]
pub fn ease_in_out_sine(t: f64, b: f64, c: f64, d: f64) -> f64 {
    c * (t / d * FRAC_PI_2).sin() + b
}
