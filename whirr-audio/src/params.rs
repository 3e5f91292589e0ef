//! Intensity-to-parameter mapping
//!
//! A presented intensity in (0, 1] maps linearly onto the two live audio
//! parameters: pitch shift in cents and output volume.

use std::time::Duration;

use whirr_anim::lerp;

/// Pitch shift at zero intensity, in cents.
pub const MIN_PITCH_CENTS: f32 = -800.0;
/// Pitch shift at full intensity, in cents.
pub const MAX_PITCH_CENTS: f32 = 140.0;

/// Output volume at zero intensity. Non-zero so the fan never goes fully
/// silent.
pub const MIN_VOLUME: f32 = 0.02;
/// Output volume at full intensity.
pub const MAX_VOLUME: f32 = 1.0;

/// Smallest accepted target intensity.
pub const MIN_INTENSITY: f32 = 0.001;

/// Intensity the engine presents before any load arrives.
pub const INITIAL_INTENSITY: f32 = 0.01;

/// Duration of the glide from one intensity to the next.
pub const GLIDE_DURATION: Duration = Duration::from_millis(800);

/// Pitch shift in cents for a presented intensity.
#[inline]
pub fn pitch_for(intensity: f32) -> f32 {
    lerp(intensity, MIN_PITCH_CENTS, MAX_PITCH_CENTS)
}

/// Output volume for a presented intensity.
#[inline]
pub fn volume_for(intensity: f32) -> f32 {
    lerp(intensity, MIN_VOLUME, MAX_VOLUME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_endpoints() {
        assert_eq!(pitch_for(1.0), 140.0);
        assert!((pitch_for(0.0) - -800.0).abs() < 1e-6);
    }

    #[test]
    fn test_volume_endpoints() {
        assert_eq!(volume_for(1.0), 1.0);
        assert!((volume_for(0.0) - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_mappings_strictly_increasing() {
        let mut prev_pitch = f32::NEG_INFINITY;
        let mut prev_volume = f32::NEG_INFINITY;
        for i in 1..=1000 {
            let v = i as f32 / 1000.0;
            let pitch = pitch_for(v);
            let volume = volume_for(v);
            assert!(pitch > prev_pitch);
            assert!(volume > prev_volume);
            prev_pitch = pitch;
            prev_volume = volume;
        }
    }
}
