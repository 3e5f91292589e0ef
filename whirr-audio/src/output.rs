//! Output stage - smoothed volume and soft-clip ceiling

/// Final gain stage before the device.
///
/// The target volume is set from the intensity glide; per-sample one-pole
/// smoothing prevents clicks when the target moves between blocks.
pub struct OutputStage {
    /// Target output volume
    volume: f32,
    /// Smoothed volume (interpolates toward `volume`)
    smoothed_volume: f32,
}

impl OutputStage {
    /// Smoothing coefficient (~5ms at 48kHz)
    const VOLUME_SMOOTH_COEFF: f32 = 0.995;

    pub fn new(initial_volume: f32) -> Self {
        let volume = initial_volume.clamp(0.0, 1.0);
        Self {
            volume,
            smoothed_volume: volume,
        }
    }

    /// Set the target output volume (0.0 to 1.0).
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Apply gain in place over an interleaved stereo buffer.
    pub fn process(&mut self, buffer: &mut [f32]) {
        for frame in buffer.chunks_exact_mut(2) {
            self.smoothed_volume = Self::VOLUME_SMOOTH_COEFF * self.smoothed_volume
                + (1.0 - Self::VOLUME_SMOOTH_COEFF) * self.volume;

            frame[0] = soft_clip(frame[0] * self.smoothed_volume);
            frame[1] = soft_clip(frame[1] * self.smoothed_volume);
        }
    }
}

/// Level above which the clipper starts compressing.
const SOFT_CLIP_THRESHOLD: f32 = 0.75;
/// Absolute output ceiling.
const SOFT_CLIP_CEILING: f32 = 0.95;

/// Gentle soft clipper for the output bus.
///
/// Transparent below the threshold; peaks above it approach the ceiling
/// asymptotically instead of folding into harsh digital clipping.
#[inline(always)]
fn soft_clip(x: f32) -> f32 {
    let abs_x = x.abs();
    if abs_x <= SOFT_CLIP_THRESHOLD {
        return x;
    }

    let sign = x.signum();
    let knee_width = SOFT_CLIP_CEILING - SOFT_CLIP_THRESHOLD;
    let over = abs_x - SOFT_CLIP_THRESHOLD;
    let ratio = over / knee_width;

    let compressed = SOFT_CLIP_THRESHOLD + knee_width * (1.0 - (-ratio * 3.0).exp());
    sign * compressed.min(SOFT_CLIP_CEILING)
}
