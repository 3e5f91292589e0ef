//! Fan voice - looping playback with pitch-shift via playback rate

use std::sync::Arc;

use crate::loop_buffer::LoopBuffer;

/// A single looping voice over the loop buffer.
///
/// Pitch shifting is implemented as a playback-rate change: `cents` maps to
/// a rate factor of `2^(cents/1200)`, compounded with the buffer-to-device
/// sample-rate ratio. The playhead wraps at the buffer end, so playback never
/// terminates on its own. Stopping keeps the playhead for a cheap resume.
pub struct FanVoice {
    /// Interleaved stereo samples
    samples: Arc<Vec<f32>>,
    buffer_rate: u32,
    output_rate: u32,
    /// Playhead in frames (fractional)
    position: f64,
    pitch_cents: f32,
    /// Frames advanced per output frame, cached from pitch and rates
    rate: f64,
    playing: bool,
}

impl FanVoice {
    pub fn new(buffer: &LoopBuffer, output_rate: u32) -> Self {
        let mut voice = Self {
            samples: buffer.samples().clone(),
            buffer_rate: buffer.sample_rate(),
            output_rate,
            position: 0.0,
            pitch_cents: 0.0,
            rate: 1.0,
            playing: false,
        };
        voice.update_rate();
        voice
    }

    /// Set the pitch shift in cents. Safe to call while rendering; takes
    /// effect on the next processed frame.
    pub fn set_pitch_cents(&mut self, cents: f32) {
        self.pitch_cents = cents;
        self.update_rate();
    }

    pub fn pitch_cents(&self) -> f32 {
        self.pitch_cents
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Halt output without resetting the playhead.
    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn update_rate(&mut self) {
        let pitch_factor = 2.0f64.powf(f64::from(self.pitch_cents) / 1200.0);
        self.rate = pitch_factor * f64::from(self.buffer_rate) / f64::from(self.output_rate);
    }

    /// Render interleaved stereo frames into `output`.
    ///
    /// Linear interpolation between neighbouring frames, wrapping at the
    /// loop boundary. Silence when stopped or when the buffer is empty.
    pub fn process(&mut self, output: &mut [f32]) {
        let frames = self.samples.len() / 2;
        if !self.playing || frames == 0 {
            output.fill(0.0);
            return;
        }

        for frame in output.chunks_exact_mut(2) {
            let idx = self.position as usize;
            let frac = (self.position - idx as f64) as f32;
            let next = (idx + 1) % frames;

            let l0 = self.samples[idx * 2];
            let r0 = self.samples[idx * 2 + 1];
            let l1 = self.samples[next * 2];
            let r1 = self.samples[next * 2 + 1];

            frame[0] = l0 + frac * (l1 - l0);
            frame[1] = r0 + frac * (r1 - r0);

            self.position += self.rate;
            while self.position >= frames as f64 {
                self.position -= frames as f64;
            }
        }
    }
}
