//! Fan engine - lifecycle, intensity glides, and the output stream
//!
//! The render state ([`EngineState`]) is owned by the audio callback and
//! reads its parameters from a shared latest-wins control block at the top
//! of every block, so no lock is ever held across the real-time render path
//! and no update can be lost behind a queue. The public [`FanEngine`]
//! handle owns the stream, the target intensity, and the glide toward it.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error};

use whirr_anim::{AnimationHandle, Scheduler};

use crate::loop_buffer::LoopBuffer;
use crate::output::OutputStage;
use crate::params::{
    pitch_for, volume_for, GLIDE_DURATION, INITIAL_INTENSITY, MIN_INTENSITY,
};
use crate::voice::FanVoice;

/// Pre-allocated stereo scratch for non-stereo devices.
const SCRATCH_SAMPLES: usize = 16384;

/// Errors from starting or stopping the audio output.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No audio output device found")]
    NoOutputDevice,
    #[error("Failed to query output config: {0}")]
    OutputConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("Failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("Failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("Failed to pause output stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),
}

/// Control block shared between the engine handle, the glide callback, and
/// the render state.
///
/// Every field is latest-wins with a single logical writer: the engine
/// thread owns `playing`, the animation clock thread owns the tuning pair.
/// The render side reads at block start, so a value set before the stream
/// starts is always in effect for the first rendered frame and a burst of
/// updates can never displace a lifecycle change.
pub struct EngineControls {
    playing: AtomicBool,
    pitch_bits: AtomicU32,
    volume_bits: AtomicU32,
}

impl EngineControls {
    fn new(pitch_cents: f32, volume: f32) -> Self {
        Self {
            playing: AtomicBool::new(false),
            pitch_bits: AtomicU32::new(pitch_cents.to_bits()),
            volume_bits: AtomicU32::new(volume.to_bits()),
        }
    }

    /// Apply both live parameters as one logical update.
    pub fn set_params(&self, pitch_cents: f32, volume: f32) {
        self.pitch_bits.store(pitch_cents.to_bits(), Ordering::Relaxed);
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }

    /// Current (pitch_cents, volume) pair.
    pub fn params(&self) -> (f32, f32) {
        (
            f32::from_bits(self.pitch_bits.load(Ordering::Relaxed)),
            f32::from_bits(self.volume_bits.load(Ordering::Relaxed)),
        )
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }
}

/// Snapshot of the audible graph, read-only to the outside world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioGraphState {
    pub running: bool,
    pub pitch_cents: f32,
    pub volume: f32,
}

/// Render state owned by the audio callback: the looping voice feeding the
/// output stage. Controls are re-read at the start of every block.
pub struct EngineState {
    voice: FanVoice,
    output: OutputStage,
    controls: Arc<EngineControls>,
}

impl EngineState {
    pub fn new(voice: FanVoice, output: OutputStage, controls: Arc<EngineControls>) -> Self {
        Self {
            voice,
            output,
            controls,
        }
    }

    fn apply_controls(&mut self) {
        let (pitch_cents, volume) = self.controls.params();
        self.voice.set_pitch_cents(pitch_cents);
        self.output.set_volume(volume);
        if self.controls.is_playing() {
            self.voice.play();
        } else {
            self.voice.stop();
        }
    }

    /// Render one interleaved stereo block.
    pub fn process(&mut self, output: &mut [f32]) {
        self.apply_controls();
        self.voice.process(output);
        self.output.process(output);
    }
}

/// The load-driven audio feedback engine.
///
/// Lifecycle is Stopped -> `start()` -> Running -> `stop()` -> Stopped, both
/// transitions idempotent. The target intensity is set by the load
/// subscriber (or a debug control); each change glides the presented
/// intensity toward it over [`GLIDE_DURATION`], retuning pitch and volume on
/// every animation tick.
pub struct FanEngine {
    loop_buffer: LoopBuffer,
    scheduler: Scheduler,
    controls: Arc<EngineControls>,
    /// Written only from the animation clock thread
    presentation: Arc<Mutex<f32>>,
    intensity: f32,
    glide: Duration,
    current_animation: Option<AnimationHandle>,
    stream: Option<cpal::Stream>,
    running: bool,
}

impl FanEngine {
    pub fn new(loop_buffer: LoopBuffer, scheduler: Scheduler) -> Self {
        let controls = Arc::new(EngineControls::new(
            pitch_for(INITIAL_INTENSITY),
            volume_for(INITIAL_INTENSITY),
        ));
        Self {
            loop_buffer,
            scheduler,
            controls,
            presentation: Arc::new(Mutex::new(INITIAL_INTENSITY)),
            intensity: INITIAL_INTENSITY,
            glide: GLIDE_DURATION,
            current_animation: None,
            stream: None,
            running: false,
        }
    }

    /// Current target intensity.
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// The currently presented (audible) intensity, which lags the target
    /// through the glide.
    pub fn presentation_intensity(&self) -> f32 {
        *self.presentation.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Observable graph state derived from the run flag and the presented
    /// intensity.
    pub fn graph_state(&self) -> AudioGraphState {
        let v = self.presentation_intensity();
        AudioGraphState {
            running: self.running,
            pitch_cents: pitch_for(v),
            volume: volume_for(v),
        }
    }

    /// Set the target intensity, clamped to [`MIN_INTENSITY`]..=1.0.
    ///
    /// A change supersedes any in-flight glide: the old animation is
    /// cancelled first and the new one starts from wherever the presented
    /// intensity currently sits, so the newest target always wins without an
    /// audible discontinuity.
    pub fn set_intensity(&mut self, target: f32) {
        let target = target.clamp(MIN_INTENSITY, 1.0);
        if target == self.intensity {
            return;
        }
        self.intensity = target;
        debug!(target, "intensity changed");

        if let Some(animation) = self.current_animation.take() {
            animation.cancel();
        }

        let from = f64::from(*self.presentation.lock());
        let presentation = self.presentation.clone();
        let controls = self.controls.clone();
        let handle = self
            .scheduler
            .animate(from, f64::from(target), self.glide, move |value| {
                let v = value as f32;
                *presentation.lock() = v;
                controls.set_params(pitch_for(v), volume_for(v));
            });
        self.current_animation = Some(handle);
    }

    /// Start playback. Idempotent while running.
    ///
    /// The first call builds the output stream; every call applies the
    /// parameters derived from the current presented intensity before the
    /// stream starts, so playback never begins with stale tuning. Device and
    /// stream failures propagate to the caller.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.running {
            return Ok(());
        }

        if self.stream.is_none() {
            self.stream = Some(self.build_stream()?);
        }

        let v = self.presentation_intensity();
        self.controls.set_params(pitch_for(v), volume_for(v));
        self.controls.set_playing(true);

        if let Some(stream) = &self.stream {
            stream.play()?;
        }
        self.running = true;
        debug!("engine started");
        Ok(())
    }

    /// Halt playback without tearing down the stream. Idempotent while
    /// stopped; `start()` resumes cheaply.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if !self.running {
            return Ok(());
        }
        self.controls.set_playing(false);
        if let Some(stream) = &self.stream {
            stream.pause()?;
        }
        self.running = false;
        debug!("engine stopped");
        Ok(())
    }

    fn build_stream(&mut self) -> Result<cpal::Stream, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(EngineError::NoOutputDevice)?;
        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let voice = FanVoice::new(&self.loop_buffer, sample_rate);
        let output = OutputStage::new(volume_for(self.presentation_intensity()));
        let mut state = EngineState::new(voice, output, self.controls.clone());

        // Scratch for adapting the stereo render to non-stereo devices.
        let mut stereo_scratch = vec![0.0f32; SCRATCH_SAMPLES];

        debug!(sample_rate, channels, "building output stream");
        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if channels == 2 {
                    state.process(data);
                } else if channels == 1 {
                    let stereo_len = (data.len() * 2).min(stereo_scratch.len());
                    let stereo = &mut stereo_scratch[..stereo_len];
                    state.process(stereo);
                    for (i, sample) in data.iter_mut().enumerate().take(stereo_len / 2) {
                        *sample = (stereo[i * 2] + stereo[i * 2 + 1]) * 0.5;
                    }
                } else {
                    // Render stereo, copy into the first two channels of
                    // each device frame, silence the rest.
                    let frames = data.len() / channels;
                    let stereo_len = (frames * 2).min(stereo_scratch.len());
                    let stereo = &mut stereo_scratch[..stereo_len];
                    state.process(stereo);
                    data.fill(0.0);
                    for (frame, out) in data.chunks_exact_mut(channels).enumerate() {
                        if frame * 2 + 1 < stereo_len {
                            out[0] = stereo[frame * 2];
                            out[1] = stereo[frame * 2 + 1];
                        }
                    }
                }
            },
            |err| {
                error!(error = %err, "audio stream error");
            },
            None,
        )?;
        Ok(stream)
    }
}
