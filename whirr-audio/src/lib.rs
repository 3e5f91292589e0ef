//! Audio feedback engine for Whirr
//!
//! Keeps a pre-recorded fan loop playing forever and continuously retunes it
//! so the perceived urgency tracks a target intensity:
//! - LoopBuffer: decoded, resampled loop asset (fatal on load failure)
//! - FanVoice: looping playback head with pitch-shift via playback rate
//! - OutputStage: smoothed output volume and a soft-clip ceiling
//! - FanEngine: lifecycle, intensity glides, and the cpal output stream

mod engine;
mod loop_buffer;
mod output;
pub mod params;
mod voice;

pub use engine::{AudioGraphState, EngineControls, EngineError, EngineState, FanEngine};
pub use loop_buffer::{LoadError, LoopBuffer};
pub use output::OutputStage;
pub use voice::FanVoice;
