//! Loop asset loading and decoding
//!
//! The engine plays exactly one pre-recorded loop, decoded once at
//! construction. A missing or undecodable asset is a fatal configuration
//! error; there is no silent degradation.

use std::path::Path;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading the loop asset.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Decoded audio contains no samples")]
    EmptyAudio,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Resample error: {0}")]
    Resample(String),
}

/// An immutable, pre-decoded stereo loop.
#[derive(Clone)]
pub struct LoopBuffer {
    /// Interleaved stereo samples in -1.0..=1.0
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
}

impl LoopBuffer {
    /// Decode an audio file into an interleaved stereo loop at
    /// `target_sample_rate`.
    pub fn load(path: &Path, target_sample_rate: u32) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let source_rate = codec_params.sample_rate.unwrap_or(44100);
        let channels = codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(2)
            .max(1);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(_) => break,
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(_) => continue,
            };

            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        if samples.is_empty() {
            return Err(LoadError::EmptyAudio);
        }

        let stereo = to_stereo(&samples, channels);
        let (stereo, sample_rate) = if source_rate != target_sample_rate {
            (
                resample_stereo(&stereo, source_rate, target_sample_rate)?,
                target_sample_rate,
            )
        } else {
            (stereo, source_rate)
        };

        debug!(
            path = %path.display(),
            frames = stereo.len() / 2,
            sample_rate,
            "loop asset loaded"
        );

        Ok(Self {
            samples: Arc::new(stereo),
            sample_rate,
        })
    }

    /// Build a loop directly from interleaved stereo frames. Used by tests
    /// and synthetic sources.
    pub fn from_frames(samples: Vec<f32>, sample_rate: u32) -> Self {
        debug_assert!(samples.len() % 2 == 0, "interleaved stereo expected");
        Self {
            samples: Arc::new(samples),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &Arc<Vec<f32>> {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Remap interleaved samples with `channels` channels to interleaved stereo.
/// Mono is duplicated; extra channels beyond the first two are dropped.
fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        2 => samples.to_vec(),
        1 => {
            let mut out = Vec::with_capacity(samples.len() * 2);
            for &s in samples {
                out.push(s);
                out.push(s);
            }
            out
        }
        n => {
            let mut out = Vec::with_capacity(samples.len() / n * 2);
            for frame in samples.chunks_exact(n) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
            out
        }
    }
}

/// Resample interleaved stereo to the target rate.
fn resample_stereo(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>, LoadError> {
    use rubato::{FftFixedInOut, Resampler};

    let mut resampler =
        FftFixedInOut::<f32>::new(source_rate as usize, target_rate as usize, 1024, 2)
            .map_err(|e| LoadError::Resample(e.to_string()))?;

    let frames = samples.len() / 2;
    let chunk = resampler.input_frames_next();
    let mut out_left: Vec<f32> = Vec::with_capacity(frames);
    let mut out_right: Vec<f32> = Vec::with_capacity(frames);

    let mut pos = 0;
    while pos < frames {
        let end = (pos + chunk).min(frames);
        // Last chunk is zero-padded up to the resampler's fixed input size.
        let mut in_left = vec![0.0f32; chunk];
        let mut in_right = vec![0.0f32; chunk];
        for (i, frame) in (pos..end).enumerate() {
            in_left[i] = samples[frame * 2];
            in_right[i] = samples[frame * 2 + 1];
        }

        let waves = resampler
            .process(&[in_left, in_right], None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        out_left.extend_from_slice(&waves[0]);
        out_right.extend_from_slice(&waves[1]);
        pos += chunk;
    }

    let mut out = Vec::with_capacity(out_left.len() * 2);
    for (l, r) in out_left.iter().zip(&out_right) {
        out.push(*l);
        out.push(*r);
    }
    Ok(out)
}
