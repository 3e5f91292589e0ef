//! Whirr - your CPU load as mechanical fan noise
//!
//! Wires the three components together: the load sampler publishes a
//! smoothed CPU load, each published value becomes the engine's target
//! intensity, and the engine glides its looping fan voice toward it.

use std::path::PathBuf;

use anyhow::Context;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use whirr_anim::{RefreshClock, Scheduler};
use whirr_audio::{FanEngine, LoopBuffer};
use whirr_monitor::{default_tick_source, LoadConfig, LoadSampler};

/// Working sample rate for the decoded loop; the engine compensates for
/// whatever rate the output device actually runs at.
const LOOP_SAMPLE_RATE: u32 = 48_000;

const DEFAULT_LOOP_ASSET: &str = "assets/fan-loop.wav";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let asset = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOOP_ASSET));

    // A missing or undecodable loop is a fatal configuration error.
    let loop_buffer = LoopBuffer::load(&asset, LOOP_SAMPLE_RATE)
        .with_context(|| format!("loading fan loop from {}", asset.display()))?;
    info!(asset = %asset.display(), seconds = loop_buffer.duration_secs(), "fan loop ready");

    let scheduler = Scheduler::new();
    let _clock = RefreshClock::spawn(scheduler.clone());

    let mut engine = FanEngine::new(loop_buffer, scheduler);

    let mut sampler = LoadSampler::new(default_tick_source(), LoadConfig::default());
    let load_rx = sampler.subscribe();
    sampler.start();

    engine.start().context("starting audio engine")?;
    info!(cores = sampler.cores(), "whirr running");

    // Forward every smoothed load into the engine until the process exits.
    // A broken monitor must never stop the fan sound, so a closed channel
    // just leaves the engine humming at its last intensity.
    for load in load_rx.iter() {
        debug!(load, "forwarding load");
        engine.set_intensity(load);
    }

    info!("load monitor stopped, shutting down");
    engine.stop().context("stopping audio engine")?;
    sampler.stop();
    Ok(())
}
