//! Halo - stereo-to-5.1 enhancer demo host
//!
//! Decodes a media file, plays it through the enhancer on the default output
//! device and drives the controller's frame ticks.
//!
//! Usage: `halo <file> [hostname]`

mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use halo_analysis::{HostContext, SpectrumAnalyzer};
use halo_audio::{
    fold_down, EngineInfo, EnhancerEvent, StatusLevel, StreamController, SURROUND_CHANNELS,
};
use halo_library::{FilePreferenceStorage, MediaLoader};

use crate::source::BufferSource;

/// Control loop rate (frame ticks per second)
const FPS: u64 = 60;

/// Pre-allocated 5.1 render buffer; grows only if the device asks for more
const INITIAL_BUS_FRAMES: usize = 8192;

/// Everything the audio callback touches
struct Host {
    controller: StreamController,
    monitor: SpectrumAnalyzer,
    bus: Vec<f32>,
}

impl Host {
    fn render(&mut self, data: &mut [f32], channels: usize) {
        let frames = data.len() / channels;
        let len = frames * SURROUND_CHANNELS;
        if self.bus.len() < len {
            self.bus.resize(len, 0.0);
        }
        let bus = &mut self.bus[..len];
        self.controller.render(bus, frames);
        self.monitor.push_interleaved(bus, SURROUND_CHANNELS);
        fold_down(bus, data, channels);
    }

    fn tick(&mut self, now: Duration) {
        let Host {
            controller,
            monitor,
            ..
        } = self;
        controller.on_frame(now, monitor);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let path = PathBuf::from(args.next().context("usage: halo <file> [hostname]")?);
    let hostname = args.next();

    let cpal_host = cpal::default_host();
    let device = cpal_host.default_output_device();
    let config = match &device {
        Some(device) => Some(
            device
                .default_output_config()
                .context("failed to query the output configuration")?,
        ),
        None => None,
    };
    let engine = config.as_ref().map(|c| EngineInfo {
        sample_rate: c.sample_rate().0,
    });

    let mut controller =
        StreamController::new(engine, Box::new(FilePreferenceStorage::open_default()))?;
    if let Some(hostname) = &hostname {
        controller.set_host_context(HostContext::from_hostname(hostname));
    }
    let events = controller.subscribe();

    // A controller exists only when both are present
    let (Some(device), Some(config)) = (device, config) else {
        anyhow::bail!("no output device available");
    };
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;

    let media = MediaLoader::new(sample_rate)
        .load(&path)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    info!(
        "Playing \"{}\" by {} ({:.1}s) on {} channels at {} Hz",
        media.metadata.title, media.metadata.artist, media.metadata.duration_secs, channels, sample_rate
    );

    let source = BufferSource::new(1, Arc::new(media.samples));
    let playback = source.handle();
    let id = controller.attach(Box::new(source));

    let host = Arc::new(Mutex::new(Host {
        controller,
        monitor: SpectrumAnalyzer::bus_monitor(sample_rate)?,
        bus: vec![0.0; INITIAL_BUS_FRAMES * SURROUND_CHANNELS],
    }));
    let host_for_callback = host.clone();

    let stream = device.build_output_stream(
        &config.into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            // Never block the real-time thread; contention outputs silence
            match host_for_callback.try_lock() {
                Some(mut host) => host.render(data, channels),
                None => data.fill(0.0),
            }
        },
        |err| warn!("Audio stream error: {}", err),
        None,
    )?;
    stream.play()?;

    let start = Instant::now();
    let frame_duration = Duration::from_millis(1000 / FPS);
    while !playback.has_ended() {
        host.lock().tick(start.elapsed());
        log_events(&events);
        thread::sleep(frame_duration);
    }

    let mut host = host.lock();
    host.controller.request_teardown(id);
    host.tick(start.elapsed());
    host.controller.cleanup_all();
    log_events(&events);

    let status = host.controller.status();
    info!(
        "Finished after {:.1}s: genre {} ({:.2}), preset {}",
        start.elapsed().as_secs_f32(),
        status.genre,
        status.confidence,
        status.prefs.preset()
    );
    Ok(())
}

fn log_events(events: &Receiver<EnhancerEvent>) {
    for event in events.try_iter() {
        match event {
            EnhancerEvent::PresetChanged(preset) => info!("Preset: {}", preset),
            EnhancerEvent::GenreDetected { genre, confidence } => {
                info!("Detected {} (confidence {:.2})", genre, confidence)
            }
            EnhancerEvent::StreamStateChanged { id, state } => info!("Stream {}: {}", id, state),
            EnhancerEvent::Status { message, level } => match level {
                StatusLevel::Warning | StatusLevel::Error => warn!("{}", message),
                StatusLevel::Info | StatusLevel::Ok => info!("{}", message),
            },
        }
    }
}
