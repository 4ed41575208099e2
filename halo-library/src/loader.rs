//! Media decoding into the stereo buffers the enhancer consumes

use std::path::Path;

use rubato::{FftFixedInOut, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while decoding a media file
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Resample error: {0}")]
    Resample(String),
}

/// Descriptive tags of a decoded file
#[derive(Debug, Clone, Default)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: String,
    pub duration_secs: f64,
    /// Rate and channel count before conversion
    pub source_sample_rate: u32,
    pub source_channels: usize,
}

/// A fully decoded file as interleaved stereo
pub struct DecodedMedia {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub metadata: MediaMetadata,
}

impl DecodedMedia {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Reduce or widen interleaved audio to stereo.
///
/// Mono is duplicated; for more than two channels the front pair is kept.
pub fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        2 => samples.to_vec(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        _ => samples
            .chunks_exact(channels)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

/// Decodes files with Symphonia and resamples them with Rubato
pub struct MediaLoader {
    target_sample_rate: u32,
}

impl MediaLoader {
    /// Create a loader producing audio at the output device rate
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Decode `path` into interleaved stereo at the target rate
    pub fn load(&self, path: &Path) -> Result<DecodedMedia, LoadError> {
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
        let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut metadata = read_tags(&mut format, path);
        metadata.source_sample_rate = source_rate;
        metadata.source_channels = channels;

        let mut interleaved = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    warn!("Stopping decode of {}: {}", path.display(), e);
                    break;
                }
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => return Err(LoadError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buffer.samples());
        }

        let stereo = to_stereo(&interleaved, channels);
        metadata.duration_secs = (stereo.len() / 2) as f64 / source_rate as f64;

        let samples = if source_rate != self.target_sample_rate {
            resample_stereo(&stereo, source_rate, self.target_sample_rate)?
        } else {
            stereo
        };

        debug!(
            "Decoded {} ({:.1}s, {} Hz -> {} Hz)",
            metadata.title, metadata.duration_secs, source_rate, self.target_sample_rate
        );

        Ok(DecodedMedia {
            samples,
            sample_rate: self.target_sample_rate,
            metadata,
        })
    }
}

/// Resample interleaved stereo from `source_rate` to `target_rate`
pub fn resample_stereo(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, LoadError> {
    let frames = samples.len() / 2;
    let mut resampler =
        FftFixedInOut::<f32>::new(source_rate as usize, target_rate as usize, 1024, 2)
            .map_err(|e| LoadError::Resample(e.to_string()))?;

    let planar: [Vec<f32>; 2] = [
        samples.iter().step_by(2).copied().collect(),
        samples.iter().skip(1).step_by(2).copied().collect(),
    ];
    let expected = (frames as u64 * target_rate as u64 / source_rate as u64) as usize;
    let chunk = resampler.input_frames_next();
    let mut out: [Vec<f32>; 2] = [Vec::with_capacity(expected), Vec::with_capacity(expected)];

    let mut pos = 0;
    while pos < frames {
        let end = (pos + chunk).min(frames);
        let block: Vec<Vec<f32>> = planar
            .iter()
            .map(|ch| {
                let mut v = ch[pos..end].to_vec();
                v.resize(chunk, 0.0);
                v
            })
            .collect();
        let resampled = resampler
            .process(&block, None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        for (dst, src) in out.iter_mut().zip(resampled) {
            dst.extend(src);
        }
        pos = end;
    }

    let [left, right] = out;
    let len = left.len().min(right.len()).min(expected);
    Ok(left[..len]
        .iter()
        .zip(&right[..len])
        .flat_map(|(&l, &r)| [l, r])
        .collect())
}

fn read_tags(format: &mut Box<dyn FormatReader>, path: &Path) -> MediaMetadata {
    let mut metadata = MediaMetadata {
        title: path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string(),
        artist: "Unknown".to_string(),
        ..Default::default()
    };

    if let Some(meta) = format.metadata().current() {
        for tag in meta.tags() {
            match tag.std_key {
                Some(StandardTagKey::TrackTitle) => metadata.title = tag.value.to_string(),
                Some(StandardTagKey::Artist) => metadata.artist = tag.value.to_string(),
                _ => {}
            }
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_is_duplicated() {
        assert_eq!(to_stereo(&[0.1, 0.2], 1), vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_surround_keeps_front_pair() {
        let frame = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(to_stereo(&frame, 6), vec![1.0, 2.0]);
    }

    #[test]
    fn test_resample_length() {
        let input: Vec<f32> = (0..44100 * 2).map(|i| ((i / 2) as f32 * 0.01).sin()).collect();
        let output = resample_stereo(&input, 44100, 48000).unwrap();
        assert_eq!(output.len(), 48000 * 2);
        assert!(output.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let loader = MediaLoader::new(48000);
        let result = loader.load(Path::new("/nonexistent/halo/track.flac"));
        assert!(matches!(result, Err(LoadError::Io(_))));
    }
}
