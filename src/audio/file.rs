use anyhow::{anyhow, Context, Result};
use hound::WavReader;
use std::fs::File;
use std::path::Path;
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::clip::AudioFrame;

/// Basic facts about an audio file on disk
#[derive(Debug, Clone)]
pub struct AudioFileInfo {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl AudioFileInfo {
    /// Probe the container headers without decoding the audio
    pub fn probe(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Probing audio file: {}", path.display());

        let file = File::open(path)
            .with_context(|| format!("Failed to open audio file {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .context("Failed to probe audio format")?;

        let track = probed
            .format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| anyhow!("No audio track found in {}", path.display()))?;

        let params = &track.codec_params;
        let duration_seconds = match (params.time_base, params.n_frames, params.sample_rate) {
            (Some(time_base), Some(frames), _) => {
                let time = time_base.calc_time(frames);
                time.seconds as f64 + time.frac
            }
            (None, Some(frames), Some(rate)) if rate > 0 => frames as f64 / rate as f64,
            _ => return Err(anyhow!("Audio file {} does not declare its length", path.display())),
        };

        let info = Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: params.sample_rate,
            channels: params.channels.map(|c| c.count() as u16),
        };

        info!(
            "Audio file probed: {:.1}s, {:?}Hz, {:?} channels",
            info.duration_seconds, info.sample_rate, info.channels
        );

        Ok(info)
    }
}

/// Length of the audio file at `path` in seconds
pub fn probe_duration(path: impl AsRef<Path>) -> Result<f64> {
    Ok(AudioFileInfo::probe(path)?.duration_seconds)
}

/// A WAV file replayed as a stream of capture frames
pub struct WavSource {
    pub path: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl WavSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening WAV file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        Ok(Self {
            path: path.display().to_string(),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Feed the samples into a channel in `frame_ms` frames
    pub fn stream(self, frame_ms: u64) -> mpsc::Receiver<AudioFrame> {
        let (tx, rx) = mpsc::channel(100);
        let frames_per_chunk = (self.sample_rate as u64 * frame_ms / 1000).max(1) as usize;
        let per_frame = frames_per_chunk * self.channels.max(1) as usize;

        tokio::spawn(async move {
            for (index, chunk) in self.samples.chunks(per_frame).enumerate() {
                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: self.sample_rate,
                    channels: self.channels,
                    timestamp_ms: index as u64 * frame_ms,
                };
                if tx.send(frame).await.is_err() {
                    // Receiver stopped early (maximum duration reached)
                    break;
                }
            }
            if self.samples.is_empty() {
                warn!("WAV file {} has no samples", self.path);
            }
        });

        rx
    }
}
