use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Clip recorder configuration
#[derive(Debug, Clone)]
pub struct ClipConfig {
    /// Directory the clip is written to (the audio storage directory)
    pub output_dir: PathBuf,
    /// Recording stops once this much audio has been written
    pub max_duration: Duration,
}

impl ClipConfig {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            max_duration: Duration::from_secs(30),
        }
    }
}

/// A finished clip on disk
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    /// Id of the drop this clip belongs to; also part of `filename`
    pub id: Uuid,
    pub file_path: PathBuf,
    /// Portable name of the clip inside the output directory
    pub filename: String,
    pub duration_sec: f64,
}

impl RecordingResult {
    /// Delete the clip instead of turning it into a drop
    pub fn discard(self) -> Result<()> {
        fs::remove_file(&self.file_path)
            .with_context(|| format!("Failed to discard {}", self.file_path.display()))
    }
}

/// Filename for the audio of drop `id` recorded at `now`,
/// e.g. `drop-20261019T074300.123Z-<id>.wav`
pub fn drop_filename(id: Uuid, now: DateTime<Utc>, extension: &str) -> String {
    format!(
        "drop-{}-{}.{}",
        now.format("%Y%m%dT%H%M%S%.3fZ"),
        id.hyphenated(),
        extension.trim_start_matches('.')
    )
}

/// Writes one voice clip from a stream of frames
///
/// The sample format is taken from the first frame.
pub struct ClipRecorder {
    config: ClipConfig,
}

impl ClipRecorder {
    pub fn new(config: ClipConfig) -> Result<Self> {
        fs::create_dir_all(&config.output_dir).context("Failed to create output directory")?;

        Ok(Self { config })
    }

    /// Record until the channel closes or the maximum duration is reached
    pub async fn record(
        &self,
        mut audio_rx: mpsc::Receiver<AudioFrame>,
    ) -> Result<RecordingResult> {
        let mut writer: Option<ClipWriter> = None;

        while let Some(frame) = audio_rx.recv().await {
            if frame.sample_rate == 0 || frame.channels == 0 {
                warn!("Ignoring frame with empty format at {}ms", frame.timestamp_ms);
                continue;
            }

            if writer.is_none() {
                writer = Some(self.start_clip(&frame)?);
            }

            let capped = match writer.as_mut() {
                Some(clip) => clip.write_frame(&frame, self.config.max_duration),
                None => Ok(false),
            };

            match capped {
                Ok(true) => {
                    info!("Reached maximum clip duration of {:?}", self.config.max_duration);
                    break;
                }
                Ok(false) => {}
                Err(e) => {
                    if let Some(clip) = writer.take() {
                        clip.discard();
                    }
                    return Err(e);
                }
            }
        }

        match writer {
            Some(clip) => {
                let result = clip.finish()?;
                info!(
                    "Clip {} complete: {:.1}s",
                    result.filename, result.duration_sec
                );
                Ok(result)
            }
            None => bail!("No audio received, nothing recorded"),
        }
    }

    fn start_clip(&self, frame: &AudioFrame) -> Result<ClipWriter> {
        let id = Uuid::new_v4();
        let filename = drop_filename(id, Utc::now(), "wav");
        let file_path = self.config.output_dir.join(&filename);

        info!("Recording clip to {}", file_path.display());

        ClipWriter::new(id, file_path, filename, frame.sample_rate, frame.channels)
    }
}

/// A single WAV file being written
struct ClipWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    id: Uuid,
    file_path: PathBuf,
    filename: String,
    sample_rate: u32,
    channels: u16,
    /// Samples written across all channels
    sample_count: u64,
}

impl ClipWriter {
    fn new(
        id: Uuid,
        file_path: PathBuf,
        filename: String,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        Ok(Self {
            writer: Some(writer),
            id,
            file_path,
            filename,
            sample_rate,
            channels,
            sample_count: 0,
        })
    }

    fn max_samples(&self, max_duration: Duration) -> u64 {
        let per_second = self.sample_rate as u64 * self.channels as u64;
        (max_duration.as_secs_f64() * per_second as f64) as u64
    }

    /// Append the frame, truncated at the cap. Returns `true` once the cap is hit.
    fn write_frame(&mut self, frame: &AudioFrame, max_duration: Duration) -> Result<bool> {
        let max_samples = self.max_samples(max_duration);
        let room = max_samples.saturating_sub(self.sample_count) as usize;
        // Keep whole interleaved frames only
        let room = room - room % self.channels as usize;

        if let Some(writer) = &mut self.writer {
            let take = frame.samples.len().min(room);
            for &sample in &frame.samples[..take] {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            self.sample_count += take as u64;
        }

        Ok(self.sample_count >= max_samples)
    }

    fn duration_sec(&self) -> f64 {
        self.sample_count as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    fn finish(mut self) -> Result<RecordingResult> {
        if self.sample_count == 0 {
            self.discard();
            bail!("No audio samples received, nothing recorded");
        }

        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        Ok(RecordingResult {
            id: self.id,
            file_path: self.file_path.clone(),
            filename: self.filename.clone(),
            duration_sec: self.duration_sec(),
        })
    }

    /// Close and delete the file
    fn discard(mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.finalize();
        }
        if let Err(e) = fs::remove_file(&self.file_path) {
            warn!("Failed to remove unfinished clip {}: {}", self.file_path.display(), e);
        }
    }
}

impl Drop for ClipWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filename_is_portable_and_sortable() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 7, 43, 0).unwrap();
        let id = Uuid::from_u128(0x6f1c2a3e_9a51_4f0e_8d7c_2b1f4c3d5e6a);

        assert_eq!(
            drop_filename(id, now, "wav"),
            "drop-20261019T074300.000Z-6f1c2a3e-9a51-4f0e-8d7c-2b1f4c3d5e6a.wav"
        );
        assert!(drop_filename(id, now, ".m4a").ends_with("5e6a.m4a"));
        assert!(crate::storage::is_portable_filename(&drop_filename(id, now, "wav")));
    }

    #[test]
    fn same_instant_different_drops_get_different_names() {
        let now = Utc::now();
        assert_ne!(
            drop_filename(Uuid::new_v4(), now, "wav"),
            drop_filename(Uuid::new_v4(), now, "wav")
        );
    }

    #[test]
    fn default_max_duration_is_thirty_seconds() {
        let config = ClipConfig::new(PathBuf::from("/tmp/clips"));
        assert_eq!(config.max_duration, Duration::from_secs(30));
    }
}
