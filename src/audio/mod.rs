pub mod clip;
pub mod file;

pub use clip::{drop_filename, AudioFrame, ClipConfig, ClipRecorder, RecordingResult};
pub use file::{probe_duration, AudioFileInfo, WavSource};
