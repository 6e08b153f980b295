use std::path::Path;

use tracing::trace;

use super::decoder::decode_audio;
use super::resample::linear_resample;
use crate::error::DecodeError;
use crate::types::AudioData;

/// Decodes audio files into mono buffers at a fixed sample rate.
#[derive(Debug, Clone, Copy)]
pub struct AudioLoader {
    target_sample_rate: u32,
    max_duration: Option<f64>,
}

impl AudioLoader {
    pub fn new(target_sample_rate: u32) -> Self {
        Self {
            target_sample_rate,
            max_duration: None,
        }
    }

    /// Discard audio beyond `seconds` to bound analysis cost.
    pub fn with_max_duration(mut self, seconds: Option<f64>) -> Self {
        self.max_duration = seconds.filter(|s| *s > 0.0);
        self
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn load(&self, path: &Path) -> Result<AudioData, DecodeError> {
        load(path, self.target_sample_rate, self.max_duration)
    }
}

/// Decode `path` and resample it to `target_sample_rate`.
pub fn load(
    path: &Path,
    target_sample_rate: u32,
    max_duration: Option<f64>,
) -> Result<AudioData, DecodeError> {
    let native = decode_audio(path, max_duration)?;
    let mut samples = linear_resample(&native.samples, native.sample_rate, target_sample_rate)
        .map_err(|err| DecodeError::new(path, err.to_string()))?;
    if let Some(seconds) = max_duration {
        let limit = (seconds * target_sample_rate as f64).round() as usize;
        samples.truncate(limit.max(1));
    }
    trace!(
        file = %path.display(),
        native_rate = native.sample_rate,
        samples = samples.len(),
        "audio loaded"
    );
    Ok(AudioData::new(samples, target_sample_rate))
}
