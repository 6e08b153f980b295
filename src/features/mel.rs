use aus::analysis;
use aus::analysis::mel::MelFilterbank;
use aus::spectrum;
use aus::WindowType;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::dsp::pad_to;
use super::resize::{resize, DEFAULT_PAD_DB};
use crate::error::FeatureGroupError;
use crate::types::AudioData;

const GROUP: &str = "spectral";
const MIN_FREQ: f64 = 20.0;
const AMIN: f64 = 1e-10;
const TOP_DB: f64 = 80.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MelSettings {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    /// Seconds of audio covered by the fixed-width spectrogram.
    pub max_duration: f64,
    pub pad_db: f32,
}

impl Default for MelSettings {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            max_duration: 3.0,
            pad_db: DEFAULT_PAD_DB,
        }
    }
}

impl MelSettings {
    /// Frame count every spectrogram is resized to.
    pub fn target_frames(&self, sample_rate: u32) -> usize {
        (self.max_duration * sample_rate as f64 / self.hop_length.max(1) as f64) as usize
    }
}

pub(crate) fn strength_keys(n_mels: usize) -> Vec<String> {
    (0..n_mels).map(|band| format!("mel_strength_{band:03}")).collect()
}

/// Fixed-shape log-power mel spectrogram plus the mean dB per band.
pub(crate) struct MelSummary {
    pub spectrogram: Array2<f32>,
    pub strength: Vec<Option<f64>>,
}

pub(crate) fn compute(
    audio: &AudioData,
    settings: MelSettings,
) -> Result<MelSummary, FeatureGroupError> {
    let mel_db = log_mel_spectrogram(audio, settings)?;
    let strength = mel_db
        .mean_axis(Axis(1))
        .ok_or_else(|| FeatureGroupError::new(GROUP, "spectrogram has no frames"))?
        .iter()
        .map(|&v| Some(v as f64))
        .collect();
    let spectrogram = resize(
        mel_db.view(),
        settings.target_frames(audio.sample_rate),
        settings.pad_db,
    );
    Ok(MelSummary {
        spectrogram,
        strength,
    })
}

/// `n_mels x frames` power spectrogram in dB relative to its maximum,
/// floored `TOP_DB` below the peak.
pub(crate) fn log_mel_spectrogram(
    audio: &AudioData,
    settings: MelSettings,
) -> Result<Array2<f32>, FeatureGroupError> {
    if audio.samples.is_empty() {
        return Err(FeatureGroupError::new(GROUP, "empty signal"));
    }
    let samples = pad_to(&audio.samples_f64(), settings.n_fft);
    let stft = spectrum::rstft(
        &samples,
        settings.n_fft,
        settings.hop_length,
        WindowType::Hanning,
    );
    let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);
    let power = analysis::make_power_spectrogram(&magnitude);

    let freqs = spectrum::rfftfreq(settings.n_fft, audio.sample_rate);
    let filterbank = MelFilterbank::new(
        MIN_FREQ,
        audio.sample_rate as f64 / 2.0,
        settings.n_mels,
        &freqs,
        true,
    );
    let mel = analysis::mel::make_mel_spectrogram(&power, &filterbank);
    if mel.is_empty() || mel[0].len() != settings.n_mels {
        return Err(FeatureGroupError::new(
            GROUP,
            format!("unexpected mel shape ({} frames)", mel.len()),
        ));
    }

    let reference = mel
        .iter()
        .flat_map(|frame| frame.iter().copied())
        .fold(AMIN, f64::max);
    let ref_db = 10.0 * reference.log10();
    let floor = -TOP_DB;
    // aus frames are rows; transpose to bands x frames.
    let frames = mel.len();
    Ok(Array2::from_shape_fn((settings.n_mels, frames), |(band, frame)| {
        let db = 10.0 * mel[frame][band].max(AMIN).log10() - ref_db;
        db.max(floor) as f32
    }))
}
