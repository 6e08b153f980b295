use aus::spectrum;
use aus::WindowType;

use super::dsp::pad_to;
use crate::error::FeatureGroupError;
use crate::types::AudioData;

const TIMING_GROUP: &str = "timing";
const TEMPO_GROUP: &str = "tempo";
const ONSET_FFT: usize = 2048;
const ONSET_HOP: usize = 512;
const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 240.0;

pub(crate) const TIMING_KEYS: [&str; 2] = ["duration", "words_per_second"];
pub(crate) const TEMPO_KEYS: [&str; 1] = ["tempo"];

/// Duration in seconds and speech rate for a fixed-length utterance.
pub(crate) fn timing(
    audio: &AudioData,
    words_per_utterance: f64,
) -> Result<Vec<Option<f64>>, FeatureGroupError> {
    let duration = audio.duration();
    if duration <= 0.0 {
        return Err(FeatureGroupError::new(TIMING_GROUP, "zero-length signal"));
    }
    Ok(vec![Some(duration), Some(words_per_utterance / duration)])
}

/// Global tempo estimate in BPM from the autocorrelation of the onset envelope.
pub(crate) fn tempo(audio: &AudioData) -> Result<Vec<Option<f64>>, FeatureGroupError> {
    let envelope = onset_envelope(audio);
    let bpm = tempo_from_envelope(&envelope, audio.sample_rate, ONSET_HOP)?;
    Ok(vec![Some(bpm)])
}

/// Half-wave rectified spectral flux per STFT frame.
pub(crate) fn onset_envelope(audio: &AudioData) -> Vec<f64> {
    let samples = pad_to(&audio.samples_f64(), ONSET_FFT);
    let stft = spectrum::rstft(&samples, ONSET_FFT, ONSET_HOP, WindowType::Hanning);
    let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);
    if magnitude.is_empty() {
        return Vec::new();
    }
    let mut envelope = Vec::with_capacity(magnitude.len());
    envelope.push(0.0);
    for pair in magnitude.windows(2) {
        let flux: f64 = pair[1]
            .iter()
            .zip(pair[0].iter())
            .map(|(curr, prev)| (curr - prev).max(0.0))
            .sum();
        envelope.push(flux);
    }
    envelope
}

pub(crate) fn tempo_from_envelope(
    envelope: &[f64],
    sample_rate: u32,
    hop: usize,
) -> Result<f64, FeatureGroupError> {
    let frames_per_second = sample_rate as f64 / hop as f64;
    let min_lag = ((60.0 / MAX_BPM) * frames_per_second).floor().max(1.0) as usize;
    let max_lag =
        (((60.0 / MIN_BPM) * frames_per_second).ceil() as usize).min(envelope.len() / 2);
    if max_lag <= min_lag {
        return Err(FeatureGroupError::new(
            TEMPO_GROUP,
            format!("onset envelope too short ({} frames)", envelope.len()),
        ));
    }

    let (best_lag, best_score) = (min_lag..=max_lag)
        .map(|lag| {
            let score: f64 = envelope
                .iter()
                .zip(envelope[lag..].iter())
                .map(|(a, b)| a * b)
                .sum();
            (lag, score)
        })
        .fold((0usize, 0.0f64), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        });
    if best_lag == 0 || best_score <= 0.0 {
        return Err(FeatureGroupError::new(TEMPO_GROUP, "no periodic onsets"));
    }
    Ok(60.0 * frames_per_second / best_lag as f64)
}
