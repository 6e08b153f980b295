//! Burg linear-prediction formant tracking.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::dsp::{frame_starts, hann, parabolic_peak, pre_emphasis};
use super::stats;
use crate::audio::resample::linear_resample;
use crate::error::FeatureGroupError;
use crate::types::AudioData;

const GROUP: &str = "formants";
const WINDOW_SECONDS: f64 = 0.025;
const PRE_EMPHASIS_HZ: f64 = 50.0;
const ENVELOPE_POINTS: usize = 512;
const EDGE_MARGIN_HZ: f64 = 50.0;
const SILENCE_POWER: f64 = 1e-10;

pub(crate) const KEYS: [&str; 3] = ["f1_mean", "f2_mean", "f3_mean"];

/// Burg analysis settings: number of formants and the highest formant sought.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FormantSettings {
    pub max_formants: usize,
    pub max_formant_hz: f64,
}

impl Default for FormantSettings {
    fn default() -> Self {
        Self {
            max_formants: 5,
            max_formant_hz: 5500.0,
        }
    }
}

/// Per-formant means of F1..F3 over all frames where the formant was found.
pub(crate) fn compute(
    audio: &AudioData,
    settings: FormantSettings,
) -> Result<Vec<Option<f64>>, FeatureGroupError> {
    let tracks = formant_tracks(audio, settings)?;
    if tracks.iter().all(|track| track.iter().all(|v| v.is_nan())) {
        return Err(FeatureGroupError::new(GROUP, "no formant candidates found"));
    }
    Ok(tracks.iter().map(|track| stats::mean(track)).collect())
}

/// Three formant tracks (Hz, NaN where absent), one value per analysis frame.
pub(crate) fn formant_tracks(
    audio: &AudioData,
    settings: FormantSettings,
) -> Result<[Vec<f64>; 3], FeatureGroupError> {
    let analysis_rate = (2.0 * settings.max_formant_hz).round() as u32;
    let resampled = linear_resample(&audio.samples, audio.sample_rate, analysis_rate)
        .map_err(|err| FeatureGroupError::new(GROUP, err.to_string()))?;
    let samples: Vec<f64> = resampled.iter().map(|&s| s as f64).collect();
    let emphasized = pre_emphasis(&samples, analysis_rate as f64, PRE_EMPHASIS_HZ);

    let window_len = (WINDOW_SECONDS * analysis_rate as f64).round() as usize;
    let hop = (window_len / 4).max(1);
    let order = 2 * settings.max_formants;
    if emphasized.len() < window_len || window_len <= order {
        return Err(FeatureGroupError::new(
            GROUP,
            format!("signal too short for a {WINDOW_SECONDS} s analysis window"),
        ));
    }

    let window = hann(window_len);
    let mut tracks: [Vec<f64>; 3] = Default::default();
    for start in frame_starts(emphasized.len(), window_len, hop) {
        let frame: Vec<f64> = emphasized[start..start + window_len]
            .iter()
            .zip(window.iter())
            .map(|(s, w)| s * w)
            .collect();
        let power = frame.iter().map(|v| v * v).sum::<f64>() / window_len as f64;
        if power < SILENCE_POWER {
            continue;
        }
        let Some(coefficients) = burg(&frame, order) else {
            continue;
        };
        let peaks = envelope_peaks(&coefficients, analysis_rate as f64, settings.max_formant_hz);
        for (slot, track) in tracks.iter_mut().enumerate() {
            track.push(peaks.get(slot).copied().unwrap_or(f64::NAN));
        }
    }
    Ok(tracks)
}

/// Burg's method. Returns `a` with `a[0] == 1` so that
/// `A(z) = 1 + a[1] z^-1 + ... + a[order] z^-order`.
pub(crate) fn burg(samples: &[f64], order: usize) -> Option<Vec<f64>> {
    let n = samples.len();
    if n <= order {
        return None;
    }
    let mut a = vec![0.0; order + 1];
    a[0] = 1.0;
    let mut forward = samples.to_vec();
    let mut backward = samples.to_vec();

    for m in 0..order {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for k in (m + 1)..n {
            numerator += forward[k] * backward[k - 1];
            denominator += forward[k] * forward[k] + backward[k - 1] * backward[k - 1];
        }
        if denominator <= f64::EPSILON {
            return None;
        }
        let reflection = -2.0 * numerator / denominator;

        let previous = a.clone();
        for i in 1..=(m + 1) {
            a[i] = previous[i] + reflection * previous[m + 1 - i];
        }
        for k in ((m + 1)..n).rev() {
            let f = forward[k];
            let b = backward[k - 1];
            forward[k] = f + reflection * b;
            backward[k] = b + reflection * f;
        }
    }
    Some(a)
}

/// Peaks of the all-pole envelope `1 / |A(e^jw)|^2` between the edge margins,
/// ascending in frequency.
fn envelope_peaks(coefficients: &[f64], sample_rate: f64, max_formant_hz: f64) -> Vec<f64> {
    let nyquist = sample_rate / 2.0;
    let step = nyquist / ENVELOPE_POINTS as f64;
    let envelope: Vec<f64> = (0..=ENVELOPE_POINTS)
        .map(|i| {
            let omega = PI * i as f64 / ENVELOPE_POINTS as f64;
            let (re, im) = coefficients
                .iter()
                .enumerate()
                .fold((0.0, 0.0), |(re, im), (k, &c)| {
                    let phase = omega * k as f64;
                    (re + c * phase.cos(), im - c * phase.sin())
                });
            let magnitude = re * re + im * im;
            -(magnitude.max(f64::MIN_POSITIVE)).ln()
        })
        .collect();

    let upper = max_formant_hz.min(nyquist) - EDGE_MARGIN_HZ;
    (1..ENVELOPE_POINTS)
        .filter(|&i| envelope[i] > envelope[i - 1] && envelope[i] >= envelope[i + 1])
        .map(|i| {
            let (offset, _) = parabolic_peak(envelope[i - 1], envelope[i], envelope[i + 1]);
            (i as f64 + offset) * step
        })
        .filter(|&hz| hz > EDGE_MARGIN_HZ && hz < upper)
        .collect()
}
