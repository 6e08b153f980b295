use super::dsp::{frame_starts, hann};
use super::stats;
use crate::error::FeatureGroupError;
use crate::types::AudioData;

const GROUP: &str = "intensity";
/// Auditory threshold pressure, squared.
const REFERENCE_POWER: f64 = 4.0e-10;
const SILENCE_POWER: f64 = 1e-20;

pub(crate) const KEYS: [&str; 1] = ["intensity_mean"];

/// Mean intensity in dB over frames sized for `min_pitch`.
pub(crate) fn compute(
    audio: &AudioData,
    min_pitch: f64,
) -> Result<Vec<Option<f64>>, FeatureGroupError> {
    let contour = intensity_contour(audio, min_pitch)?;
    let mean = stats::mean(&contour)
        .ok_or_else(|| FeatureGroupError::new(GROUP, "signal is silent"))?;
    Ok(vec![Some(mean)])
}

/// Short-term intensity in dB, one value per non-silent frame.
pub(crate) fn intensity_contour(
    audio: &AudioData,
    min_pitch: f64,
) -> Result<Vec<f64>, FeatureGroupError> {
    if min_pitch <= 0.0 {
        return Err(FeatureGroupError::new(GROUP, "minimum pitch must be positive"));
    }
    let rate = audio.sample_rate as f64;
    let window_len = ((3.2 / min_pitch) * rate).round() as usize;
    let hop = ((0.8 / min_pitch) * rate).round().max(1.0) as usize;
    if audio.samples.len() < window_len {
        return Err(FeatureGroupError::new(
            GROUP,
            format!("signal shorter than one {:.3} s window", 3.2 / min_pitch),
        ));
    }

    let window = hann(window_len);
    let window_energy: f64 = window.iter().map(|w| w * w).sum();
    let samples = audio.samples_f64();
    let contour = frame_starts(samples.len(), window_len, hop)
        .filter_map(|start| {
            let frame = &samples[start..start + window_len];
            let dc = frame.iter().sum::<f64>() / window_len as f64;
            let power = frame
                .iter()
                .zip(window.iter())
                .map(|(s, w)| ((s - dc) * w).powi(2))
                .sum::<f64>()
                / window_energy;
            (power > SILENCE_POWER).then(|| 10.0 * (power / REFERENCE_POWER).log10())
        })
        .collect();
    Ok(contour)
}
