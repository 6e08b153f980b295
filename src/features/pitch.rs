use aus::analysis;

use super::stats;
use crate::error::FeatureGroupError;
use crate::types::AudioData;

const GROUP: &str = "pitch";

pub(crate) const KEYS: [&str; 5] = ["f0_mean", "f0_median", "f0_std", "f0_5perc", "f0_95perc"];

/// Frequency bounds and frame size for the pYIN tracker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PitchBounds {
    pub floor: f64,
    pub ceiling: f64,
    pub frame_length: usize,
}

impl PitchBounds {
    /// Bounds the tracker can honour at `sample_rate`: the ceiling stays below
    /// Nyquist and the floor leaves two periods inside one frame.
    fn effective(&self, sample_rate: u32) -> Result<(f64, f64), FeatureGroupError> {
        let nyquist = sample_rate as f64 / 2.0;
        let ceiling = self.ceiling.min(nyquist * 0.95);
        let floor = self
            .floor
            .max(2.0 * sample_rate as f64 / self.frame_length.max(1) as f64);
        if floor >= ceiling {
            return Err(FeatureGroupError::new(
                GROUP,
                format!("empty pitch range {floor:.1}-{ceiling:.1} Hz at {sample_rate} Hz"),
            ));
        }
        Ok((floor, ceiling))
    }
}

/// F0 contour in Hz, NaN for unvoiced frames.
pub(crate) fn pitch_contour(
    audio: &AudioData,
    bounds: PitchBounds,
) -> Result<Vec<f64>, FeatureGroupError> {
    let (floor, ceiling) = bounds.effective(audio.sample_rate)?;
    if audio.samples.len() < bounds.frame_length {
        return Err(FeatureGroupError::new(
            GROUP,
            format!(
                "signal shorter than one frame ({} < {})",
                audio.samples.len(),
                bounds.frame_length
            ),
        ));
    }
    let samples = audio.samples_f64();
    let (_timestamps, pitches, voiced_flags, _confidence) = analysis::pyin_pitch_estimator(
        &samples,
        audio.sample_rate,
        floor,
        ceiling,
        bounds.frame_length,
    );
    Ok(pitches
        .iter()
        .zip(voiced_flags.iter())
        .map(|(&pitch, &voiced)| {
            if voiced && pitch.is_finite() && pitch > 0.0 {
                pitch
            } else {
                f64::NAN
            }
        })
        .collect())
}

/// Mean, median, standard deviation and 5th/95th percentiles of the voiced contour.
pub(crate) fn pitch_statistics(contour: &[f64]) -> Result<Vec<Option<f64>>, FeatureGroupError> {
    let sorted = stats::finite_sorted(contour);
    if sorted.is_empty() {
        return Err(FeatureGroupError::new(GROUP, "no voiced frames"));
    }
    Ok(vec![
        stats::mean(&sorted),
        stats::percentile_sorted(&sorted, 50.0),
        stats::std_dev(&sorted),
        stats::percentile_sorted(&sorted, 5.0),
        stats::percentile_sorted(&sorted, 95.0),
    ])
}

pub(crate) fn compute(
    audio: &AudioData,
    bounds: PitchBounds,
) -> Result<Vec<Option<f64>>, FeatureGroupError> {
    let contour = pitch_contour(audio, bounds)?;
    pitch_statistics(&contour)
}
