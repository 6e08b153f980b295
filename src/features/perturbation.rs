//! Glottal pulse detection and local jitter/shimmer.
//!
//! Periods are tracked frame by frame with a normalized autocorrelation over
//! the `[floor, ceiling]` pitch range. Pulses are then placed on the absolute
//! waveform peak nearest to one period after the previous pulse, restarting
//! at every voiced run.

use serde::{Deserialize, Serialize};

use super::dsp::{frame_starts, parabolic_peak};
use crate::error::FeatureGroupError;
use crate::types::AudioData;

const GROUP: &str = "perturbation";
const VOICING_THRESHOLD: f64 = 0.45;
const SILENCE_RATIO: f64 = 0.03;
const PERIODS_PER_WINDOW: f64 = 3.0;
const HOP_SECONDS: f64 = 0.01;
const SEARCH_FRACTION: f64 = 0.2;
const OCTAVE_TOLERANCE: f64 = 0.95;

pub(crate) const KEYS: [&str; 2] = ["jitter_local", "shimmer_local"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbationSettings {
    pub floor: f64,
    pub ceiling: f64,
    pub shortest_period: f64,
    pub longest_period: f64,
    pub max_period_factor: f64,
    pub max_amplitude_factor: f64,
}

impl Default for PerturbationSettings {
    fn default() -> Self {
        Self {
            floor: 75.0,
            ceiling: 600.0,
            shortest_period: 0.0001,
            longest_period: 0.02,
            max_period_factor: 1.3,
            max_amplitude_factor: 1.6,
        }
    }
}

/// One glottal pulse: time in seconds and absolute peak amplitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Pulse {
    pub time: f64,
    pub amplitude: f64,
}

pub(crate) fn compute(
    audio: &AudioData,
    settings: PerturbationSettings,
) -> Result<Vec<Option<f64>>, FeatureGroupError> {
    let runs = pulse_runs(audio, settings)?;
    let pulse_count: usize = runs.iter().map(Vec::len).sum();
    if pulse_count < 3 {
        return Err(FeatureGroupError::new(
            GROUP,
            format!("only {pulse_count} glottal pulses detected"),
        ));
    }
    Ok(vec![jitter_local(&runs, settings), shimmer_local(&runs, settings)])
}

/// Pulses grouped by voiced run; periods are never measured across runs.
pub(crate) fn pulse_runs(
    audio: &AudioData,
    settings: PerturbationSettings,
) -> Result<Vec<Vec<Pulse>>, FeatureGroupError> {
    if settings.floor <= 0.0 || settings.ceiling <= settings.floor {
        return Err(FeatureGroupError::new(GROUP, "invalid pitch range"));
    }
    let rate = audio.sample_rate as f64;
    let samples = audio.samples_f64();
    let window_len = (PERIODS_PER_WINDOW / settings.floor * rate).round() as usize;
    let hop = (HOP_SECONDS * rate).round().max(1.0) as usize;
    if samples.len() < window_len {
        return Err(FeatureGroupError::new(
            GROUP,
            "signal shorter than one analysis window",
        ));
    }

    let peak = samples.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
    if peak <= 0.0 {
        return Err(FeatureGroupError::new(GROUP, "signal is silent"));
    }
    let min_lag = (rate / settings.ceiling).floor().max(1.0) as usize;
    let max_lag = ((rate / settings.floor).ceil() as usize).min(window_len / 2);

    // Period (in samples) per frame, None when unvoiced.
    let periods: Vec<(usize, Option<f64>)> = frame_starts(samples.len(), window_len, hop)
        .map(|start| {
            let frame = &samples[start..start + window_len];
            let rms = (frame.iter().map(|s| s * s).sum::<f64>() / window_len as f64).sqrt();
            let period = if rms < SILENCE_RATIO * peak {
                None
            } else {
                frame_period(frame, min_lag, max_lag)
            };
            (start, period)
        })
        .collect();

    let mut runs = Vec::new();
    let mut current: Vec<Pulse> = Vec::new();
    let mut cursor = 0usize;
    for (index, &(start, period)) in periods.iter().enumerate() {
        let frame_end = if index + 1 < periods.len() {
            periods[index + 1].0
        } else {
            start + window_len
        };
        let Some(period) = period else {
            if current.len() > 1 {
                runs.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            continue;
        };
        cursor = cursor.max(start);
        while cursor < frame_end.min(samples.len()) {
            let (centre, radius) = match current.last() {
                Some(last) => {
                    let expected = last.time * rate + period;
                    (expected, (SEARCH_FRACTION * period).max(1.0))
                }
                None => (cursor as f64 + period / 2.0, period / 2.0),
            };
            let lo = (centre - radius).floor().max(0.0) as usize;
            let hi = ((centre + radius).ceil() as usize).min(samples.len() - 1);
            if lo >= hi || lo >= samples.len() {
                break;
            }
            let pulse = locate_peak(&samples, lo, hi, rate);
            cursor = (pulse.time * rate).round() as usize + 1;
            if current.last().map_or(true, |last| pulse.time > last.time) {
                current.push(pulse);
            }
        }
    }
    if current.len() > 1 {
        runs.push(current);
    }
    Ok(runs)
}

/// Best normalized-autocorrelation lag within `[min_lag, max_lag]`, refined
/// by parabolic interpolation.
fn frame_period(frame: &[f64], min_lag: usize, max_lag: usize) -> Option<f64> {
    if min_lag + 1 >= max_lag {
        return None;
    }
    let correlation = |lag: usize| {
        let head = &frame[..frame.len() - lag];
        let tail = &frame[lag..];
        let cross: f64 = head.iter().zip(tail).map(|(a, b)| a * b).sum();
        let energy_head: f64 = head.iter().map(|a| a * a).sum();
        let energy_tail: f64 = tail.iter().map(|b| b * b).sum();
        let norm = (energy_head * energy_tail).sqrt();
        if norm > 0.0 {
            cross / norm
        } else {
            0.0
        }
    };
    let scores: Vec<f64> = (min_lag - 1..=max_lag + 1)
        .map(|lag| {
            if lag == 0 || lag >= frame.len() {
                0.0
            } else {
                correlation(lag)
            }
        })
        .collect();
    let peaks: Vec<usize> = (1..scores.len() - 1)
        .filter(|&i| scores[i] >= scores[i - 1] && scores[i] >= scores[i + 1])
        .collect();
    let strongest = peaks
        .iter()
        .map(|&i| scores[i])
        .fold(f64::NEG_INFINITY, f64::max);
    if strongest < VOICING_THRESHOLD {
        return None;
    }
    // Shortest lag close to the strongest peak, so multiples of the period lose.
    let best = peaks
        .into_iter()
        .find(|&i| scores[i] >= OCTAVE_TOLERANCE * strongest)?;
    let (offset, _) = parabolic_peak(scores[best - 1], scores[best], scores[best + 1]);
    Some((min_lag - 1 + best) as f64 + offset)
}

fn locate_peak(samples: &[f64], lo: usize, hi: usize, rate: f64) -> Pulse {
    let index = (lo..=hi)
        .max_by(|&a, &b| samples[a].abs().total_cmp(&samples[b].abs()))
        .unwrap_or(lo);
    let (offset, value) = if index > 0 && index + 1 < samples.len() {
        parabolic_peak(
            samples[index - 1].abs(),
            samples[index].abs(),
            samples[index + 1].abs(),
        )
    } else {
        (0.0, samples[index].abs())
    };
    Pulse {
        time: (index as f64 + offset) / rate,
        amplitude: value,
    }
}

fn valid_period(period: f64, settings: PerturbationSettings) -> bool {
    period >= settings.shortest_period && period <= settings.longest_period
}

fn within_factor(a: f64, b: f64, factor: f64) -> bool {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    lo > 0.0 && hi / lo <= factor
}

/// Mean absolute difference between consecutive periods over the mean period.
pub(crate) fn jitter_local(runs: &[Vec<Pulse>], settings: PerturbationSettings) -> Option<f64> {
    let mut diff_sum = 0.0;
    let mut diff_count = 0usize;
    let mut period_sum = 0.0;
    let mut period_count = 0usize;
    for run in runs {
        let periods: Vec<f64> = run.windows(2).map(|w| w[1].time - w[0].time).collect();
        for &period in periods.iter().filter(|&&p| valid_period(p, settings)) {
            period_sum += period;
            period_count += 1;
        }
        for pair in periods.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if valid_period(a, settings)
                && valid_period(b, settings)
                && within_factor(a, b, settings.max_period_factor)
            {
                diff_sum += (a - b).abs();
                diff_count += 1;
            }
        }
    }
    if diff_count == 0 || period_count == 0 {
        return None;
    }
    Some((diff_sum / diff_count as f64) / (period_sum / period_count as f64))
}

/// Mean absolute difference between consecutive pulse amplitudes over the mean amplitude.
pub(crate) fn shimmer_local(runs: &[Vec<Pulse>], settings: PerturbationSettings) -> Option<f64> {
    let mut diff_sum = 0.0;
    let mut amplitude_sum = 0.0;
    let mut count = 0usize;
    for run in runs {
        for pair in run.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let period = b.time - a.time;
            if !valid_period(period, settings)
                || !within_factor(a.amplitude, b.amplitude, settings.max_amplitude_factor)
            {
                continue;
            }
            diff_sum += (a.amplitude - b.amplitude).abs();
            amplitude_sum += 0.5 * (a.amplitude + b.amplitude);
            count += 1;
        }
    }
    if count == 0 || amplitude_sum <= 0.0 {
        return None;
    }
    Some(diff_sum / amplitude_sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulses(times: &[f64], amplitudes: &[f64]) -> Vec<Pulse> {
        times
            .iter()
            .zip(amplitudes)
            .map(|(&time, &amplitude)| Pulse { time, amplitude })
            .collect()
    }

    fn sine(freq: f32, amplitude: f32) -> AudioData {
        let step = 2.0 * std::f32::consts::PI * freq / 16_000.0;
        let samples = (0..16_000).map(|i| amplitude * (step * i as f32).sin()).collect();
        AudioData::new(samples, 16_000)
    }

    #[test]
    fn perfectly_periodic_pulses_have_no_jitter() {
        let run = pulses(&[0.0, 0.01, 0.02, 0.03], &[0.5, 0.5, 0.5, 0.5]);
        let settings = PerturbationSettings::default();
        assert_eq!(jitter_local(&[run.clone()], settings), Some(0.0));
        assert_eq!(shimmer_local(&[run], settings), Some(0.0));
    }

    #[test]
    fn alternating_periods_measure_relative_jitter() {
        let run = pulses(&[0.0, 0.010, 0.021, 0.031], &[0.5, 0.4, 0.5, 0.4]);
        let settings = PerturbationSettings::default();
        let jitter = jitter_local(&[run.clone()], settings).unwrap();
        assert!((jitter - 0.001 / (0.031 / 3.0)).abs() < 1e-9);
        let shimmer = shimmer_local(&[run], settings).unwrap();
        assert!((shimmer - 0.1 / 0.45).abs() < 1e-9);
    }

    #[test]
    fn period_factor_excludes_octave_jumps() {
        let run = pulses(&[0.0, 0.005, 0.015], &[0.5, 0.5, 0.5]);
        assert_eq!(jitter_local(&[run], PerturbationSettings::default()), None);
    }

    #[test]
    fn steady_tone_has_low_jitter() {
        let values = compute(&sine(200.0, 0.5), PerturbationSettings::default()).unwrap();
        let jitter = values[0].unwrap();
        assert!(jitter < 0.01, "jitter {jitter}");
    }

    #[test]
    fn silence_is_group_error() {
        let audio = AudioData::new(vec![0.0; 16_000], 16_000);
        assert!(compute(&audio, PerturbationSettings::default()).is_err());
    }
}
