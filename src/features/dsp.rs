//! Small framing and peak helpers shared by the acoustic feature groups.

use std::f64::consts::PI;

/// Periodic Hann window of `len` samples.
pub(crate) fn hann(len: usize) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos())
        .collect()
}

/// Start offsets of full frames of `frame_len` samples every `hop` samples.
pub(crate) fn frame_starts(
    total: usize,
    frame_len: usize,
    hop: usize,
) -> impl Iterator<Item = usize> {
    let count = if frame_len == 0 || hop == 0 || total < frame_len {
        0
    } else {
        (total - frame_len) / hop + 1
    };
    (0..count).map(move |i| i * hop)
}

/// First-order pre-emphasis starting at `from_hz`.
pub(crate) fn pre_emphasis(samples: &[f64], sample_rate: f64, from_hz: f64) -> Vec<f64> {
    let alpha = (-2.0 * PI * from_hz / sample_rate).exp();
    let mut out = Vec::with_capacity(samples.len());
    let mut previous = 0.0;
    for &sample in samples {
        out.push(sample - alpha * previous);
        previous = sample;
    }
    out
}

/// Vertex of the parabola through three equally spaced points.
///
/// Returns the offset from the centre sample in (-1, 1) and the peak value.
pub(crate) fn parabolic_peak(left: f64, centre: f64, right: f64) -> (f64, f64) {
    let denom = left - 2.0 * centre + right;
    if denom.abs() < f64::EPSILON {
        return (0.0, centre);
    }
    let offset = (0.5 * (left - right) / denom).clamp(-1.0, 1.0);
    let value = centre - 0.25 * (left - right) * offset;
    (offset, value)
}

/// Zero-pad `samples` to at least `len` samples.
pub(crate) fn pad_to(samples: &[f64], len: usize) -> Vec<f64> {
    let mut padded = samples.to_vec();
    if padded.len() < len {
        padded.resize(len, 0.0);
    }
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_cover_full_windows_only() {
        let starts: Vec<usize> = frame_starts(10, 4, 3).collect();
        assert_eq!(starts, vec![0, 3, 6]);
        assert_eq!(frame_starts(3, 4, 1).count(), 0);
    }

    #[test]
    fn parabola_recovers_symmetric_peak() {
        let (offset, value) = parabolic_peak(1.0, 2.0, 1.0);
        assert_eq!(offset, 0.0);
        assert_eq!(value, 2.0);
        let (offset, _) = parabolic_peak(1.0, 2.0, 1.5);
        assert!(offset > 0.0);
    }

    #[test]
    fn hann_is_zero_at_start() {
        let window = hann(8);
        assert_eq!(window[0], 0.0);
        assert!((window[4] - 1.0).abs() < 1e-12);
    }
}
