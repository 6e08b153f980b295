use ndarray::{s, Array2, ArrayView2, Axis};

/// Default pad value for log-power spectrograms (dB).
pub const DEFAULT_PAD_DB: f32 = -80.0;

/// Normalize the time axis (columns) of a `bins x frames` map to exactly
/// `target_frames` columns: shorter inputs are right-padded with
/// `pad_value`, longer inputs keep their first `target_frames` columns.
pub fn resize(
    spectrogram: ArrayView2<'_, f32>,
    target_frames: usize,
    pad_value: f32,
) -> Array2<f32> {
    let bins = spectrogram.len_of(Axis(0));
    let frames = spectrogram.len_of(Axis(1)).min(target_frames);
    let mut canvas = Array2::from_elem((bins, target_frames), pad_value);
    canvas
        .slice_mut(s![.., ..frames])
        .assign(&spectrogram.slice(s![.., ..frames]));
    canvas
}
