//! Per-file acoustic feature extraction.
//!
//! Every extractor variant produces a [`FeatureRecord`] whose key set is fixed
//! by the variant. Features are computed in independent groups; a group that
//! fails (or panics inside the DSP code) contributes missing values for its
//! keys and never prevents the other groups from running.

mod dsp;
mod extractors;
mod formants;
mod intensity;
mod mel;
mod perturbation;
mod pitch;
mod rhythm;
pub mod resize;
mod stats;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::AudioLoader;
use crate::error::{DecodeError, FeatureGroupError};
use crate::types::AudioData;

pub use extractors::{MelExtractor, ProsodyExtractor, VoiceExtractor};
pub use formants::FormantSettings;
pub use mel::MelSettings;
pub use perturbation::PerturbationSettings;
pub use resize::resize;

/// One named feature value; `None` is the missing sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    pub name: String,
    pub value: Option<f64>,
}

/// One row of features for a single audio file.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureRecord {
    pub file: String,
    pub label: String,
    pub features: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectrogram: Option<Array2<f32>>,
}

impl FeatureRecord {
    fn from_set(file: String, label: String, set: FeatureSet) -> Self {
        Self {
            file,
            label,
            features: set.features,
            spectrogram: set.spectrogram,
        }
    }

    /// Record with every schema key present and missing.
    pub fn missing(
        file: impl Into<String>,
        label: impl Into<String>,
        schema: Vec<String>,
        spectrogram: Option<Array2<f32>>,
    ) -> Self {
        Self {
            file: file.into(),
            label: label.into(),
            features: schema
                .into_iter()
                .map(|name| Feature { name, value: None })
                .collect(),
            spectrogram,
        }
    }

    pub fn get(&self, name: &str) -> Option<Option<f64>> {
        self.features
            .iter()
            .find(|feature| feature.name == name)
            .map(|feature| feature.value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|feature| feature.name.as_str())
    }
}

/// Accumulates group outputs in schema order.
#[derive(Debug, Default)]
pub struct FeatureSet {
    features: Vec<Feature>,
    failures: Vec<FeatureGroupError>,
    spectrogram: Option<Array2<f32>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one feature group in isolation. On error or panic every key of the
    /// group is filled with the missing sentinel.
    pub fn group<K, F>(&mut self, group: &'static str, keys: &[K], compute: F)
    where
        K: AsRef<str>,
        F: FnOnce() -> Result<Vec<Option<f64>>, FeatureGroupError>,
    {
        let outcome = match catch_unwind(AssertUnwindSafe(compute)) {
            Ok(Ok(values)) if values.len() == keys.len() => Ok(values),
            Ok(Ok(values)) => Err(FeatureGroupError::new(
                group,
                format!("produced {} values for {} keys", values.len(), keys.len()),
            )),
            Ok(Err(err)) => Err(err),
            Err(payload) => Err(FeatureGroupError::new(group, panic_message(payload.as_ref()))),
        };
        let values = match outcome {
            Ok(values) => values,
            Err(err) => {
                self.failures.push(err);
                vec![None; keys.len()]
            }
        };
        self.features
            .extend(keys.iter().zip(values).map(|(key, value)| Feature {
                name: key.as_ref().to_string(),
                value: value.filter(|v| v.is_finite()),
            }));
    }

    pub fn set_spectrogram(&mut self, spectrogram: Array2<f32>) {
        self.spectrogram = Some(spectrogram);
    }

    pub fn failures(&self) -> &[FeatureGroupError] {
        &self.failures
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Capability interface shared by all extractor variants.
pub trait FeatureExtractor: Send + Sync {
    fn kind(&self) -> ExtractorKind;

    /// Ordered, total key set of every record this extractor produces.
    fn schema(&self) -> Vec<String>;

    fn loader(&self) -> &AudioLoader;

    /// Compute all feature groups for an already loaded signal.
    fn extract_audio(&self, audio: &AudioData) -> FeatureSet;

    /// Fixed-shape spectrogram attached to records that carry one.
    fn empty_spectrogram(&self) -> Option<Array2<f32>> {
        None
    }

    /// Load and extract; only decoding can fail.
    fn try_extract(&self, path: &Path, label: &str) -> Result<FeatureRecord, DecodeError> {
        let audio = self.loader().load(path)?;
        let set = self.extract_audio(&audio);
        let file = file_name(path);
        for failure in set.failures() {
            warn!(file = %file, group = failure.group, error = %failure, "feature group failed");
        }
        Ok(FeatureRecord::from_set(file, label.to_string(), set))
    }

    /// Best-effort extraction: a file that cannot be decoded yields the
    /// all-missing record.
    fn extract(&self, path: &Path, label: &str) -> FeatureRecord {
        match self.try_extract(path, label) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    file = %path.display(),
                    error = %err,
                    "extraction failed; emitting missing record"
                );
                FeatureRecord::missing(
                    file_name(path),
                    label,
                    self.schema(),
                    self.empty_spectrogram(),
                )
            }
        }
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Label convention: the file stem up to its first underscore.
pub fn label_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.split('_').next().unwrap_or_default().to_string()
}

/// Extractor variant tag, selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// Duration, speech rate, tempo and coarse F0 statistics.
    #[default]
    Prosody,
    /// F0 statistics, formants, intensity, jitter and shimmer.
    Voice,
    /// Fixed-shape log-power mel spectrogram and per-band mean strength.
    Mel,
}

impl ExtractorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorKind::Prosody => "prosody",
            ExtractorKind::Voice => "voice",
            ExtractorKind::Mel => "mel",
        }
    }

    /// Version tag of the variant's key set.
    pub fn schema_version(&self) -> &'static str {
        match self {
            ExtractorKind::Prosody => "prosody-v1",
            ExtractorKind::Voice => "voice-v1",
            ExtractorKind::Mel => "mel-v1",
        }
    }

    pub fn build(&self, settings: &ExtractorSettings) -> Box<dyn FeatureExtractor> {
        match self {
            ExtractorKind::Prosody => Box::new(ProsodyExtractor::new(settings)),
            ExtractorKind::Voice => Box::new(VoiceExtractor::new(settings)),
            ExtractorKind::Mel => Box::new(MelExtractor::new(settings)),
        }
    }
}

impl std::str::FromStr for ExtractorKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "prosody" | "librosa" => Ok(ExtractorKind::Prosody),
            "voice" | "praat" => Ok(ExtractorKind::Voice),
            "mel" => Ok(ExtractorKind::Mel),
            other => Err(format!("unknown extractor `{other}`")),
        }
    }
}

/// Pitch tracker bounds; unset bounds take the variant's default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchSettings {
    pub floor: Option<f64>,
    pub ceiling: Option<f64>,
    pub frame_length: usize,
}

impl Default for PitchSettings {
    fn default() -> Self {
        Self {
            floor: None,
            ceiling: None,
            frame_length: 1024,
        }
    }
}

/// Extractor configuration shared by all variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    pub kind: ExtractorKind,
    pub sample_rate: u32,
    /// Audio beyond this many seconds is discarded on load.
    pub max_load_duration: Option<f64>,
    /// Words spoken in the fixed utterance script.
    pub words_per_utterance: f64,
    pub pitch: PitchSettings,
    pub formants: FormantSettings,
    pub perturbation: PerturbationSettings,
    pub mel: MelSettings,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            kind: ExtractorKind::default(),
            sample_rate: 16_000,
            max_load_duration: None,
            words_per_utterance: 6.0,
            pitch: PitchSettings::default(),
            formants: FormantSettings::default(),
            perturbation: PerturbationSettings::default(),
            mel: MelSettings::default(),
        }
    }
}

impl ExtractorSettings {
    pub fn loader(&self) -> AudioLoader {
        AudioLoader::new(self.sample_rate).with_max_duration(self.max_load_duration)
    }

    pub fn build(&self) -> Box<dyn FeatureExtractor> {
        self.kind.build(self)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample_rate must be positive".to_string());
        }
        if !(self.words_per_utterance > 0.0) {
            return Err("words_per_utterance must be positive".to_string());
        }
        if self.pitch.frame_length == 0 {
            return Err("pitch.frame_length must be positive".to_string());
        }
        if self.mel.hop_length == 0 || self.mel.n_fft == 0 || self.mel.n_mels == 0 {
            return Err("mel n_fft, hop_length and n_mels must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_group_fills_every_key() {
        let mut set = FeatureSet::new();
        set.group("ok", &["a"], || Ok(vec![Some(1.0)]));
        set.group("broken", &["b", "c"], || {
            Err(FeatureGroupError::new("broken", "numerically unstable"))
        });
        set.group("after", &["d"], || Ok(vec![Some(4.0)]));
        let names: Vec<&str> = set.features().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(set.features()[1].value, None);
        assert_eq!(set.features()[3].value, Some(4.0));
        assert_eq!(set.failures().len(), 1);
    }

    #[test]
    fn panicking_group_is_isolated() {
        let mut set = FeatureSet::new();
        set.group("panics", &["x"], || -> Result<Vec<Option<f64>>, FeatureGroupError> {
            panic!("index out of bounds")
        });
        set.group("fine", &["y"], || Ok(vec![Some(2.0)]));
        assert_eq!(set.features()[0].value, None);
        assert_eq!(set.features()[1].value, Some(2.0));
        assert!(set.failures()[0].reason.contains("index out of bounds"));
    }

    #[test]
    fn wrong_value_count_is_group_failure() {
        let mut set = FeatureSet::new();
        set.group("short", &["a", "b"], || Ok(vec![Some(1.0)]));
        assert_eq!(set.features().len(), 2);
        assert!(set.features().iter().all(|f| f.value.is_none()));
    }

    #[test]
    fn non_finite_values_become_missing() {
        let mut set = FeatureSet::new();
        set.group("nan", &["a"], || Ok(vec![Some(f64::NAN)]));
        assert_eq!(set.features()[0].value, None);
    }

    #[test]
    fn label_is_text_before_first_underscore() {
        assert_eq!(label_from_path(Path::new("/data/F-12_VoiceVowel.wav")), "F-12");
        assert_eq!(label_from_path(Path::new("M-3.wav")), "M-3");
    }

    #[test]
    fn kind_parses_legacy_names() {
        assert_eq!("praat".parse::<ExtractorKind>().unwrap(), ExtractorKind::Voice);
        assert_eq!("librosa".parse::<ExtractorKind>().unwrap(), ExtractorKind::Prosody);
        assert!("wavelet".parse::<ExtractorKind>().is_err());
    }
}
