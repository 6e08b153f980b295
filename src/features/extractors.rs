use ndarray::Array2;

use super::pitch::{self, PitchBounds};
use super::rhythm::{self, TEMPO_KEYS, TIMING_KEYS};
use super::{
    formants, intensity, mel, perturbation, ExtractorKind, ExtractorSettings, FeatureExtractor,
    FeatureSet, FormantSettings, MelSettings, PerturbationSettings,
};
use crate::audio::AudioLoader;
use crate::types::AudioData;

fn keys(groups: &[&[&str]]) -> Vec<String> {
    groups
        .iter()
        .flat_map(|group| group.iter().map(|key| key.to_string()))
        .collect()
}

/// Duration, speech rate, tempo and wide-range F0 statistics.
#[derive(Debug, Clone)]
pub struct ProsodyExtractor {
    loader: AudioLoader,
    words_per_utterance: f64,
    pitch: PitchBounds,
}

impl ProsodyExtractor {
    pub fn new(settings: &ExtractorSettings) -> Self {
        Self {
            loader: settings.loader(),
            words_per_utterance: settings.words_per_utterance,
            pitch: PitchBounds {
                floor: settings.pitch.floor.unwrap_or(10.0),
                ceiling: settings.pitch.ceiling.unwrap_or(8000.0),
                frame_length: settings.pitch.frame_length,
            },
        }
    }
}

impl FeatureExtractor for ProsodyExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Prosody
    }

    fn schema(&self) -> Vec<String> {
        keys(&[&TIMING_KEYS[..], &TEMPO_KEYS[..], &pitch::KEYS[..]])
    }

    fn loader(&self) -> &AudioLoader {
        &self.loader
    }

    fn extract_audio(&self, audio: &AudioData) -> FeatureSet {
        let mut set = FeatureSet::new();
        set.group("timing", &TIMING_KEYS, || {
            rhythm::timing(audio, self.words_per_utterance)
        });
        set.group("tempo", &TEMPO_KEYS, || rhythm::tempo(audio));
        set.group("pitch", &pitch::KEYS, || pitch::compute(audio, self.pitch));
        set
    }
}

/// Voice-quality measures: F0 statistics, formants, intensity, jitter and
/// shimmer, plus timing.
#[derive(Debug, Clone)]
pub struct VoiceExtractor {
    loader: AudioLoader,
    words_per_utterance: f64,
    pitch: PitchBounds,
    formants: FormantSettings,
    perturbation: PerturbationSettings,
}

impl VoiceExtractor {
    pub fn new(settings: &ExtractorSettings) -> Self {
        Self {
            loader: settings.loader(),
            words_per_utterance: settings.words_per_utterance,
            pitch: PitchBounds {
                floor: settings.pitch.floor.unwrap_or(75.0),
                ceiling: settings.pitch.ceiling.unwrap_or(600.0),
                frame_length: settings.pitch.frame_length,
            },
            formants: settings.formants,
            perturbation: settings.perturbation,
        }
    }
}

impl FeatureExtractor for VoiceExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Voice
    }

    fn schema(&self) -> Vec<String> {
        keys(&[
            &pitch::KEYS[..],
            &formants::KEYS[..],
            &intensity::KEYS[..],
            &perturbation::KEYS[..],
            &TIMING_KEYS[..],
        ])
    }

    fn loader(&self) -> &AudioLoader {
        &self.loader
    }

    fn extract_audio(&self, audio: &AudioData) -> FeatureSet {
        let mut set = FeatureSet::new();
        set.group("pitch", &pitch::KEYS, || pitch::compute(audio, self.pitch));
        set.group("formants", &formants::KEYS, || {
            formants::compute(audio, self.formants)
        });
        // Intensity frames are sized for the lowest expected pitch.
        set.group("intensity", &intensity::KEYS, || {
            intensity::compute(audio, self.pitch.floor)
        });
        set.group("perturbation", &perturbation::KEYS, || {
            perturbation::compute(audio, self.perturbation)
        });
        set.group("timing", &TIMING_KEYS, || {
            rhythm::timing(audio, self.words_per_utterance)
        });
        set
    }
}

/// Per-band mean mel strength plus a fixed-shape log-power spectrogram.
#[derive(Debug, Clone)]
pub struct MelExtractor {
    loader: AudioLoader,
    settings: MelSettings,
}

impl MelExtractor {
    pub fn new(settings: &ExtractorSettings) -> Self {
        Self {
            loader: settings.loader(),
            settings: settings.mel,
        }
    }

    /// Spectrogram shape `(n_mels, frames)` at the loader's sample rate.
    pub fn spectrogram_shape(&self) -> (usize, usize) {
        (
            self.settings.n_mels,
            self.settings.target_frames(self.loader.target_sample_rate()),
        )
    }
}

impl FeatureExtractor for MelExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Mel
    }

    fn schema(&self) -> Vec<String> {
        mel::strength_keys(self.settings.n_mels)
    }

    fn loader(&self) -> &AudioLoader {
        &self.loader
    }

    fn empty_spectrogram(&self) -> Option<Array2<f32>> {
        Some(Array2::from_elem(
            self.spectrogram_shape(),
            self.settings.pad_db,
        ))
    }

    fn extract_audio(&self, audio: &AudioData) -> FeatureSet {
        let mut set = FeatureSet::new();
        let mut spectrogram = None;
        let keys = self.schema();
        set.group("spectral", &keys, || {
            let summary = mel::compute(audio, self.settings)?;
            spectrogram = Some(summary.spectrogram);
            Ok(summary.strength)
        });
        if let Some(spectrogram) = spectrogram.or_else(|| self.empty_spectrogram()) {
            set.set_spectrogram(spectrogram);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tone(freq: f32, seconds: f32) -> AudioData {
        let rate = 16_000;
        let step = 2.0 * std::f32::consts::PI * freq / rate as f32;
        let len = (seconds * rate as f32) as usize;
        let samples = (0..len).map(|i| 0.4 * (step * i as f32).sin()).collect();
        AudioData::new(samples, rate)
    }

    fn names(set: &FeatureSet) -> Vec<String> {
        set.features().iter().map(|f| f.name.clone()).collect()
    }

    #[test]
    fn schemas_have_unique_keys() {
        let settings = ExtractorSettings::default();
        for kind in [ExtractorKind::Prosody, ExtractorKind::Voice, ExtractorKind::Mel] {
            let schema = kind.build(&settings).schema();
            let unique: HashSet<&String> = schema.iter().collect();
            assert_eq!(unique.len(), schema.len(), "{kind:?}");
        }
    }

    #[test]
    fn silent_audio_still_yields_full_key_set() {
        let settings = ExtractorSettings::default();
        let audio = AudioData::new(vec![0.0; 8_000], 16_000);
        for kind in [ExtractorKind::Prosody, ExtractorKind::Voice] {
            let extractor = kind.build(&settings);
            let set = extractor.extract_audio(&audio);
            assert_eq!(names(&set), extractor.schema());
        }
    }

    #[test]
    fn tiny_signal_keeps_schema_when_groups_fail() {
        let extractor = VoiceExtractor::new(&ExtractorSettings::default());
        let audio = AudioData::new(vec![0.1; 10], 16_000);
        let set = extractor.extract_audio(&audio);
        assert_eq!(names(&set), extractor.schema());
        assert!(set
            .features()
            .iter()
            .filter(|f| f.name.starts_with("f1"))
            .all(|f| f.value.is_none()));
        assert!(!set.failures().is_empty());
    }

    #[test]
    fn voice_timing_matches_duration() {
        let extractor = VoiceExtractor::new(&ExtractorSettings::default());
        let set = extractor.extract_audio(&tone(220.0, 1.5));
        let duration = set
            .features()
            .iter()
            .find(|f| f.name == "duration")
            .and_then(|f| f.value)
            .unwrap();
        assert!((duration - 1.5).abs() < 1e-6);
    }

    #[test]
    fn mel_spectrogram_has_fixed_shape() {
        let extractor = MelExtractor::new(&ExtractorSettings::default());
        for seconds in [0.5, 4.0] {
            let set = extractor.extract_audio(&tone(440.0, seconds));
            let spectrogram = set.spectrogram.as_ref().unwrap();
            assert_eq!(spectrogram.dim(), (128, 93));
        }
    }

    #[test]
    fn mel_failure_keeps_padded_spectrogram() {
        let extractor = MelExtractor::new(&ExtractorSettings::default());
        let set = extractor.extract_audio(&AudioData::new(Vec::new(), 16_000));
        assert_eq!(set.features().len(), 128);
        let spectrogram = set.spectrogram.as_ref().unwrap();
        assert!(spectrogram.iter().all(|&v| v == -80.0));
    }
}
