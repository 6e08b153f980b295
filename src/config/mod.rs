use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::{AssemblerSettings, Layout, MetadataSource};
use crate::features::{ExtractorKind, ExtractorSettings};

/// Recording corpora with known file naming and metadata conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corpus {
    /// `F-1_VoiceSentence2(Hour).wav` files in one directory.
    Sentence,
    /// `F-1_VoiceVowel.wav` files one directory level down.
    Vowel,
    /// Sentence recordings joined with participants only, one row per participant.
    Librosa,
}

/// Everything one dataset build needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub corpus: Option<Corpus>,
    pub dataset_name: String,
    pub description: String,
    pub base_dir: Option<PathBuf>,
    /// Output file, or a directory that receives a timestamped file.
    pub output: Option<PathBuf>,
    pub delimiter: char,
    /// Local run store; runs are only traced when unset.
    pub runs_dir: Option<PathBuf>,
    pub extractor: ExtractorSettings,
    pub assembler: AssemblerSettings,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            corpus: None,
            dataset_name: "voice_features".to_string(),
            description: String::new(),
            base_dir: None,
            output: None,
            delimiter: ',',
            runs_dir: None,
            extractor: ExtractorSettings::default(),
            assembler: AssemblerSettings::default(),
        }
    }
}

impl DataConfig {
    /// Defaults for a corpus; metadata paths are left for the caller to set.
    pub fn preset(corpus: Corpus) -> Self {
        let mut config = DataConfig {
            corpus: Some(corpus),
            ..DataConfig::default()
        };
        let assembler = &mut config.assembler;
        match corpus {
            Corpus::Sentence => {
                config.dataset_name = "sentence_features".to_string();
                config.description =
                    "Sentence recordings with evaluation and participant data".to_string();
                assembler.sample_suffix = Some("_VoiceSentence2(Hour).wav".to_string());
                assembler.evaluation = Some(MetadataSource::evaluation(PathBuf::new()));
                assembler.participants =
                    Some(MetadataSource::participants(PathBuf::new(), "label"));
            }
            Corpus::Vowel => {
                config.dataset_name = "vowel_features".to_string();
                config.description =
                    "Sustained vowel recordings with evaluation and participant data".to_string();
                config.extractor.kind = ExtractorKind::Voice;
                assembler.layout = Layout::Nested;
                assembler.sample_suffix = Some("_VoiceVowel.wav".to_string());
                assembler.evaluation = Some(MetadataSource::evaluation(PathBuf::new()));
                assembler.participants =
                    Some(MetadataSource::participants(PathBuf::new(), "sample_name"));
                assembler.file_pattern = Some(r"^[FM]-\d+_VoiceVowel\.wav$".to_string());
            }
            Corpus::Librosa => {
                config.dataset_name = "audio_features_librosa_dataset".to_string();
                config.description =
                    "Prosodic features joined with participant information".to_string();
                let mut participants = MetadataSource::participants(PathBuf::new(), "label");
                participants.columns = None;
                participants.one_to_one = true;
                assembler.participants = Some(participants);
                assembler.gender_column = true;
                assembler.drop_columns = [
                    "Participant",
                    "Sex",
                    "CollectionDate",
                    "Experimenter",
                    "RESTRICTION OF USE",
                ]
                .into_iter()
                .map(String::from)
                .collect();
            }
        }
        config
    }

    /// Parse JSON. When it names a `corpus`, the document is laid over that
    /// corpus preset, so only differing fields need to be given.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let overlay: Value =
            serde_json::from_str(text).context("configuration is not valid JSON")?;
        let corpus = match overlay.get("corpus") {
            Some(Value::Null) | None => None,
            Some(value) => Some(
                serde_json::from_value::<Corpus>(value.clone())
                    .context("unknown corpus in configuration")?,
            ),
        };
        let base = match corpus {
            Some(corpus) => DataConfig::preset(corpus),
            None => DataConfig::default(),
        };
        let mut merged = serde_json::to_value(base)?;
        merge(&mut merged, overlay);
        serde_json::from_value(merged).context("configuration does not match the expected layout")
    }

    /// Load from a file. Relative paths are taken relative to the file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {:?}", path))?;
        let mut config = Self::from_json_str(&text)
            .with_context(|| format!("failed to load configuration {:?}", path))?;
        if let Some(root) = path.parent() {
            config.resolve_relative_to(root);
        }
        Ok(config)
    }

    pub fn resolve_relative_to(&mut self, root: &Path) {
        let resolve = |path: &mut PathBuf| {
            if !path.as_os_str().is_empty() && path.is_relative() {
                *path = root.join(&*path);
            }
        };
        for path in [&mut self.base_dir, &mut self.output, &mut self.runs_dir]
            .into_iter()
            .flatten()
        {
            resolve(path);
        }
        for source in [&mut self.assembler.evaluation, &mut self.assembler.participants]
            .into_iter()
            .flatten()
        {
            resolve(&mut source.path);
        }
    }

    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                anyhow!(
                    "delimiter {:?} is not a single ASCII character",
                    self.delimiter
                )
            })
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.dataset_name.trim().is_empty(), "dataset_name must not be empty");
        ensure!(self.base_dir.is_some(), "base_dir must be set (config or --base-dir)");
        ensure!(self.output.is_some(), "output must be set (config or --output)");
        self.delimiter_byte()?;
        self.extractor.validate().map_err(|err| anyhow!(err))?;
        ensure!(self.assembler.jobs >= 1, "jobs must be at least 1");
        ensure!(!self.assembler.extension.is_empty(), "extension must not be empty");
        for (name, source) in [
            ("evaluation", &self.assembler.evaluation),
            ("participants", &self.assembler.participants),
        ] {
            if let Some(source) = source {
                ensure!(
                    !source.path.as_os_str().is_empty(),
                    "{name}.path must be set"
                );
                ensure!(!source.join_on.is_empty(), "{name}.join_on must not be empty");
            }
        }
        Ok(())
    }
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (slot, value) => *slot = value,
    }
}
