use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::{Corpus, DataConfig};
use crate::dataset::MetadataSource;
use crate::features::{ExtractorKind, ExtractorSettings};

#[derive(Parser, Debug)]
#[command(
    name = "voxset",
    version,
    about = "Build acoustic feature datasets from voice recordings"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract features for a directory of recordings and join metadata.
    Build(BuildArgs),
    /// Print the feature record of a single file as JSON.
    Extract(ExtractArgs),
    /// Check whether two dataset files are identical.
    Compare(CompareArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// JSON configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Start from a corpus preset when no configuration file is given.
    #[arg(long, value_enum, conflicts_with = "config")]
    pub corpus: Option<CorpusArg>,
    /// Directory containing the recordings.
    #[arg(long = "base-dir", value_name = "DIR")]
    pub base_dir: Option<PathBuf>,
    /// Output file, or a directory for a timestamped file.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
    /// Evaluation table (tab-delimited).
    #[arg(long = "eval", value_name = "PATH")]
    pub evaluation: Option<PathBuf>,
    /// Participant table (comma-delimited).
    #[arg(long, value_name = "PATH")]
    pub participants: Option<PathBuf>,
    /// Worker threads used for extraction.
    #[arg(long)]
    pub jobs: Option<usize>,
    /// Directory that receives one subdirectory per run.
    #[arg(long = "runs-dir", value_name = "DIR")]
    pub runs_dir: Option<PathBuf>,
    /// Skip files whose name contains the segment marker.
    #[arg(long = "exclude-segments")]
    pub exclude_segments: bool,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusArg {
    Sentence,
    Vowel,
    Librosa,
}

impl From<CorpusArg> for Corpus {
    fn from(value: CorpusArg) -> Self {
        match value {
            CorpusArg::Sentence => Corpus::Sentence,
            CorpusArg::Vowel => Corpus::Vowel,
            CorpusArg::Librosa => Corpus::Librosa,
        }
    }
}

impl BuildArgs {
    /// Configuration from file or preset with command-line overrides applied.
    pub fn data_config(&self) -> Result<DataConfig> {
        let mut config = match (&self.config, self.corpus) {
            (Some(path), _) => DataConfig::load(path)?,
            (None, Some(corpus)) => DataConfig::preset(corpus.into()),
            (None, None) => DataConfig::default(),
        };
        if let Some(dir) = &self.base_dir {
            config.base_dir = Some(dir.clone());
        }
        if let Some(output) = &self.output {
            config.output = Some(output.clone());
        }
        if let Some(runs_dir) = &self.runs_dir {
            config.runs_dir = Some(runs_dir.clone());
        }
        if let Some(jobs) = self.jobs {
            config.assembler.jobs = jobs;
        }
        if self.exclude_segments {
            config.assembler.exclude_segments = true;
        }
        if let Some(path) = &self.evaluation {
            let source = config
                .assembler
                .evaluation
                .get_or_insert_with(|| MetadataSource::evaluation(PathBuf::new()));
            source.path = path.clone();
        }
        if let Some(path) = &self.participants {
            let source = config
                .assembler
                .participants
                .get_or_insert_with(|| MetadataSource::participants(PathBuf::new(), "label"));
            source.path = path.clone();
        }
        config.validate().context("invalid build configuration")?;
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Audio file to analyse.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
    /// Extractor variant: prosody, voice or mel.
    #[arg(long, default_value = "prosody")]
    pub extractor: ExtractorKind,
    /// Sample rate the audio is resampled to.
    #[arg(long = "sample-rate", default_value_t = 16_000)]
    pub sample_rate: u32,
    /// Leave out the spectrogram from the printed record.
    #[arg(long = "no-spectrogram")]
    pub no_spectrogram: bool,
}

impl ExtractArgs {
    pub fn settings(&self) -> ExtractorSettings {
        ExtractorSettings {
            kind: self.extractor,
            sample_rate: self.sample_rate,
            ..ExtractorSettings::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[arg(value_name = "LEFT")]
    pub left: PathBuf,
    #[arg(value_name = "RIGHT")]
    pub right: PathBuf,
    /// Field delimiter of both files.
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,
}
