//! Acoustic feature extraction and dataset assembly for voice recordings.

pub mod audio;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod tracking;
pub mod types;

pub use error::{DecodeError, FeatureGroupError, Result, VoxsetError};
