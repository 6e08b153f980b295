pub mod decoder;
pub mod loader;
pub mod resample;

pub use loader::AudioLoader;
