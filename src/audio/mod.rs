pub mod backend;
pub mod file;
pub mod pcm;

#[cfg(feature = "cpal")]
pub mod microphone;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use file::{AudioFile, FileBackend};
pub use pcm::SAMPLE_RATE;
