use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;

use super::pcm::SAMPLE_RATE;
use crate::error::VoiceResult;

/// One capture window of mono audio
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Position of this frame in the capture stream
    pub sequence: u64,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Capture sample rate (the socket contract requires 24kHz)
    pub sample_rate: u32,
    /// Samples per frame delivered to the capture pipeline
    pub buffer_size: usize,
    /// Deliver frames at the pace they would be recorded
    pub realtime: bool,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            buffer_size: 4096,
            realtime: true,
        }
    }
}

/// Audio input backend trait
///
/// Implementations:
/// - File: feed a WAV file as if it were spoken into the microphone
/// - Microphone: default input device via cpal (`cpal` feature)
#[async_trait::async_trait]
pub trait AudioBackend: Send {
    /// Ask for access to the input.
    ///
    /// Fails with [`crate::VoiceError::PermissionDenied`] when the user or the
    /// platform refuses.
    async fn request_access(&mut self) -> VoiceResult<()>;

    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the input
    async fn stop(&mut self) -> Result<()>;

    /// Check if the input stream is live
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend based on source and configuration
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::File(path) => Ok(Box::new(super::file::FileBackend::new(path, config))),

            AudioSource::Microphone => {
                #[cfg(feature = "cpal")]
                {
                    Ok(Box::new(super::microphone::MicrophoneBackend::new(config)))
                }

                #[cfg(not(feature = "cpal"))]
                {
                    anyhow::bail!("Microphone capture requires the `cpal` feature")
                }
            }
        }
    }
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Default microphone (`cpal` feature)
    Microphone,
    /// WAV file input (for testing/batch runs)
    File(PathBuf),
}
