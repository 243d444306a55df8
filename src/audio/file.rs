use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{VoiceError, VoiceResult};

/// A WAV file loaded as mono float samples
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    /// Channel count of the source file (samples are already mixed to mono)
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int if spec.bits_per_sample <= 16 => reader
                .into_samples::<i16>()
                .map(|s| s.map(super::pcm::sample_to_f32))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let channels = spec.channels.max(1);
        let samples = mix_to_mono(&interleaved, channels);
        let duration_seconds = samples.len() as f64 / spec.sample_rate as f64;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels,
            samples,
        })
    }
}

/// Average interleaved channels into one
fn mix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Capture backend that plays a WAV file into the pipeline
///
/// Each `start()` streams the file from the beginning. The stream goes
/// inactive once the file is exhausted and the frame channel closes.
pub struct FileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    audio: Option<Arc<AudioFile>>,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>, config: AudioBackendConfig) -> Self {
        Self {
            path: path.into(),
            config,
            audio: None,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    fn load(&mut self) -> Result<Arc<AudioFile>> {
        if let Some(audio) = &self.audio {
            return Ok(Arc::clone(audio));
        }

        let audio = AudioFile::open(&self.path)?;
        if audio.sample_rate != self.config.sample_rate {
            anyhow::bail!(
                "{} is {}Hz, expected {}Hz (resample it before streaming)",
                audio.path,
                audio.sample_rate,
                self.config.sample_rate
            );
        }

        let audio = Arc::new(audio);
        self.audio = Some(Arc::clone(&audio));
        Ok(audio)
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn request_access(&mut self) -> VoiceResult<()> {
        match self.load() {
            Ok(_) => Ok(()),
            Err(e) => Err(VoiceError::PermissionDenied(format!("{:#}", e))),
        }
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let audio = self.load()?;
        self.stop().await?;

        let (tx, rx) = mpsc::channel(64);
        let buffer_size = self.config.buffer_size.max(1);
        let sample_rate = self.config.sample_rate;
        let realtime = self.config.realtime;
        let capturing = Arc::clone(&self.capturing);

        capturing.store(true, Ordering::SeqCst);
        info!(
            "Streaming {} ({} samples per frame, realtime={})",
            audio.path, buffer_size, realtime
        );

        let task = tokio::spawn(async move {
            let frame_period =
                Duration::from_secs_f64(buffer_size as f64 / sample_rate as f64);
            let mut ticker = tokio::time::interval(frame_period);

            for (sequence, window) in audio.samples.chunks(buffer_size).enumerate() {
                if realtime {
                    ticker.tick().await;
                }

                let frame = AudioFrame {
                    samples: window.to_vec(),
                    sample_rate,
                    sequence: sequence as u64,
                    timestamp_ms: (sequence * buffer_size) as u64 * 1000 / sample_rate as u64,
                };

                if tx.send(frame).await.is_err() {
                    debug!("Frame receiver dropped, ending file stream");
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
            info!("File stream exhausted");
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("File stream task failed: {}", e);
                }
            }
        }
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}
