use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::sink::{AudioSink, PlaybackDone};
use crate::audio::pcm;
use crate::error::{VoiceError, VoiceResult};

/// Sink that appends every chunk to a mono PCM16 WAV file
///
/// With `realtime` set, completion is reported after the chunk's duration
/// has elapsed, as a speaker would; otherwise immediately.
pub struct WavSink {
    path: PathBuf,
    sample_rate: u32,
    realtime: bool,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    samples_written: usize,
}

impl WavSink {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32, realtime: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .map_err(|e| VoiceError::Device(format!("cannot create {}: {}", path.display(), e)))?;

        info!("Writing replies to {}", path.display());

        Ok(Self {
            path,
            sample_rate,
            realtime,
            writer: Some(writer),
            samples_written: 0,
        })
    }

    pub fn samples_written(&self) -> usize {
        self.samples_written
    }

    /// Flush the WAV header and close the file
    pub fn finish(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }
        Ok(self.path.clone())
    }
}

impl AudioSink for WavSink {
    fn schedule(&mut self, samples: Vec<f32>, sample_rate: u32, done: PlaybackDone) -> VoiceResult<()> {
        if sample_rate != self.sample_rate {
            return Err(VoiceError::Playback(format!(
                "chunk is {}Hz but {} is {}Hz",
                sample_rate,
                self.path.display(),
                self.sample_rate
            )));
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| VoiceError::Playback("WAV file already finalized".into()))?;

        for &sample in &samples {
            writer
                .write_sample(pcm::sample_to_i16(sample))
                .map_err(|e| VoiceError::Playback(e.to_string()))?;
        }
        self.samples_written += samples.len();

        if self.realtime {
            let duration = Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64);
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                done.finish();
            });
        } else {
            done.finish();
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "wav"
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_chunks_appended_and_completed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reply.wav");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut sink = WavSink::create(&path, 24_000, false).unwrap();
        sink.schedule(vec![0.5; 100], 24_000, PlaybackDone::new(0, tx.clone())).unwrap();
        sink.schedule(vec![-0.5; 50], 24_000, PlaybackDone::new(1, tx)).unwrap();

        assert_eq!(rx.recv().await, Some(0));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(sink.samples_written(), 150);

        let written = sink.finish().unwrap();
        let reader = hound::WavReader::open(&written).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 150);
        assert_eq!(samples[0], pcm::sample_to_i16(0.5));
        assert_eq!(samples[149], -16384);
    }

    #[tokio::test]
    async fn test_rate_mismatch_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut sink = WavSink::create(dir.path().join("reply.wav"), 24_000, false).unwrap();
        let result = sink.schedule(vec![0.0; 10], 16_000, PlaybackDone::new(0, tx));

        assert!(matches!(result, Err(VoiceError::Playback(_))));
        assert_eq!(sink.samples_written(), 0);
    }

    #[test]
    fn test_unwritable_path_is_device_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing").join("reply.wav");

        let err = WavSink::create(&path, 24_000, false).err().unwrap();
        assert!(matches!(err.downcast_ref::<VoiceError>(), Some(VoiceError::Device(_))));
    }

    #[tokio::test]
    async fn test_realtime_completion_waits_for_duration() {
        let dir = tempfile::TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut sink = WavSink::create(dir.path().join("reply.wav"), 24_000, true).unwrap();
        sink.schedule(vec![0.0; 2_400], 24_000, PlaybackDone::new(7, tx)).unwrap();

        // 2400 samples at 24kHz is 100ms
        assert!(rx.try_recv().is_err());
        let done = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(done, Some(7));
    }
}
