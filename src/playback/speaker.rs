//! Speaker output via cpal

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use tracing::{debug, error, info};

use super::sink::{AudioSink, PlaybackDone};
use crate::error::{VoiceError, VoiceResult};

/// The chunk currently being rendered by the output callback
#[derive(Default)]
struct Rendering {
    samples: VecDeque<f32>,
    done: Option<PlaybackDone>,
}

/// Sink that plays chunks on the default output device
pub struct SpeakerSink {
    sample_rate: u32,
    current: Arc<Mutex<Rendering>>,
    stop_tx: Option<std_mpsc::Sender<()>>,
}

impl SpeakerSink {
    /// Start the output stream on its own thread
    ///
    /// The thread is detached; dropping the sink tells it to close the stream.
    pub async fn open(sample_rate: u32) -> Result<Self> {
        let current = Arc::new(Mutex::new(Rendering::default()));
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), String>>();
        let shared = Arc::clone(&current);

        std::thread::spawn(move || {
            let stream = match build_stream(sample_rate, shared) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("{:#}", e)));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            let _ = stop_rx.recv();
            drop(stream);
            debug!("Speaker stream closed");
        });

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .context("Speaker startup task failed")?
            .context("Speaker thread exited during startup")?;

        if let Err(e) = ready {
            return Err(VoiceError::Device(format!("failed to open speaker: {}", e)).into());
        }

        info!("Speaker output started at {}Hz", sample_rate);

        Ok(Self {
            sample_rate,
            current,
            stop_tx: Some(stop_tx),
        })
    }
}

impl AudioSink for SpeakerSink {
    fn schedule(&mut self, samples: Vec<f32>, sample_rate: u32, done: PlaybackDone) -> VoiceResult<()> {
        if sample_rate != self.sample_rate {
            return Err(VoiceError::Playback(format!(
                "chunk is {}Hz, speaker runs at {}Hz",
                sample_rate, self.sample_rate
            )));
        }

        let mut current = self
            .current
            .lock()
            .map_err(|_| VoiceError::Playback("speaker state poisoned".into()))?;

        if samples.is_empty() {
            done.finish();
            return Ok(());
        }

        current.samples.extend(samples);
        current.done = Some(done);
        Ok(())
    }

    fn name(&self) -> &str {
        "speaker"
    }
}

impl Drop for SpeakerSink {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

fn build_stream(sample_rate: u32, current: Arc<Mutex<Rendering>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("No output device available")?;

    let stream_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut rendering) = current.lock() else {
                    data.fill(0.0);
                    return;
                };

                for sample in data.iter_mut() {
                    *sample = rendering.samples.pop_front().unwrap_or(0.0);
                }

                if rendering.samples.is_empty() {
                    if let Some(done) = rendering.done.take() {
                        done.finish();
                    }
                }
            },
            move |err| {
                error!("Audio playback error: {}", err);
            },
            None,
        )
        .context("Failed to build output stream")?;

    stream.play().context("Failed to start output stream")?;
    Ok(stream)
}
