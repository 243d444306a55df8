//! Microphone capture via cpal
//!
//! cpal streams are not `Send` on every platform, so the stream lives on a
//! dedicated thread for as long as capture is active.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{VoiceError, VoiceResult};

pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn request_access(&mut self) -> VoiceResult<()> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| VoiceError::PermissionDenied("No input device available".into()))?;

        // Most platforms refuse to enumerate configs until access is granted
        device
            .supported_input_configs()
            .map_err(|e| VoiceError::PermissionDenied(e.to_string()))?;

        info!("Microphone available: {:?}", device.name());
        Ok(())
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        self.stop().await?;

        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), String>>();

        let config = self.config.clone();
        let capturing = Arc::clone(&self.capturing);

        let thread = std::thread::spawn(move || {
            let stream = match build_stream(&config, frame_tx) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("{:#}", e)));
                    return;
                }
            };

            capturing.store(true, Ordering::SeqCst);
            let _ = ready_tx.send(Ok(()));

            // Park until stop() or the backend is dropped
            let _ = stop_rx.recv();
            drop(stream);
            capturing.store(false, Ordering::SeqCst);
            debug!("Microphone stream closed");
        });

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .context("Microphone startup task failed")?
            .context("Microphone thread exited during startup")?;

        if let Err(e) = ready {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
            return Err(VoiceError::Device(format!("failed to open microphone: {}", e)).into());
        }

        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);
        info!("Microphone capture started");
        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("Microphone shutdown task failed")?;
            if joined.is_err() {
                warn!("Microphone thread panicked");
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

fn build_stream(config: &AudioBackendConfig, frame_tx: mpsc::Sender<AudioFrame>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("No input device available")?;

    let stream_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let buffer_size = config.buffer_size.max(1);
    let sample_rate = config.sample_rate;
    let started = Instant::now();
    let mut pending: Vec<f32> = Vec::with_capacity(buffer_size);
    let mut sequence = 0u64;

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    pending.push(sample);
                    if pending.len() == buffer_size {
                        let frame = AudioFrame {
                            samples: std::mem::replace(&mut pending, Vec::with_capacity(buffer_size)),
                            sample_rate,
                            sequence,
                            timestamp_ms: started.elapsed().as_millis() as u64,
                        };
                        sequence += 1;
                        if frame_tx.try_send(frame).is_err() {
                            debug!("Capture channel full, dropping frame");
                        }
                    }
                }
            },
            move |err| {
                error!("Audio capture error: {}", err);
            },
            None,
        )
        .context("Failed to build input stream")?;

    stream.play().context("Failed to start input stream")?;
    Ok(stream)
}
