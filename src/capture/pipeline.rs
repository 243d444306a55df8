use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::{pcm, AudioBackend, AudioFrame};
use crate::socket::{ClientMessage, Outbound};

/// What happened to one captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Sent as `audio_data`
    Sent,
    /// Socket not open; the frame is lost
    Dropped,
    /// Capture is stopped; the frame was not processed
    Inactive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub commits: u64,
}

/// Forwards microphone frames to the socket while the talk control is held
///
/// The input stream outlives individual turns: `stop()` only stops
/// processing, so the next `start()` does not have to reacquire the device.
pub struct CapturePipeline {
    backend: Box<dyn AudioBackend>,
    frames: Option<mpsc::Receiver<AudioFrame>>,
    active: bool,
    stats: CaptureStats,
}

impl CapturePipeline {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            frames: None,
            active: false,
            stats: CaptureStats::default(),
        }
    }

    pub fn backend_mut(&mut self) -> &mut dyn AudioBackend {
        self.backend.as_mut()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Begin forwarding frames, reacquiring the input stream if it went away
    ///
    /// Callers must have checked microphone permission first.
    pub async fn start(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }

        if self.frames.is_none() || !self.backend.is_capturing() {
            info!("Acquiring {} input", self.backend.name());
            let frames = self
                .backend
                .start()
                .await
                .context("Failed to start audio capture")?;
            self.frames = Some(frames);
        }

        self.active = true;
        info!("Capture started");
        Ok(())
    }

    /// Stop forwarding frames and, if connected, commit the utterance
    ///
    /// Returns whether a `commit` was sent. A no-op when not started.
    pub fn stop(&mut self, socket: &mut dyn Outbound) -> bool {
        if !self.active {
            debug!("Capture already stopped");
            return false;
        }
        self.active = false;
        info!("Capture stopped");

        if !socket.is_open() {
            return false;
        }

        match socket.send(ClientMessage::Commit) {
            Ok(()) => {
                self.stats.commits += 1;
                true
            }
            Err(e) => {
                warn!("Failed to send commit: {}", e);
                false
            }
        }
    }

    /// Encode one frame and send it if the socket is open
    pub fn process_frame(&mut self, frame: &AudioFrame, socket: &mut dyn Outbound) -> FrameOutcome {
        if !self.active {
            return FrameOutcome::Inactive;
        }

        if !socket.is_open() {
            self.stats.frames_dropped += 1;
            return FrameOutcome::Dropped;
        }

        let audio = pcm::encode_base64(&frame.samples);
        match socket.send(ClientMessage::AudioData { audio }) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                debug!("Sent frame {} ({} samples)", frame.sequence, frame.samples.len());
                FrameOutcome::Sent
            }
            Err(e) => {
                debug!("Dropping frame {}: {}", frame.sequence, e);
                self.stats.frames_dropped += 1;
                FrameOutcome::Dropped
            }
        }
    }

    /// Next frame from the input stream
    ///
    /// Pending forever while no stream is held. Returns `None` once when the
    /// stream ends, after which the stream counts as released.
    pub async fn next_frame(&mut self) -> Option<AudioFrame> {
        let Some(frames) = self.frames.as_mut() else {
            return std::future::pending().await;
        };

        match frames.recv().await {
            Some(frame) => Some(frame),
            None => {
                self.frames = None;
                None
            }
        }
    }

    /// Tear down the input stream (session end)
    pub async fn release(&mut self) -> Result<()> {
        self.active = false;
        self.frames = None;
        self.backend.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{VoiceError, VoiceResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Backend that hands out a fresh channel each start
    struct TestBackend {
        starts: Arc<AtomicUsize>,
        capturing: bool,
        tx: Option<mpsc::Sender<AudioFrame>>,
    }

    impl TestBackend {
        fn new() -> Self {
            Self { starts: Arc::new(AtomicUsize::new(0)), capturing: false, tx: None }
        }
    }

    #[async_trait::async_trait]
    impl AudioBackend for TestBackend {
        async fn request_access(&mut self) -> VoiceResult<()> {
            Ok(())
        }

        async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
            let (tx, rx) = mpsc::channel(8);
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.capturing = true;
            self.tx = Some(tx);
            Ok(rx)
        }

        async fn stop(&mut self) -> Result<()> {
            self.capturing = false;
            self.tx = None;
            Ok(())
        }

        fn is_capturing(&self) -> bool {
            self.capturing
        }

        fn name(&self) -> &str {
            "test"
        }
    }

    #[derive(Default)]
    struct FakeSocket {
        open: bool,
        sent: Vec<ClientMessage>,
    }

    impl Outbound for FakeSocket {
        fn is_open(&self) -> bool {
            self.open
        }

        fn send(&mut self, message: ClientMessage) -> VoiceResult<()> {
            if !self.open {
                return Err(VoiceError::NotConnected);
            }
            self.sent.push(message);
            Ok(())
        }
    }

    fn frame(sequence: u64) -> AudioFrame {
        AudioFrame {
            samples: vec![0.25; 16],
            sample_rate: 24_000,
            sequence,
            timestamp_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let mut pipeline = CapturePipeline::new(Box::new(TestBackend::new()));
        let mut socket = FakeSocket { open: true, ..Default::default() };

        assert!(!pipeline.stop(&mut socket));
        assert!(!pipeline.stop(&mut socket));
        assert!(socket.sent.is_empty());
    }

    #[tokio::test]
    async fn test_frames_sent_while_active_and_open() {
        let mut pipeline = CapturePipeline::new(Box::new(TestBackend::new()));
        let mut socket = FakeSocket { open: true, ..Default::default() };

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.process_frame(&frame(0), &mut socket), FrameOutcome::Sent);
        assert_eq!(pipeline.process_frame(&frame(1), &mut socket), FrameOutcome::Sent);

        assert_eq!(socket.sent.len(), 2);
        let expected = pcm::encode_base64(&[0.25; 16]);
        assert_eq!(socket.sent[0], ClientMessage::AudioData { audio: expected });
    }

    #[tokio::test]
    async fn test_frames_dropped_while_closed_then_resume() {
        let mut pipeline = CapturePipeline::new(Box::new(TestBackend::new()));
        let mut socket = FakeSocket::default();

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.process_frame(&frame(0), &mut socket), FrameOutcome::Dropped);
        assert_eq!(pipeline.process_frame(&frame(1), &mut socket), FrameOutcome::Dropped);
        assert!(socket.sent.is_empty());

        socket.open = true;
        assert_eq!(pipeline.process_frame(&frame(2), &mut socket), FrameOutcome::Sent);

        assert_eq!(socket.sent.len(), 1);
        assert_eq!(pipeline.stats().frames_dropped, 2);
        assert_eq!(pipeline.stats().frames_sent, 1);
    }

    #[tokio::test]
    async fn test_stop_commits_once() {
        let mut pipeline = CapturePipeline::new(Box::new(TestBackend::new()));
        let mut socket = FakeSocket { open: true, ..Default::default() };

        pipeline.start().await.unwrap();
        assert!(pipeline.stop(&mut socket));
        assert!(!pipeline.stop(&mut socket));

        assert_eq!(socket.sent, vec![ClientMessage::Commit]);
        assert_eq!(pipeline.process_frame(&frame(0), &mut socket), FrameOutcome::Inactive);
    }

    #[tokio::test]
    async fn test_stop_while_closed_sends_nothing() {
        let mut pipeline = CapturePipeline::new(Box::new(TestBackend::new()));
        let mut socket = FakeSocket::default();

        pipeline.start().await.unwrap();
        assert!(!pipeline.stop(&mut socket));
        assert!(!pipeline.is_active());
    }

    #[tokio::test]
    async fn test_restart_reuses_live_stream() {
        let backend = TestBackend::new();
        let starts = Arc::clone(&backend.starts);
        let mut pipeline = CapturePipeline::new(Box::new(backend));
        let mut socket = FakeSocket { open: true, ..Default::default() };

        pipeline.start().await.unwrap();
        pipeline.stop(&mut socket);
        pipeline.start().await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        pipeline.release().await.unwrap();
        assert!(!pipeline.backend_mut().is_capturing());

        pipeline.start().await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stream_end_releases_stream() {
        let mut pipeline = CapturePipeline::new(Box::new(TestBackend::new()));
        pipeline.start().await.unwrap();

        // Dropping the sender ends the stream
        pipeline.backend_mut().stop().await.unwrap();
        assert!(pipeline.next_frame().await.is_none());
    }
}
