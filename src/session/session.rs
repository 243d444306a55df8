use super::config::SessionConfig;
use super::state::{MicrophoneAccess, RecordingState, StatusText, VoiceStateMachine};
use super::stats::{SessionStats, SessionUsage, TranscriptSegment};
use crate::audio::{AudioBackend, AudioFrame};
use crate::capture::{CapturePipeline, FrameOutcome};
use crate::error::VoiceError;
use crate::playback::{AudioSink, PlaybackQueue};
use crate::socket::{ConnectionState, ServerMessage, SessionSocket, SocketEvent};
use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Input from the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Ask for microphone access again after a denial
    RetryPermission,
    /// Talk control pressed
    Press,
    /// Talk control released
    Release,
    /// Single talk key: starts a turn when idle, ends it while recording
    Toggle,
    /// Leave the session
    Quit,
}

/// Everything the session loop reacts to
#[derive(Debug)]
pub enum SessionEvent {
    Control(ControlEvent),
    Frame(AudioFrame),
    /// The input stream ended on its own
    InputEnded,
    Socket(SocketEvent),
    PlaybackEnded(u64),
    /// Nothing arrived within the reply timeout after a turn
    ReplyTimeout,
}

/// One realtime voice interview
///
/// Owns the socket, the input stream and the audio output for its whole
/// lifetime. All component logic runs on the task that drives
/// [`VoiceSession::run`] (or calls [`VoiceSession::next_event`] and
/// [`VoiceSession::handle_event`] directly).
pub struct VoiceSession {
    config: SessionConfig,
    state: VoiceStateMachine,
    socket: SessionSocket,
    socket_events: mpsc::UnboundedReceiver<SocketEvent>,
    capture: CapturePipeline,
    playback: PlaybackQueue,
    playback_done: mpsc::UnboundedReceiver<u64>,
    usage: SessionUsage,
    transcript: Vec<TranscriptSegment>,
    final_report: Option<String>,
    started_at: chrono::DateTime<Utc>,
    last_activity: Instant,
}

impl VoiceSession {
    /// Create the session and start connecting
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: SessionConfig,
        backend: Box<dyn AudioBackend>,
        sink: Box<dyn AudioSink>,
    ) -> Result<Self> {
        let url = SessionSocket::endpoint(&config.ws_base_url, &config.user_id)
            .context("Failed to build socket URL")?;

        info!("Creating voice session for user {}", config.user_id);

        let (socket, socket_events) = SessionSocket::open(url);
        let (playback, playback_done) = PlaybackQueue::new(sink, config.sample_rate);

        Ok(Self {
            config,
            state: VoiceStateMachine::new(),
            socket,
            socket_events,
            capture: CapturePipeline::new(backend),
            playback,
            playback_done,
            usage: SessionUsage::default(),
            transcript: Vec::new(),
            final_report: None,
            started_at: Utc::now(),
            last_activity: Instant::now(),
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.socket.state()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.state.recording()
    }

    pub fn microphone_access(&self) -> MicrophoneAccess {
        self.state.access()
    }

    pub fn status(&self) -> StatusText {
        self.state.status(self.socket.state())
    }

    pub fn usage(&self) -> SessionUsage {
        self.usage
    }

    pub fn transcript(&self) -> &[TranscriptSegment] {
        &self.transcript
    }

    pub fn final_report(&self) -> Option<&str> {
        self.final_report.as_deref()
    }

    /// Ask the input backend for access and record the answer
    pub async fn request_permission(&mut self) -> MicrophoneAccess {
        if !self.state.can_request_permission() {
            return self.state.access();
        }

        match self.capture.backend_mut().request_access().await {
            Ok(()) => self.state.grant(),
            Err(e) => self.state.deny(e.to_string()),
        }

        info!("Status: {}", self.status());
        self.state.access()
    }

    /// Process events until the socket opens
    ///
    /// Fails if the connection closes first.
    pub async fn wait_until_open(&mut self) -> Result<()> {
        while self.socket.state() == ConnectionState::Connecting {
            let event = self.next_event().await;
            self.handle_event(event).await?;
        }

        match self.socket.state() {
            ConnectionState::Open => Ok(()),
            _ => Err(VoiceError::Connection(format!("{} closed before opening", self.socket.url())).into()),
        }
    }

    /// Wait for the next thing to react to
    ///
    /// Control events are not read here; they are passed to
    /// [`VoiceSession::handle_event`] by whoever owns the control channel.
    pub async fn next_event(&mut self) -> SessionEvent {
        self.next_event_with(None).await
    }

    async fn next_event_with(&mut self, controls: Option<&mut mpsc::Receiver<ControlEvent>>) -> SessionEvent {
        let reply_deadline = self.reply_deadline();
        let has_controls = controls.is_some();

        let control = async move {
            match controls {
                Some(rx) => rx.recv().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            control = control, if has_controls => {
                SessionEvent::Control(control.unwrap_or(ControlEvent::Quit))
            }
            frame = self.capture.next_frame() => match frame {
                Some(frame) => SessionEvent::Frame(frame),
                None => SessionEvent::InputEnded,
            },
            Some(event) = self.socket_events.recv() => SessionEvent::Socket(event),
            Some(chunk_id) = self.playback_done.recv() => SessionEvent::PlaybackEnded(chunk_id),
            _ = sleep_until_opt(reply_deadline) => SessionEvent::ReplyTimeout,
        }
    }

    /// Apply one event. Returns `false` when the session should end.
    pub async fn handle_event(&mut self, event: SessionEvent) -> Result<bool> {
        match event {
            SessionEvent::Control(ControlEvent::RetryPermission) => {
                self.request_permission().await;
            }
            SessionEvent::Control(ControlEvent::Press) => self.start_recording().await,
            SessionEvent::Control(ControlEvent::Release) => self.stop_recording(),
            SessionEvent::Control(ControlEvent::Toggle) => match self.state.recording() {
                RecordingState::Recording => self.stop_recording(),
                RecordingState::Idle => self.start_recording().await,
            },
            SessionEvent::Control(ControlEvent::Quit) => {
                info!("Leaving voice session");
                return Ok(false);
            }
            SessionEvent::Frame(frame) => {
                if self.capture.process_frame(&frame, &mut self.socket) == FrameOutcome::Dropped {
                    debug!("Frame {} dropped: socket is {:?}", frame.sequence, self.socket.state());
                }
            }
            SessionEvent::InputEnded => {
                info!("Input stream ended");
                if self.state.recording() == RecordingState::Recording {
                    self.stop_recording();
                }
            }
            SessionEvent::Socket(event) => self.handle_socket_event(event),
            SessionEvent::PlaybackEnded(chunk_id) => {
                self.playback.on_ended(chunk_id);
                self.last_activity = Instant::now();
            }
            SessionEvent::ReplyTimeout => {
                info!("No reply activity for {:?}, ending session", self.config.reply_timeout);
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Drive the session from a control channel until told to quit
    ///
    /// A closed control channel counts as quitting. Teardown runs on every
    /// exit path.
    pub async fn run(mut self, mut controls: mpsc::Receiver<ControlEvent>) -> Result<SessionStats> {
        let outcome = loop {
            let event = self.next_event_with(Some(&mut controls)).await;
            match self.handle_event(event).await {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        let stats = self.shutdown().await;
        outcome.map(|_| stats)
    }

    /// Close the socket and release the input stream
    pub async fn shutdown(&mut self) -> SessionStats {
        self.state.end_recording();
        if let Err(e) = self.capture.release().await {
            error!("Failed to release audio input: {:#}", e);
        }
        self.socket.close();

        let stats = self.stats();
        info!(
            "Voice session ended: {} frames sent, {} chunks played, cost ${:.5}",
            stats.frames_sent, stats.chunks_played, stats.usage.cost
        );
        stats
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        let capture = self.capture.stats();
        let playback = self.playback.stats();

        SessionStats {
            connection: self.socket.state(),
            recording: self.state.recording(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            usage: self.usage,
            frames_sent: capture.frames_sent,
            frames_dropped: capture.frames_dropped,
            commits: capture.commits,
            chunks_played: playback.played,
            chunks_failed: playback.failed,
            transcript_segments_count: self.transcript.len(),
            has_final_report: self.final_report.is_some(),
        }
    }

    async fn start_recording(&mut self) {
        if let Err(e) = self.state.check_can_record() {
            warn!("Ignoring press: {}", e);
            return;
        }

        if let Err(e) = self.capture.start().await {
            error!("{:#}", e);
            self.state.deny(format!("{:#}", e));
            return;
        }

        if let Err(e) = self.state.begin_recording() {
            warn!("Ignoring press: {}", e);
            return;
        }
        info!("Status: {}", self.status());
    }

    fn stop_recording(&mut self) {
        let was_recording = self.state.end_recording();
        let committed = self.capture.stop(&mut self.socket);

        if was_recording {
            self.last_activity = Instant::now();
            info!("Status: {} (commit sent: {})", self.status(), committed);
        }
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        self.socket.apply(&event);

        match event {
            SocketEvent::Opened => info!("Status: {}", self.status()),
            SocketEvent::Closed { reason } => {
                warn!(
                    "Status: {} ({})",
                    self.status(),
                    reason.as_deref().unwrap_or("closed by server")
                );
            }
            SocketEvent::Message(message) => {
                self.last_activity = Instant::now();
                self.handle_server_message(message);
            }
        }
    }

    /// Route one backend message to playback, transcript and usage
    pub fn handle_server_message(&mut self, message: ServerMessage) {
        if let Some(audio) = message.audio_delta() {
            self.playback.enqueue(audio.to_string());
        }

        if let Some(text) = message.transcript() {
            info!("Interviewer: {}", text);
            self.transcript.push(TranscriptSegment {
                text: text.to_string(),
                timestamp: Utc::now(),
            });
        }

        if let Some(report) = message.final_report() {
            info!("Final report received ({} chars)", report.len());
            self.final_report = Some(report.to_string());
        }

        if let Some(usage) = &message.usage {
            self.usage.merge(usage, message.cost);
            debug!(
                "Usage: input={} output={} cached={} cost=${:.5}",
                self.usage.input, self.usage.output, self.usage.cached, self.usage.cost
            );
        }
    }

    /// When the reply timeout fires, if it applies right now
    fn reply_deadline(&self) -> Option<Instant> {
        let timeout = self.config.reply_timeout?;

        let waiting_for_reply = self.state.turns() > 0
            && self.state.recording() == RecordingState::Idle
            && !self.playback.is_playing()
            && self.playback.pending_len() == 0;

        waiting_for_reply.then(|| self.last_activity + timeout)
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
