use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::error::{VoiceError, VoiceResult};
use crate::socket::ConnectionState;

/// Microphone authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicrophoneAccess {
    Unauthorized,
    Authorized,
}

/// Whether the user is currently holding the talk control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Recording,
}

/// User-facing status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusText {
    Connecting,
    AwaitingPermission,
    Ready,
    Speaking,
    Analyzing,
    MicrophoneError,
    ConnectionLost,
}

impl fmt::Display for StatusText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusText::Connecting => "Connecting to the interviewer...",
            StatusText::AwaitingPermission => "Waiting for microphone access",
            StatusText::Ready => "Interviewer is ready to listen",
            StatusText::Speaking => "You are speaking...",
            StatusText::Analyzing => "Interviewer is analyzing...",
            StatusText::MicrophoneError => "Microphone error",
            StatusText::ConnectionLost => "Connection lost",
        };
        f.write_str(text)
    }
}

/// Permission and recording state for one voice session
///
/// `Unauthorized` → `Authorized` happens once, on an explicit grant. A denial
/// keeps the machine unauthorized until the user retries.
#[derive(Debug, Clone)]
pub struct VoiceStateMachine {
    access: MicrophoneAccess,
    recording: RecordingState,
    denial: Option<String>,
    turns: u64,
}

impl Default for VoiceStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceStateMachine {
    pub fn new() -> Self {
        Self {
            access: MicrophoneAccess::Unauthorized,
            recording: RecordingState::Idle,
            denial: None,
            turns: 0,
        }
    }

    pub fn access(&self) -> MicrophoneAccess {
        self.access
    }

    pub fn recording(&self) -> RecordingState {
        self.recording
    }

    /// Reason for the last denial, if access is currently refused
    pub fn denial(&self) -> Option<&str> {
        self.denial.as_deref()
    }

    /// Completed turns (press followed by release)
    pub fn turns(&self) -> u64 {
        self.turns
    }

    pub fn grant(&mut self) {
        if self.access == MicrophoneAccess::Unauthorized {
            info!("Microphone access granted");
        }
        self.access = MicrophoneAccess::Authorized;
        self.denial = None;
    }

    /// Access was refused, or the input failed while in use
    pub fn deny(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Microphone access denied: {}", reason);
        self.access = MicrophoneAccess::Unauthorized;
        self.recording = RecordingState::Idle;
        self.denial = Some(reason);
    }

    /// Whether asking for access again makes sense
    pub fn can_request_permission(&self) -> bool {
        self.access == MicrophoneAccess::Unauthorized
    }

    /// Check that capture may start: authorized and idle
    pub fn check_can_record(&self) -> VoiceResult<()> {
        match (self.access, self.recording) {
            (MicrophoneAccess::Unauthorized, _) => Err(VoiceError::NotAuthorized),
            (_, RecordingState::Recording) => Err(VoiceError::AlreadyRecording),
            (MicrophoneAccess::Authorized, RecordingState::Idle) => Ok(()),
        }
    }

    pub fn begin_recording(&mut self) -> VoiceResult<()> {
        self.check_can_record()?;
        self.recording = RecordingState::Recording;
        Ok(())
    }

    /// Returns whether a recording was actually ended
    pub fn end_recording(&mut self) -> bool {
        if self.recording == RecordingState::Recording {
            self.recording = RecordingState::Idle;
            self.turns += 1;
            true
        } else {
            false
        }
    }

    /// Status line for the current state and connection
    pub fn status(&self, connection: ConnectionState) -> StatusText {
        if connection == ConnectionState::Closed {
            return StatusText::ConnectionLost;
        }
        if self.recording == RecordingState::Recording {
            return StatusText::Speaking;
        }
        if self.denial.is_some() {
            return StatusText::MicrophoneError;
        }
        if self.turns > 0 {
            return StatusText::Analyzing;
        }

        match (connection, self.access) {
            (ConnectionState::Connecting, _) => StatusText::Connecting,
            (_, MicrophoneAccess::Unauthorized) => StatusText::AwaitingPermission,
            _ => StatusText::Ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unauthorized_and_idle() {
        let machine = VoiceStateMachine::new();
        assert_eq!(machine.access(), MicrophoneAccess::Unauthorized);
        assert_eq!(machine.recording(), RecordingState::Idle);
        assert_eq!(machine.status(ConnectionState::Connecting), StatusText::Connecting);
    }

    #[test]
    fn test_recording_requires_permission() {
        let mut machine = VoiceStateMachine::new();
        assert!(matches!(machine.begin_recording(), Err(VoiceError::NotAuthorized)));

        machine.grant();
        machine.begin_recording().unwrap();
        assert_eq!(machine.recording(), RecordingState::Recording);
    }

    #[test]
    fn test_cannot_start_twice() {
        let mut machine = VoiceStateMachine::new();
        machine.grant();
        machine.begin_recording().unwrap();

        assert!(matches!(machine.begin_recording(), Err(VoiceError::AlreadyRecording)));
    }

    #[test]
    fn test_end_without_start_is_noop() {
        let mut machine = VoiceStateMachine::new();
        assert!(!machine.end_recording());
        assert_eq!(machine.turns(), 0);
    }

    #[test]
    fn test_denial_stays_until_retry() {
        let mut machine = VoiceStateMachine::new();
        machine.deny("blocked by user");

        assert!(machine.can_request_permission());
        assert_eq!(machine.denial(), Some("blocked by user"));
        assert_eq!(machine.status(ConnectionState::Open), StatusText::MicrophoneError);
        assert!(machine.begin_recording().is_err());

        machine.grant();
        assert!(!machine.can_request_permission());
        assert_eq!(machine.status(ConnectionState::Open), StatusText::Ready);
    }

    #[test]
    fn test_status_follows_turns() {
        let mut machine = VoiceStateMachine::new();
        machine.grant();
        assert_eq!(machine.status(ConnectionState::Open), StatusText::Ready);

        machine.begin_recording().unwrap();
        assert_eq!(machine.status(ConnectionState::Open), StatusText::Speaking);

        machine.end_recording();
        assert_eq!(machine.status(ConnectionState::Open), StatusText::Analyzing);
        assert_eq!(machine.status(ConnectionState::Closed), StatusText::ConnectionLost);
    }

    #[test]
    fn test_awaiting_permission_when_connected() {
        let machine = VoiceStateMachine::new();
        assert_eq!(machine.status(ConnectionState::Open), StatusText::AwaitingPermission);
    }
}
