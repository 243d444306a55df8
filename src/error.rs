//! Error types for the voice session

use thiserror::Error;

/// Errors raised by the voice components.
///
/// None of these are fatal to the process; every variant is scoped to the
/// current session.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Microphone permission has not been granted")]
    NotAuthorized,

    #[error("Recording already in progress")]
    AlreadyRecording,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Playback error: {0}")]
    Playback(String),

    /// An input or output device (or output file) could not be opened
    #[error("Audio device error: {0}")]
    Device(String),
}

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;
