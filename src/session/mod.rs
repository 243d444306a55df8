//! Voice session management
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - Microphone permission and recording state
//! - Audio capture and streaming over the voice socket
//! - Ordered playback of synthesized replies
//! - Usage, cost and transcript collection

mod config;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use session::{ControlEvent, SessionEvent, VoiceSession};
pub use state::{MicrophoneAccess, RecordingState, StatusText, VoiceStateMachine};
pub use stats::{SessionStats, SessionUsage, TranscriptSegment, UsageDelta};
