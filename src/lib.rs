pub mod api;
pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod playback;
pub mod session;
pub mod socket;

pub use api::ApiClient;
pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    FileBackend,
};
pub use capture::CapturePipeline;
pub use config::Config;
pub use error::{VoiceError, VoiceResult};
pub use playback::{AudioSink, PlaybackQueue};
pub use session::{
    ControlEvent, SessionConfig, SessionStats, SessionUsage, TranscriptSegment, VoiceSession,
};
pub use socket::{ClientMessage, ConnectionState, ServerMessage, SessionSocket};
