use std::time::Duration;

use crate::audio::pcm::SAMPLE_RATE;
use crate::audio::AudioBackendConfig;
use crate::config::Config;

/// Configuration for a voice session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backend user the interview belongs to
    pub user_id: String,

    /// Base URL for the socket (http(s) or ws(s))
    pub ws_base_url: String,

    /// PCM sample rate, both directions
    pub sample_rate: u32,

    /// Samples per captured frame
    pub buffer_size: usize,

    /// End the session once a turn is answered and the socket has been
    /// quiet this long. `None` runs until told to quit.
    pub reply_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(user_id: impl Into<String>, ws_base_url: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ws_base_url: ws_base_url.into(),
            sample_rate: SAMPLE_RATE,
            buffer_size: 4096,
            reply_timeout: None,
        }
    }

    pub fn from_config(config: &Config, user_id: impl Into<String>) -> Self {
        Self {
            sample_rate: config.audio.sample_rate,
            buffer_size: config.audio.buffer_size,
            ..Self::new(user_id, config.ws_base_url())
        }
    }

    /// Input settings matching this session's frame size and rate
    pub fn backend_config(&self, realtime: bool) -> AudioBackendConfig {
        AudioBackendConfig {
            sample_rate: self.sample_rate,
            buffer_size: self.buffer_size,
            realtime,
        }
    }
}
