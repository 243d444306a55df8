use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::pcm::SAMPLE_RATE;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// REST base URL, e.g. `https://assessment.example.com`
    pub api_base_url: String,
    /// Socket base URL; derived from `api_base_url` when unset
    pub ws_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub buffer_size: usize,
    pub channels: u16,
}

impl Config {
    /// Load defaults, then `path` (any format the config crate knows, optional),
    /// then `VOICE_INTERVIEW__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "voice-interview")?
            .set_default("backend.api_base_url", "http://localhost:8000")?
            .set_default("audio.sample_rate", 24_000)?
            .set_default("audio.buffer_size", 4096)?
            .set_default("audio.channels", 1)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VOICE_INTERVIEW").separator("__"))
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.audio.sample_rate != SAMPLE_RATE {
            anyhow::bail!(
                "Only {}Hz audio is supported, got {}Hz",
                SAMPLE_RATE,
                self.audio.sample_rate
            );
        }
        if self.audio.channels != 1 {
            anyhow::bail!("Only mono audio is supported, got {} channels", self.audio.channels);
        }
        if self.audio.buffer_size == 0 {
            anyhow::bail!("audio.buffer_size must be positive");
        }
        Ok(())
    }

    /// Socket base URL, falling back to the REST base with a ws scheme
    pub fn ws_base_url(&self) -> String {
        match &self.backend.ws_base_url {
            Some(url) => url.clone(),
            None => self
                .backend
                .api_base_url
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing");

        let config = Config::load(path.to_str().unwrap()).unwrap();

        assert_eq!(config.service.name, "voice-interview");
        assert_eq!(config.audio.sample_rate, 24_000);
        assert_eq!(config.audio.buffer_size, 4096);
        assert_eq!(config.ws_base_url(), "ws://localhost:8000");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("voice.toml");
        fs::write(
            &path,
            r#"
[backend]
api_base_url = "https://assessment.example.com"

[audio]
buffer_size = 2048
"#,
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();

        assert_eq!(config.audio.buffer_size, 2048);
        assert_eq!(config.ws_base_url(), "wss://assessment.example.com");
    }

    #[test]
    fn test_explicit_ws_url_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("voice.toml");
        fs::write(
            &path,
            r#"
[backend]
api_base_url = "https://api.example.com"
ws_base_url = "wss://realtime.example.com"
"#,
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.ws_base_url(), "wss://realtime.example.com");
    }

    #[test]
    fn test_stereo_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("voice.toml");
        fs::write(&path, "[audio]\nchannels = 2\n").unwrap();

        assert!(Config::load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_other_sample_rate_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("voice.toml");
        fs::write(&path, "[audio]\nsample_rate = 16000\n").unwrap();

        let err = Config::load(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("16000"));
    }
}
