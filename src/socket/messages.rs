use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::session::UsageDelta;

/// Message sent to the backend over the voice socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One capture window of base64 PCM16 audio
    AudioData { audio: String },
    /// End of the user's utterance
    Commit,
}

/// Message received from the backend
///
/// The backend tags messages with `type`, but any message may also carry
/// `usage` and `cost`, so this is a flat struct rather than a tagged enum.
/// A malformed `usage` or `cost` is dropped on its own and never takes the
/// rest of the message with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub usage: Option<UsageDelta>,
    #[serde(default, deserialize_with = "lenient")]
    pub cost: Option<f64>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            warn!("Ignoring malformed field in server message: {}", e);
            Ok(None)
        }
    }
}

impl ServerMessage {
    fn is(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }

    /// Base64 PCM chunk of synthesized speech
    pub fn audio_delta(&self) -> Option<&str> {
        if self.is("audio_delta") {
            self.audio.as_deref().filter(|audio| !audio.is_empty())
        } else {
            None
        }
    }

    /// Transcript of what the assistant said
    pub fn transcript(&self) -> Option<&str> {
        if self.is("transcript") {
            self.text.as_deref()
        } else {
            None
        }
    }

    /// Closing assessment text sent at the end of the interview
    pub fn final_report(&self) -> Option<&str> {
        if self.is("final_report") {
            self.text.as_deref()
        } else {
            None
        }
    }
}
