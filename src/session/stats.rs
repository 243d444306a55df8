use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use super::state::RecordingState;
use crate::socket::ConnectionState;

/// Token counts reported by the backend for one model call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDelta {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub input: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub output: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub cached: u64,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}

/// Running usage and cost for one session
///
/// Only ever grows; a new session starts from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUsage {
    pub input: u64,
    pub output: u64,
    pub cached: u64,
    /// Estimated cost in USD
    pub cost: f64,
}

impl SessionUsage {
    /// Add a usage report. `cost` is added to the running total.
    pub fn merge(&mut self, usage: &UsageDelta, cost: Option<f64>) {
        self.input = self.input.saturating_add(usage.input);
        self.output = self.output.saturating_add(usage.output);
        self.cached = self.cached.saturating_add(usage.cached);

        match cost {
            Some(cost) if cost.is_finite() && cost >= 0.0 => self.cost += cost,
            Some(cost) => warn!("Ignoring invalid cost value {}", cost),
            None => {}
        }
    }
}

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub connection: ConnectionState,

    pub recording: RecordingState,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    pub usage: SessionUsage,

    /// Audio frames sent to the backend
    pub frames_sent: u64,

    /// Frames captured while the socket was not open
    pub frames_dropped: u64,

    /// Completed user turns
    pub commits: u64,

    pub chunks_played: u64,

    pub chunks_failed: u64,

    /// Number of transcript segments received
    pub transcript_segments_count: usize,

    pub has_final_report: bool,
}

/// A single transcript segment from the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Transcribed text
    pub text: String,

    /// When this segment was received
    pub timestamp: DateTime<Utc>,
}
