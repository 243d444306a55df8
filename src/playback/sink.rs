use tokio::sync::mpsc;
use tracing::debug;

use crate::error::VoiceResult;

/// Completion handle for one scheduled chunk
///
/// The sink calls [`PlaybackDone::finish`] once the chunk has been fully
/// rendered. Dropping the handle without finishing leaves the queue waiting,
/// which is what happens when a session is torn down mid-chunk.
#[derive(Debug)]
pub struct PlaybackDone {
    id: u64,
    tx: mpsc::UnboundedSender<u64>,
}

impl PlaybackDone {
    pub(crate) fn new(id: u64, tx: mpsc::UnboundedSender<u64>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn finish(self) {
        // The queue may already be gone during teardown
        let _ = self.tx.send(self.id);
    }
}

/// Audio output that renders one decoded chunk at a time
pub trait AudioSink: Send {
    /// Begin rendering `samples`; report completion through `done`
    fn schedule(&mut self, samples: Vec<f32>, sample_rate: u32, done: PlaybackDone) -> VoiceResult<()>;

    fn name(&self) -> &str;
}

/// Sink that drops audio, for sessions without an output
pub struct DiscardSink;

impl AudioSink for DiscardSink {
    fn schedule(&mut self, samples: Vec<f32>, _sample_rate: u32, done: PlaybackDone) -> VoiceResult<()> {
        debug!("Discarding chunk {} ({} samples)", done.id(), samples.len());
        done.finish();
        Ok(())
    }

    fn name(&self) -> &str {
        "discard"
    }
}
