use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::sink::{AudioSink, PlaybackDone};
use crate::audio::pcm;

/// Whether a chunk is currently being rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing { chunk_id: u64 },
}

/// Counters for the playback queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackStats {
    pub enqueued: u64,
    pub played: u64,
    pub failed: u64,
}

struct QueuedChunk {
    id: u64,
    audio: String,
}

/// Strictly sequential player for base64 PCM chunks
///
/// Chunks are appended at the tail and played from the head, one at a time.
/// Completion of the current chunk (reported by the sink through the receiver
/// returned from [`PlaybackQueue::new`]) is what starts the next one.
pub struct PlaybackQueue {
    sink: Box<dyn AudioSink>,
    sample_rate: u32,
    pending: VecDeque<QueuedChunk>,
    state: PlaybackState,
    next_id: u64,
    completion_tx: mpsc::UnboundedSender<u64>,
    stats: PlaybackStats,
}

impl PlaybackQueue {
    /// Create a queue over `sink`. Completed chunk ids arrive on the returned
    /// receiver and must be fed back through [`PlaybackQueue::on_ended`].
    pub fn new(sink: Box<dyn AudioSink>, sample_rate: u32) -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        (
            Self {
                sink,
                sample_rate,
                pending: VecDeque::new(),
                state: PlaybackState::Idle,
                next_id: 0,
                completion_tx,
                stats: PlaybackStats::default(),
            },
            completion_rx,
        )
    }

    /// Append a chunk and start it right away if nothing is playing
    pub fn enqueue(&mut self, audio: String) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.stats.enqueued += 1;

        debug!("Queued chunk {} ({} pending)", id, self.pending.len() + 1);
        self.pending.push_back(QueuedChunk { id, audio });

        if self.state == PlaybackState::Idle {
            self.try_play_next();
        }
        id
    }

    /// Start the head chunk unless one is already playing
    ///
    /// A chunk that fails to decode or schedule is dropped and the next one
    /// is tried, so a corrupt chunk never stalls the queue.
    pub fn try_play_next(&mut self) {
        if let PlaybackState::Playing { .. } = self.state {
            return;
        }

        while let Some(chunk) = self.pending.pop_front() {
            let samples = match pcm::decode_base64(&chunk.audio) {
                Ok(samples) => samples,
                Err(e) => {
                    error!("Playback error on chunk {}: {}", chunk.id, e);
                    self.stats.failed += 1;
                    continue;
                }
            };

            // Mark as playing before scheduling: a sink may finish synchronously
            self.state = PlaybackState::Playing { chunk_id: chunk.id };
            let done = PlaybackDone::new(chunk.id, self.completion_tx.clone());

            match self.sink.schedule(samples, self.sample_rate, done) {
                Ok(()) => {
                    debug!("Playing chunk {} on {}", chunk.id, self.sink.name());
                    return;
                }
                Err(e) => {
                    error!("Playback error on chunk {}: {}", chunk.id, e);
                    self.stats.failed += 1;
                    self.state = PlaybackState::Idle;
                }
            }
        }
    }

    /// The sink finished rendering `chunk_id`
    pub fn on_ended(&mut self, chunk_id: u64) {
        match self.state {
            PlaybackState::Playing { chunk_id: current } if current == chunk_id => {
                self.stats.played += 1;
                self.state = PlaybackState::Idle;
                self.try_play_next();
            }
            _ => warn!("Ignoring completion for chunk {} that is not playing", chunk_id),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing { .. })
    }

    /// Chunks waiting behind the one playing
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{VoiceError, VoiceResult};
    use std::sync::{Arc, Mutex};

    /// Records scheduled chunks and holds their completion handles
    #[derive(Clone, Default)]
    struct ManualSink {
        played: Arc<Mutex<Vec<(u64, Vec<f32>)>>>,
        active: Arc<Mutex<Vec<PlaybackDone>>>,
        fail_next: Arc<Mutex<bool>>,
    }

    impl AudioSink for ManualSink {
        fn schedule(&mut self, samples: Vec<f32>, _sample_rate: u32, done: PlaybackDone) -> VoiceResult<()> {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(VoiceError::Playback("device lost".into()));
            }
            self.played.lock().unwrap().push((done.id(), samples));
            self.active.lock().unwrap().push(done);
            Ok(())
        }

        fn name(&self) -> &str {
            "manual"
        }
    }

    fn chunk(value: f32) -> String {
        pcm::encode_base64(&[value, value])
    }

    fn finish_current(sink: &ManualSink) -> u64 {
        let done = sink.active.lock().unwrap().remove(0);
        let id = done.id();
        done.finish();
        id
    }

    #[test]
    fn test_first_chunk_starts_immediately() {
        let sink = ManualSink::default();
        let (mut queue, _rx) = PlaybackQueue::new(Box::new(sink.clone()), 24_000);

        let id = queue.enqueue(chunk(0.5));

        assert_eq!(queue.state(), PlaybackState::Playing { chunk_id: id });
        assert_eq!(sink.played.lock().unwrap().len(), 1);
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn test_only_one_chunk_plays_at_a_time() {
        let sink = ManualSink::default();
        let (mut queue, _rx) = PlaybackQueue::new(Box::new(sink.clone()), 24_000);

        queue.enqueue(chunk(0.1));
        queue.enqueue(chunk(0.2));
        queue.enqueue(chunk(0.3));
        queue.try_play_next();

        assert_eq!(sink.played.lock().unwrap().len(), 1);
        assert_eq!(sink.active.lock().unwrap().len(), 1);
        assert_eq!(queue.pending_len(), 2);
    }

    #[test]
    fn test_chunks_play_in_fifo_order() {
        let sink = ManualSink::default();
        let (mut queue, mut rx) = PlaybackQueue::new(Box::new(sink.clone()), 24_000);

        let ids: Vec<u64> = (0..4).map(|i| queue.enqueue(chunk(i as f32 / 10.0))).collect();

        for _ in 0..4 {
            finish_current(&sink);
            let ended = rx.try_recv().unwrap();
            queue.on_ended(ended);
        }

        let played: Vec<u64> = sink.played.lock().unwrap().iter().map(|(id, _)| *id).collect();
        assert_eq!(played, ids);
        assert_eq!(queue.state(), PlaybackState::Idle);
        assert_eq!(queue.stats().played, 4);
    }

    #[test]
    fn test_corrupt_chunk_is_skipped() {
        let sink = ManualSink::default();
        let (mut queue, _rx) = PlaybackQueue::new(Box::new(sink.clone()), 24_000);

        let first = queue.enqueue(chunk(0.1));
        queue.enqueue("%%% not audio %%%".to_string());
        let third = queue.enqueue(chunk(0.3));

        queue.on_ended(first);

        assert_eq!(queue.state(), PlaybackState::Playing { chunk_id: third });
        assert_eq!(queue.stats().failed, 1);
        let played: Vec<u64> = sink.played.lock().unwrap().iter().map(|(id, _)| *id).collect();
        assert_eq!(played, vec![first, third]);
    }

    #[test]
    fn test_schedule_failure_moves_on() {
        let sink = ManualSink::default();
        let (mut queue, _rx) = PlaybackQueue::new(Box::new(sink.clone()), 24_000);

        *sink.fail_next.lock().unwrap() = true;
        queue.enqueue(chunk(0.1));
        assert_eq!(queue.state(), PlaybackState::Idle);
        assert_eq!(queue.stats().failed, 1);

        let second = queue.enqueue(chunk(0.2));
        assert_eq!(queue.state(), PlaybackState::Playing { chunk_id: second });
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let sink = ManualSink::default();
        let (mut queue, _rx) = PlaybackQueue::new(Box::new(sink.clone()), 24_000);

        let first = queue.enqueue(chunk(0.1));
        queue.enqueue(chunk(0.2));

        queue.on_ended(first + 1);
        assert_eq!(queue.state(), PlaybackState::Playing { chunk_id: first });
        assert_eq!(queue.stats().played, 0);
    }

    #[test]
    fn test_decoded_samples_reach_sink() {
        let sink = ManualSink::default();
        let (mut queue, _rx) = PlaybackQueue::new(Box::new(sink.clone()), 24_000);

        queue.enqueue(pcm::encode_base64(&[-0.5, 0.0]));

        let played = sink.played.lock().unwrap();
        assert_eq!(played[0].1, vec![-0.5, 0.0]);
    }
}
