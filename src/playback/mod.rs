//! Ordered playback of synthesized speech
//!
//! The queue owns ordering; sinks only render one chunk and report back.

pub mod queue;
pub mod sink;
pub mod wav;

#[cfg(feature = "cpal")]
pub mod speaker;

pub use queue::{PlaybackQueue, PlaybackState, PlaybackStats};
pub use sink::{AudioSink, DiscardSink, PlaybackDone};
pub use wav::WavSink;
