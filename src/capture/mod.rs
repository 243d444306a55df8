//! Microphone capture → PCM16 → base64 → socket

mod pipeline;

pub use pipeline::{CapturePipeline, CaptureStats, FrameOutcome};
