//! PCM16 codec
//!
//! Converts between f32 samples in [-1, 1] and signed 16-bit little-endian
//! PCM, the only audio format carried over the voice socket (mono, 24 kHz).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{VoiceError, VoiceResult};

/// Sample rate for all PCM audio, both directions
pub const SAMPLE_RATE: u32 = 24_000;

/// Convert one float sample to i16.
///
/// Negative values scale by 32768 and non-negative values by 32767, so both
/// ends of the range map onto the full i16 range. NaN encodes as silence.
pub fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }

    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Convert one i16 sample back to a float in [-1, 1)
pub fn sample_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Encode float samples as PCM16 little-endian bytes
pub fn encode(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| sample_to_i16(s).to_le_bytes())
        .collect()
}

/// Decode PCM16 little-endian bytes, rejecting buffers with a dangling byte
pub fn try_decode(bytes: &[u8]) -> VoiceResult<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::Decode(format!(
            "PCM16 buffer has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| sample_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

/// Decode PCM16 little-endian bytes; malformed input decodes as empty
pub fn decode(bytes: &[u8]) -> Vec<f32> {
    try_decode(bytes).unwrap_or_default()
}

/// Encode float samples as base64 PCM16 (the `audio` field on the wire)
pub fn encode_base64(samples: &[f32]) -> String {
    STANDARD.encode(encode(samples))
}

/// Decode a base64 PCM16 chunk into float samples
pub fn decode_base64(chunk: &str) -> VoiceResult<Vec<f32>> {
    let bytes = STANDARD
        .decode(chunk)
        .map_err(|e| VoiceError::Decode(format!("invalid base64 audio: {}", e)))?;

    try_decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f32 = 1.0 / 32768.0;

    #[test]
    fn test_encode_extremes() {
        let bytes = encode(&[-1.0, 0.0, 1.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MIN);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), i16::MAX);
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        assert_eq!(sample_to_i16(3.5), i16::MAX);
        assert_eq!(sample_to_i16(-7.0), i16::MIN);
        assert_eq!(sample_to_i16(f32::NAN), 0);
    }

    #[test]
    fn test_encode_truncates_toward_zero() {
        // 0.5 * 32767 = 16383.5
        assert_eq!(sample_to_i16(0.5), 16383);
        // -0.5 * 32768 = -16384 exactly
        assert_eq!(sample_to_i16(-0.5), -16384);
    }

    #[test]
    fn test_decode_divides_by_32768() {
        let bytes: Vec<u8> = [i16::MIN, -16384, 0, 16384]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        assert_eq!(decode(&bytes), vec![-1.0, -0.5, 0.0, 0.5]);
    }

    #[test]
    fn test_decode_odd_length_is_empty() {
        assert!(decode(&[1, 2, 3]).is_empty());
        assert!(matches!(try_decode(&[1, 2, 3]), Err(VoiceError::Decode(_))));
    }

    #[test]
    fn test_roundtrip_stays_within_quantization() {
        let samples: Vec<f32> = (0..=2000).map(|i| i as f32 / 1000.0 - 1.0).collect();
        let decoded = decode(&encode(&samples));

        assert_eq!(decoded.len(), samples.len());
        for (original, restored) in samples.iter().zip(&decoded) {
            // Positive samples encode with 32767 but decode with 32768, which
            // costs up to one extra step near full scale.
            let tolerance = if *original < 0.0 { STEP } else { 2.0 * STEP };
            assert!(
                (original - restored).abs() <= tolerance,
                "{} decoded as {}",
                original,
                restored
            );
        }
    }

    #[test]
    fn test_base64_roundtrip() {
        let samples = vec![0.25, -0.25, 0.0];
        let encoded = encode_base64(&samples);
        let decoded = decode_base64(&encoded).unwrap();

        assert_eq!(decoded.len(), 3);
        assert!((decoded[0] - 0.25).abs() <= 2.0 * STEP);
        assert_eq!(decoded[1], -0.25);
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert!(decode_base64("not base64 at all!").is_err());
        // Valid base64, but three bytes of PCM
        assert!(decode_base64("AQID").is_err());
    }
}
