//! PCM16 / base64 wire encoding for audio exchanged with the live service

use base64::Engine;

use crate::error::{BridgeError, Result};

/// An encoded audio payload ready for `realtimeInput`
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedChunk {
    /// Base64 (standard alphabet) of little-endian 16-bit PCM
    pub data: String,
    /// Declared MIME type, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Number of samples encoded
    pub sample_count: usize,
}

pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Convert one float sample to 16-bit PCM, saturating out-of-range input
pub fn f32_to_i16(sample: f32) -> i16 {
    let scaled = sample.clamp(-1.0, 1.0) * 32768.0;
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| f32_to_i16(s).to_le_bytes())
        .collect()
}

pub fn encode_chunk(samples: &[f32], sample_rate: u32) -> EncodedChunk {
    let pcm_bytes = encode_pcm16(samples);
    EncodedChunk {
        data: base64::engine::general_purpose::STANDARD.encode(&pcm_bytes),
        mime_type: pcm_mime_type(sample_rate),
        sample_count: samples.len(),
    }
}

/// Decode base64 little-endian PCM16 into float samples
pub fn decode_chunk(data: &str) -> Result<Vec<f32>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| BridgeError::Decode(format!("invalid base64: {}", e)))?;

    if bytes.len() % 2 != 0 {
        return Err(BridgeError::Decode(format!(
            "odd PCM16 payload length: {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Parse the `rate=` parameter of an `audio/pcm` MIME type
pub fn sample_rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse().ok())
        .filter(|rate| *rate > 0)
}
