//! Primitive codec helpers
//!
//! PCM16 <-> base64, Int16 buffer concatenation, ID generation.
//! Everything here is pure and allocation-only; no I/O.

use base64::Engine;
use rand::Rng;

const BASE64: base64::engine::general_purpose::GeneralPurpose =
    base64::engine::general_purpose::STANDARD;

/// Clamp a float sample to [-1, 1] and scale to the Int16 range the way the
/// reference client's encoder does: negative samples scale against the
/// negative extreme, positive samples against the positive one, so -1.0
/// reaches i16::MIN without overflowing on +1.0.
fn float_sample_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 0x8000 as f32) as i16
    } else {
        (s * 0x7fff as f32) as i16
    }
}

/// Convert Float32 samples to little-endian 16-bit PCM bytes.
pub fn float_to_16bit_pcm(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&float_sample_to_i16(sample).to_le_bytes());
    }
    out
}

/// Interpret little-endian 16-bit PCM bytes as Int16 samples.
pub fn bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Int16 samples to little-endian bytes.
pub fn i16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Decode base64 audio into Int16 PCM samples.
pub fn base64_to_i16(b64: &str) -> Result<Vec<i16>, base64::DecodeError> {
    let bytes = BASE64.decode(b64)?;
    Ok(bytes_to_i16(&bytes))
}

/// Encode Int16 PCM samples as base64.
///
/// Chunked internally by the base64 engine; callers with very large buffers
/// (minutes of audio) are not limited by any per-call size cap here.
pub fn i16_to_base64(samples: &[i16]) -> String {
    BASE64.encode(i16_to_bytes(samples))
}

/// Encode raw bytes as base64 (used for arbitrary buffers, not just audio).
pub fn bytes_to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode base64 into raw bytes.
pub fn base64_to_bytes(b64: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(b64)
}

/// Concatenate two Int16 buffers into a new, allocated buffer.
pub fn merge_int16(a: &[i16], b: &[i16]) -> Vec<i16> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out
}

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a `prefix_xxxxxxxxxxxxxxxxxxxxx`-shaped ID with a cryptographically
/// uniform alphanumeric suffix of `length` characters.
pub fn generate_id(prefix: &str, length: usize) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..length)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{prefix}{suffix}")
}

/// Generate a wire `event_id`: `"evt_"` followed by a 12-character suffix (§6).
pub fn generate_event_id() -> String {
    generate_id("evt_", 12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_base64_i16() {
        let samples: Vec<i16> = vec![0, 1, -1, 32767, -32768, 1234, -4321];
        let encoded = i16_to_base64(&samples);
        let decoded = base64_to_i16(&encoded).unwrap();
        assert_eq!(samples, decoded);
    }

    #[test]
    fn round_trip_large_buffer() {
        let samples: Vec<i16> = (0..200_000).map(|i| (i % 30000) as i16).collect();
        let encoded = i16_to_base64(&samples);
        let decoded = base64_to_i16(&encoded).unwrap();
        assert_eq!(samples, decoded);
    }

    #[test]
    fn merge_is_linear_in_length() {
        let a = vec![1i16, 2, 3];
        let b = vec![4i16, 5];
        let merged = merge_int16(&a, &b);
        assert_eq!(merged.len(), a.len() + b.len());
        assert_eq!(merged, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn merge_is_associative() {
        let a = vec![1i16, 2];
        let b = vec![3i16, 4];
        let c = vec![5i16, 6];

        let left = merge_int16(&merge_int16(&a, &b), &c);
        let right = merge_int16(&a, &merge_int16(&b, &c));
        assert_eq!(left, right);
    }

    #[test]
    fn float_pcm_clamps_and_scales() {
        let samples = [-2.0f32, -1.0, 0.0, 1.0, 2.0];
        let bytes = float_to_16bit_pcm(&samples);
        let back = bytes_to_i16(&bytes);
        assert_eq!(back[0], i16::MIN); // clamped -2.0 -> -1.0
        assert_eq!(back[1], i16::MIN);
        assert_eq!(back[2], 0);
        assert_eq!(back[4], back[3]); // clamped 2.0 -> 1.0, same as 1.0
    }

    #[test]
    fn generate_id_has_requested_shape() {
        let id = generate_id("evt_", 12);
        assert!(id.starts_with("evt_"));
        assert_eq!(id.len(), "evt_".len() + 12);
        assert!(id[4..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generate_id_is_not_constant() {
        let a = generate_id("evt_", 12);
        let b = generate_id("evt_", 12);
        assert_ne!(a, b);
    }
}
