//! Audio sample conversion and buffer math
//!
//! All ingress audio is 16 kHz, mono, signed 16-bit little-endian PCM.
//! One second of audio is exactly 32 000 bytes; buffer thresholds are
//! expressed in milliseconds and converted through [`bytes_for_ms`].

/// Ingress sample rate in Hz.
pub const SAMPLE_RATE: u32 = 16_000;

/// Bytes per sample (s16le).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes per second of ingress audio.
pub const BYTES_PER_SECOND: usize = SAMPLE_RATE as usize * BYTES_PER_SAMPLE;

/// Number of PCM bytes covering `ms` milliseconds.
pub const fn bytes_for_ms(ms: usize) -> usize {
    BYTES_PER_SECOND * ms / 1000
}

/// Duration in milliseconds of a PCM byte buffer.
pub fn duration_ms(bytes: usize) -> u64 {
    (bytes as u64 * 1000) / BYTES_PER_SECOND as u64
}

const PCM16_NORMALIZE: f32 = 32768.0;

/// Decode s16le bytes into normalized f32 samples in [-1.0, 1.0].
///
/// A trailing odd byte is ignored.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            sample as f32 / PCM16_NORMALIZE
        })
        .collect()
}

/// Decode s16le bytes into i16 samples.
pub fn pcm16_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// RMS of s16le bytes on the int16 scale.
///
/// Silence thresholds throughout the server are expressed on this scale
/// (full-scale speech is ~10 000+, room noise well under 100).
pub fn rms_i16(bytes: &[u8]) -> f64 {
    if bytes.len() < 2 {
        return 0.0;
    }
    let mut sum = 0.0f64;
    let mut n = 0usize;
    for chunk in bytes.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]) as f64;
        sum += sample * sample;
        n += 1;
    }
    (sum / n as f64).sqrt()
}

/// RMS of normalized f32 samples.
pub fn rms_f32(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_math() {
        assert_eq!(BYTES_PER_SECOND, 32_000);
        assert_eq!(bytes_for_ms(1500), 48_000);
        assert_eq!(bytes_for_ms(2500), 80_000);
        assert_eq!(bytes_for_ms(30), 960);
        assert_eq!(duration_ms(32_000), 1000);
        assert_eq!(duration_ms(960), 30);
    }

    #[test]
    fn test_pcm16_to_f32() {
        let bytes: Vec<u8> = vec![0x00, 0x40, 0x00, 0xC0]; // +16384, -16384
        let samples = pcm16_to_f32(&bytes);
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.5).abs() < 1e-3);
        assert!((samples[1] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_pcm16_ignores_trailing_byte() {
        let bytes: Vec<u8> = vec![0x00, 0x40, 0x7F];
        assert_eq!(pcm16_to_f32(&bytes).len(), 1);
    }

    #[test]
    fn test_rms_silence_vs_tone() {
        let silence = vec![0u8; 960];
        assert_eq!(rms_i16(&silence), 0.0);

        let tone: Vec<u8> = std::iter::repeat([0x00u8, 0x10u8])
            .take(480)
            .flatten()
            .collect();
        assert!(rms_i16(&tone) > 1000.0);
    }

    #[test]
    fn test_rms_short_input() {
        assert_eq!(rms_i16(&[0x7F]), 0.0);
        assert_eq!(rms_i16(&[]), 0.0);
    }
}
