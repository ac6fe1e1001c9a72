// In-memory WAV encoding for finalized utterances

use std::io::Cursor;

/// MIME type reported for finalized utterance blobs.
pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Errors that can occur while encoding an utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum WavEncodingError {
    /// Error from the WAV encoder itself
    EncodingError(String),
}

impl std::fmt::Display for WavEncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WavEncodingError::EncodingError(msg) => write!(f, "Encoding error: {}", msg),
        }
    }
}

impl std::error::Error for WavEncodingError {}

fn hound_error(e: hound::Error) -> WavEncodingError {
    WavEncodingError::EncodingError(e.to_string())
}

/// Encode f32 samples (expected range -1.0..=1.0) into an in-memory 16-bit
/// mono WAV blob.
///
/// An empty sample slice yields a valid header-only WAV rather than an error;
/// downstream transcription of such a blob simply comes back empty.
pub fn encode_wav_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, WavEncodingError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(hound_error)?;
        for &sample in samples {
            // NaN clamps to 0 via the comparison chain below
            let clamped = if sample.is_finite() {
                sample.clamp(-1.0, 1.0)
            } else {
                0.0
            };
            let value = (clamped * i16::MAX as f32) as i16;
            writer.write_sample(value).map_err(hound_error)?;
        }
        writer.finalize().map_err(hound_error)?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_produces_riff_header() {
        let samples = vec![0.0f32; 160];
        let bytes = encode_wav_bytes(&samples, 16_000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte header + 2 bytes per 16-bit sample
        assert_eq!(bytes.len(), 44 + samples.len() * 2);
    }

    #[test]
    fn test_encode_empty_samples_yields_header_only_blob() {
        let bytes = encode_wav_bytes(&[], 16_000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(bytes.len(), 44);
    }

    #[test]
    fn test_encode_clamps_out_of_range_and_non_finite() {
        let samples = vec![2.0, -2.0, f32::NAN, f32::INFINITY];
        let bytes = encode_wav_bytes(&samples, 16_000).unwrap();
        assert_eq!(bytes.len(), 44 + samples.len() * 2);
    }

    #[test]
    fn test_encode_preserves_sample_rate_in_header() {
        let bytes = encode_wav_bytes(&[0.1, 0.2], 48_000).unwrap();
        // Sample rate lives at byte offset 24 in the fmt chunk
        let rate = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
        assert_eq!(rate, 48_000);
    }
}
