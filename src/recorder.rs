// Utterance capture buffer
// Buffers raw sample chunks between speech onset and end-of-speech, then
// finalizes them into one encoded blob. Does not interpret audio content.

use serde::Serialize;

use crate::audio::wav::{encode_wav_bytes, WavEncodingError};
use crate::audio::WAV_MIME_TYPE;

/// One finalized speech segment, produced once per detected utterance and
/// consumed exactly once by the transcription call.
#[derive(Debug, Clone)]
pub struct CapturedUtterance {
    /// Encoded audio blob (16-bit mono WAV)
    pub data: Vec<u8>,
    /// MIME type of `data`
    pub mime_type: &'static str,
    /// Elapsed speech duration, derived from the buffered sample count
    pub duration_ms: u64,
    /// Size of `data` in bytes
    pub size_bytes: usize,
}

/// Metadata attached to the `vad_speech_end` log event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UtteranceMeta {
    pub duration_ms: u64,
    pub size_bytes: usize,
}

impl CapturedUtterance {
    /// Log-event metadata for this utterance.
    pub fn meta(&self) -> UtteranceMeta {
        UtteranceMeta {
            duration_ms: self.duration_ms,
            size_bytes: self.size_bytes,
        }
    }
}

/// Start/stop-able chunk capture over a live stream's samples.
///
/// The detector feeds it raw chunks while speech is active; `stop()` encodes
/// whatever was buffered. Stopping with nothing buffered yields a valid
/// header-only blob rather than an error — callers treat the resulting empty
/// transcript as a user-facing "didn't catch that", never a crash.
pub struct Recorder {
    sample_rate: u32,
    samples: Vec<f32>,
    recording: bool,
}

impl Recorder {
    /// Create a recorder for a stream delivering `sample_rate` Hz audio.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples: Vec::new(),
            recording: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Begin buffering chunks. Idempotent.
    pub fn start(&mut self) {
        self.recording = true;
    }

    /// Whether `start()` has been called and `stop()` has not.
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Buffer one chunk of raw samples. Chunks arriving before `start()` are
    /// discarded.
    pub fn append(&mut self, chunk: &[f32]) {
        if self.recording {
            self.samples.extend_from_slice(chunk);
        }
    }

    /// Finalize buffered chunks into one encoded utterance.
    ///
    /// Resets the recorder; buffered samples are handed off, not retained.
    pub fn stop(&mut self) -> Result<CapturedUtterance, WavEncodingError> {
        self.recording = false;
        let samples = std::mem::take(&mut self.samples);

        let duration_ms = if self.sample_rate > 0 {
            (samples.len() as u64 * 1000) / self.sample_rate as u64
        } else {
            0
        };

        let data = encode_wav_bytes(&samples, self.sample_rate)?;
        let size_bytes = data.len();

        Ok(CapturedUtterance {
            data,
            mime_type: WAV_MIME_TYPE,
            duration_ms,
            size_bytes,
        })
    }
}
