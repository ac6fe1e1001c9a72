// Speech boundary segmentation
// Energy-based (RMS) classification of a live sample stream into exactly one
// speech-start / speech-end pair per utterance.

use crate::trace;
use serde::Deserialize;

use crate::audio_constants::{
    DEFAULT_ENERGY_THRESHOLD, DEFAULT_MAX_SPEECH_MS, DEFAULT_MIN_SPEECH_MS, DEFAULT_SILENCE_MS,
};

/// Configuration for speech boundary detection.
///
/// The three durations form the behavioral contract: onset confirmed after
/// `min_speech_ms` of sustained energy, end concluded after `silence_ms` of
/// sustained low energy, and `max_speech_ms` as a hard ceiling that force-ends
/// over-long utterances.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VadConfig {
    /// Minimum sustained-energy duration before a segment counts as speech (ms)
    pub min_speech_ms: u64,
    /// Sustained low-energy duration that concludes the utterance (ms)
    pub silence_ms: u64,
    /// Hard ceiling on one utterance (ms)
    pub max_speech_ms: u64,
    /// RMS energy below which a frame is considered silent
    pub energy_threshold: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            min_speech_ms: DEFAULT_MIN_SPEECH_MS,
            silence_ms: DEFAULT_SILENCE_MS,
            max_speech_ms: DEFAULT_MAX_SPEECH_MS,
            energy_threshold: DEFAULT_ENERGY_THRESHOLD,
        }
    }
}

/// Why an utterance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// `silence_ms` of sustained low energy after speech
    Silence,
    /// `max_speech_ms` ceiling reached while speech continued
    MaxDuration,
}

/// Boundary event produced by the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEvent {
    /// Onset confirmed after `min_speech_ms` of sustained energy.
    /// `onset_ms` is when energy first rose, not when it was confirmed.
    SpeechStart { onset_ms: u64 },
    /// Utterance concluded. `speech_end_ms` is when speech energy last ceased
    /// (for `Silence`) or the ceiling moment (for `MaxDuration`).
    SpeechEnd {
        reason: EndReason,
        onset_ms: u64,
        speech_end_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmenterState {
    /// No speech energy seen yet
    Quiet,
    /// Energy rose but has not been sustained for `min_speech_ms`
    Pending { since_ms: u64 },
    /// Confirmed utterance in progress
    InSpeech {
        onset_ms: u64,
        silence_since_ms: Option<u64>,
    },
    /// SpeechEnd fired; this segmenter will never fire again
    Exhausted,
}

/// Classifies a live stream into speech/non-speech regions.
///
/// Pure and clock-injected: callers pass an explicit `now_ms` with each frame,
/// so the production driver feeds wall-clock offsets and tests feed a
/// deterministic trace. Guarantees exactly one `SpeechStart` followed by
/// exactly one `SpeechEnd` per instance; after the end event the segmenter is
/// exhausted and stays silent.
pub struct SpeechSegmenter {
    config: VadConfig,
    state: SegmenterState,
}

impl SpeechSegmenter {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: SegmenterState::Quiet,
        }
    }

    /// Whether the utterance has concluded.
    pub fn is_exhausted(&self) -> bool {
        self.state == SegmenterState::Exhausted
    }

    /// Whether a confirmed utterance is currently in progress.
    pub fn in_speech(&self) -> bool {
        matches!(self.state, SegmenterState::InSpeech { .. })
    }

    /// RMS energy of a frame. Returns 0.0 for an empty frame.
    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
        (sum_squares / samples.len() as f32).sqrt()
    }

    /// Feed one frame observed at `now_ms` (milliseconds since analysis
    /// began). Frames must arrive in non-decreasing time order.
    pub fn push_frame(&mut self, samples: &[f32], now_ms: u64) -> Option<SegmentEvent> {
        let energy = Self::rms(samples);
        let loud = energy >= self.config.energy_threshold;
        trace!(
            "[vad] t={}ms rms={:.4} loud={} state={:?}",
            now_ms,
            energy,
            loud,
            self.state
        );

        match self.state {
            SegmenterState::Exhausted => None,

            SegmenterState::Quiet => {
                if loud {
                    self.state = SegmenterState::Pending { since_ms: now_ms };
                }
                None
            }

            SegmenterState::Pending { since_ms } => {
                if !loud {
                    // Transient noise: not sustained, forget it
                    self.state = SegmenterState::Quiet;
                    return None;
                }
                if now_ms.saturating_sub(since_ms) >= self.config.min_speech_ms {
                    self.state = SegmenterState::InSpeech {
                        onset_ms: since_ms,
                        silence_since_ms: None,
                    };
                    return Some(SegmentEvent::SpeechStart { onset_ms: since_ms });
                }
                None
            }

            SegmenterState::InSpeech {
                onset_ms,
                silence_since_ms,
            } => {
                // Ceiling applies whether or not the frame is loud
                if now_ms.saturating_sub(onset_ms) >= self.config.max_speech_ms {
                    self.state = SegmenterState::Exhausted;
                    return Some(SegmentEvent::SpeechEnd {
                        reason: EndReason::MaxDuration,
                        onset_ms,
                        speech_end_ms: now_ms,
                    });
                }

                if loud {
                    if silence_since_ms.is_some() {
                        // Speech resumed before the silence requirement was met
                        self.state = SegmenterState::InSpeech {
                            onset_ms,
                            silence_since_ms: None,
                        };
                    }
                    return None;
                }

                let silence_start = match silence_since_ms {
                    Some(t) => t,
                    None => {
                        self.state = SegmenterState::InSpeech {
                            onset_ms,
                            silence_since_ms: Some(now_ms),
                        };
                        now_ms
                    }
                };

                if now_ms.saturating_sub(silence_start) >= self.config.silence_ms {
                    self.state = SegmenterState::Exhausted;
                    return Some(SegmentEvent::SpeechEnd {
                        reason: EndReason::Silence,
                        onset_ms,
                        speech_end_ms: silence_start,
                    });
                }
                None
            }
        }
    }
}
