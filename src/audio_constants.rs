//! Centralized constants for audio capture and speech detection.
//!
//! All audio-related magic numbers live here with documentation explaining
//! their purpose, so thresholds are not scattered through the detection code.

// =============================================================================
// SAMPLE RATE AND TIMING
// =============================================================================

/// Default sample rate assumed when a microphone adapter does not report one (Hz).
///
/// 16 kHz mono is the conventional rate for speech pipelines and keeps
/// utterance payloads small for upload.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// How often the detection loop drains the capture buffer and analyzes
/// energy (milliseconds). Tens of milliseconds keeps speech-boundary latency
/// low without burning CPU.
pub const ANALYSIS_INTERVAL_MS: u64 = 50;

// =============================================================================
// SPEECH SEGMENTATION DEFAULTS
// =============================================================================

/// Minimum sustained-energy duration before a segment counts as real speech
/// (milliseconds). Suppresses transient noise such as a cough or a click.
pub const DEFAULT_MIN_SPEECH_MS: u64 = 250;

/// Sustained low-energy duration after speech onset that concludes the
/// utterance (milliseconds).
pub const DEFAULT_SILENCE_MS: u64 = 700;

/// Hard ceiling on a single utterance (milliseconds). Exceeding it force-ends
/// the segment to bound both latency and upload size.
pub const DEFAULT_MAX_SPEECH_MS: u64 = 15_000;

/// RMS energy below which a frame is considered silent.
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.01;

// =============================================================================
// BUFFERING
// =============================================================================

/// Maximum capture buffer size in samples.
///
/// Sized for twice the default max utterance (2 * 15 s at 16 kHz) so the ring
/// buffer never backs up even when the detection loop falls behind by a full
/// utterance. ~1.9 MB of f32 data.
pub const MAX_BUFFER_SAMPLES: usize = 16_000 * 30;

/// Bounded buffer size for detector event channels.
///
/// An utterance produces at most a handful of events; a small buffer absorbs
/// bursts while keeping a slow consumer from pinning memory.
pub const EVENT_CHANNEL_BUFFER_SIZE: usize = 16;
