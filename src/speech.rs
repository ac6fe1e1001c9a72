// Speech output boundary
// The orchestrator speaks replies through this trait; the embedding host
// supplies the real synthesis engine and tests supply fakes.

use async_trait::async_trait;

/// How long playback actually took, for the tts_end telemetry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechTiming {
    pub tts_ms: u64,
}

/// Errors from speech synthesis or playback.
///
/// These are deliberately not turn failures: a reply that cannot be spoken is
/// still shown as text, so the orchestrator logs these and moves on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpeechError {
    /// No synthesis engine is available on the host.
    #[error("speech output unavailable")]
    Unavailable,
    /// Synthesis or playback failed mid-utterance.
    #[error("speech playback failed: {0}")]
    PlaybackFailed(String),
    /// Playback was cancelled before it finished.
    #[error("speech playback interrupted")]
    Interrupted,
}

/// Capability interface for speaking assistant replies aloud.
#[async_trait]
pub trait SpeechOutputEngine: Send + Sync {
    /// Speak `text`, resolving when playback ends. `locale` is a BCP 47 tag
    /// hint (e.g. "ja-JP"); `None` lets the engine pick.
    async fn speak(&self, text: &str, locale: Option<&str>) -> Result<SpeechTiming, SpeechError>;

    /// Cut off any in-progress playback. Must be a no-op when idle.
    fn cancel(&self);
}
