// Conversational voice widget core
// Captures microphone audio, detects speech boundaries locally, transcribes,
// obtains a reply, and speaks it back, with strict single-turn sequencing and
// guaranteed resource release on every exit path. The embedding host supplies
// the platform adapters (microphone, speech output, UI surface).

pub mod api;
pub mod audio;
pub mod audio_constants;
pub mod config;
pub mod events;
pub mod orchestrator;
pub mod phase;
pub mod recorder;
pub mod speech;
pub mod vad;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Re-export log macros for use throughout the crate
pub use log::{debug, error, info, trace, warn};

pub use api::{ApiError, HttpApiClient, WidgetApi};
pub use audio::{AudioBuffer, CaptureError, MicrophoneSource, MicrophoneStream};
pub use config::{UserMessages, WidgetConfig};
pub use events::UiEventEmitter;
pub use orchestrator::{Consent, InteractionMode, Orchestrator};
pub use phase::{transition, Phase, TurnEvent};
pub use recorder::CapturedUtterance;
pub use speech::{SpeechError, SpeechOutputEngine, SpeechTiming};
pub use vad::{VadConfig, VadEvent, VoiceActivityDetector};

/// Process-wide widget-presence flag. Set once on first init, never reset.
static WIDGET_PRESENT: AtomicBool = AtomicBool::new(false);

/// Initialize the widget core once per process.
///
/// A page can end up with the embed snippet twice; the second attempt is a
/// guaranteed no-op returning `None`, so only one orchestrator ever exists.
pub fn init<A, S, E>(
    api: Arc<A>,
    speech: Arc<S>,
    ui: Arc<E>,
    microphone: Arc<dyn MicrophoneSource>,
    config: WidgetConfig,
    consent: Consent,
) -> Option<Arc<Orchestrator<A, S, E>>>
where
    A: WidgetApi,
    S: SpeechOutputEngine,
    E: UiEventEmitter,
{
    if WIDGET_PRESENT.swap(true, Ordering::SeqCst) {
        warn!("[init] widget already present, ignoring second init");
        return None;
    }
    info!("[init] widget core initialized for site {}", config.site_id);
    Some(Arc::new(Orchestrator::new(
        api, speech, ui, microphone, config, consent,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullApi;

    #[async_trait]
    impl WidgetApi for NullApi {
        fn session_id(&self) -> Option<String> {
            None
        }
        async fn create_session(&self) -> Result<api::SessionInfo, ApiError> {
            Err(ApiError::MissingSession)
        }
        async fn transcribe(
            &self,
            _utterance: &CapturedUtterance,
        ) -> Result<api::Transcript, ApiError> {
            Err(ApiError::MissingSession)
        }
        async fn converse(
            &self,
            _user_text: &str,
            _mode: InteractionMode,
        ) -> Result<api::Reply, ApiError> {
            Err(ApiError::MissingSession)
        }
        async fn log_event(&self, _event_type: &str, _meta: Option<serde_json::Value>) {}
    }

    struct NullSpeech;

    #[async_trait]
    impl SpeechOutputEngine for NullSpeech {
        async fn speak(
            &self,
            _text: &str,
            _locale: Option<&str>,
        ) -> Result<SpeechTiming, SpeechError> {
            Err(SpeechError::Unavailable)
        }
        fn cancel(&self) {}
    }

    struct NullUi;

    impl UiEventEmitter for NullUi {
        fn emit_phase_changed(&self, _payload: events::PhaseChangedPayload) {}
        fn emit_message(&self, _payload: events::MessagePayload) {}
        fn emit_error(&self, _payload: events::ErrorNoticePayload) {}
    }

    struct NullMic;

    impl MicrophoneSource for NullMic {
        fn acquire(
            &self,
            _buffer: AudioBuffer,
            _failure: std::sync::mpsc::Sender<CaptureError>,
        ) -> Result<Box<dyn MicrophoneStream>, CaptureError> {
            Err(CaptureError::NoDevice)
        }
    }

    fn test_config() -> WidgetConfig {
        serde_json::from_str(r#"{"siteId": "site-1", "baseUrl": "https://widget.example.com"}"#)
            .unwrap()
    }

    #[test]
    fn test_second_init_is_a_no_op() {
        let first = init(
            Arc::new(NullApi),
            Arc::new(NullSpeech),
            Arc::new(NullUi),
            Arc::new(NullMic) as Arc<dyn MicrophoneSource>,
            test_config(),
            Consent::Unset,
        );
        assert!(first.is_some());

        let second = init(
            Arc::new(NullApi),
            Arc::new(NullSpeech),
            Arc::new(NullUi),
            Arc::new(NullMic) as Arc<dyn MicrophoneSource>,
            test_config(),
            Consent::Unset,
        );
        assert!(second.is_none());
    }
}
