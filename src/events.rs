// Widget events
// Telemetry event names sent to the backend log sink, UI event payloads, and
// the emission trait the embedding host implements.

use serde::Serialize;

/// Telemetry event names as constants for consistency.
///
/// These travel to the backend log endpoint verbatim; dashboards key on them,
/// so they never change casing or spelling.
pub mod telemetry_events {
    pub const WIDGET_OPEN: &str = "widget_open";
    pub const CONSENT_ACCEPT: &str = "consent_accept";
    pub const CONSENT_REJECT: &str = "consent_reject";
    pub const SESSION_CREATE: &str = "session_create";
    pub const VAD_SPEECH_START: &str = "vad_speech_start";
    pub const VAD_SPEECH_END: &str = "vad_speech_end";
    pub const ASR_DONE: &str = "asr_done";
    pub const LLM_DONE: &str = "llm_done";
    pub const TTS_START: &str = "tts_start";
    pub const TTS_END: &str = "tts_end";
    pub const MODE_SWITCH: &str = "mode_switch";
    pub const STOP: &str = "stop";
    pub const ERROR: &str = "error";
}

/// Metadata for the asr_done event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AsrDoneMeta {
    /// Transcription round-trip latency in milliseconds
    pub asr_ms: u64,
}

/// Metadata for the llm_done event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LlmDoneMeta {
    /// Reply round-trip latency in milliseconds
    pub llm_ms: u64,
}

/// Metadata for the tts_end event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TtsEndMeta {
    /// Speech playback duration in milliseconds
    pub tts_ms: u64,
}

/// Metadata for the error event
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorMeta {
    /// Which stage failed (e.g. "mic_permission", "pipeline", "asr_empty")
    pub phase: String,
    /// Descriptive error message
    pub message: String,
}

/// Metadata for the mode_switch event
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModeSwitchMeta {
    /// Target mode, "voice" or "text"
    pub mode: String,
}

/// Who authored a conversation message shown in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Payload for a conversation message pushed to the UI
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MessagePayload {
    pub role: MessageRole,
    pub text: String,
}

/// Payload for a phase change pushed to the UI
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PhaseChangedPayload {
    pub phase: crate::phase::Phase,
    /// ISO 8601 timestamp of the transition
    pub timestamp: String,
}

/// Payload for a user-facing error notice
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorNoticePayload {
    /// Localized message suitable for direct display
    pub message: String,
}

/// Trait for pushing state to the rendering layer
/// Allows mocking in tests while the embedding host supplies the real one
pub trait UiEventEmitter: Send + Sync {
    /// Phase indicator changed
    fn emit_phase_changed(&self, payload: PhaseChangedPayload);

    /// A message was added to the conversation
    fn emit_message(&self, payload: MessagePayload);

    /// A user-facing error notice should be shown
    fn emit_error(&self, payload: ErrorNoticePayload);
}

/// Get the current timestamp in ISO 8601 format
pub fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_meta_uses_camel_case_keys() {
        let json = serde_json::to_value(AsrDoneMeta { asr_ms: 420 }).unwrap();
        assert_eq!(json, serde_json::json!({"asrMs": 420}));

        let json = serde_json::to_value(TtsEndMeta { tts_ms: 1500 }).unwrap();
        assert_eq!(json, serde_json::json!({"ttsMs": 1500}));
    }

    #[test]
    fn test_error_meta_shape() {
        let json = serde_json::to_value(ErrorMeta {
            phase: "pipeline".to_string(),
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"phase": "pipeline", "message": "boom"}));
    }

    #[test]
    fn test_message_role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_current_timestamp_is_rfc3339() {
        let ts = current_timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
