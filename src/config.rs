// Widget configuration
// Deserialized from the embed snippet's JSON; everything except the site
// binding has a sensible default.

use serde::Deserialize;

use crate::vad::VadConfig;

/// Configuration supplied by the embedding page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    /// Site this widget instance belongs to; scopes the backend session
    pub site_id: String,
    /// Backend origin, e.g. "https://widget.example.com"
    pub base_url: String,
    /// Assistant display name shown in the header
    #[serde(default)]
    pub display_name: Option<String>,
    /// Avatar image URL
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// BCP 47 locale hint for speech output, e.g. "ja-JP"
    #[serde(default)]
    pub locale: Option<String>,
    /// Speech boundary detection tuning
    #[serde(default)]
    pub vad: VadConfig,
    /// User-facing notice strings
    #[serde(default)]
    pub messages: UserMessages,
}

/// User-facing notice strings, overridable per deployment.
///
/// Defaults are the Japanese production copy. `pipeline_failed` and
/// `chat_failed` are templates; `{err}` is replaced with the error text.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserMessages {
    pub consent_required: String,
    pub mic_unavailable: String,
    pub asr_empty: String,
    pub pipeline_failed: String,
    pub chat_failed: String,
    pub session_init_failed: String,
    pub session_pending: String,
}

impl Default for UserMessages {
    fn default() -> Self {
        Self {
            consent_required: "音声開始には同意が必要です。".to_string(),
            mic_unavailable: "マイクが利用できません。テキスト入力をご利用ください。".to_string(),
            asr_empty: "音声の認識に失敗しました。テキスト入力をご利用ください。".to_string(),
            pipeline_failed: "処理に失敗しました: {err}".to_string(),
            chat_failed: "チャットに失敗しました: {err}".to_string(),
            session_init_failed: "セッション初期化に失敗しました。ページを再読み込みしてください。"
                .to_string(),
            session_pending: "セッション初期化中です。少し待ってからもう一度お試しください。"
                .to_string(),
        }
    }
}

impl UserMessages {
    /// Render a `{err}` template with the given error text.
    pub fn render(template: &str, err: &str) -> String {
        template.replace("{err}", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config: WidgetConfig = serde_json::from_str(
            r#"{"siteId": "site-1", "baseUrl": "https://widget.example.com"}"#,
        )
        .unwrap();
        assert_eq!(config.site_id, "site-1");
        assert!(config.display_name.is_none());
        assert_eq!(config.vad.silence_ms, 700);
        assert_eq!(
            config.messages.consent_required,
            "音声開始には同意が必要です。"
        );
    }

    #[test]
    fn test_vad_overrides_are_honored() {
        let config: WidgetConfig = serde_json::from_str(
            r#"{
                "siteId": "site-1",
                "baseUrl": "https://widget.example.com",
                "vad": {"maxSpeechMs": 30000}
            }"#,
        )
        .unwrap();
        assert_eq!(config.vad.max_speech_ms, 30_000);
        assert_eq!(config.vad.min_speech_ms, 250);
    }

    #[test]
    fn test_message_template_rendering() {
        let messages = UserMessages::default();
        let rendered = UserMessages::render(&messages.pipeline_failed, "timeout");
        assert_eq!(rendered, "処理に失敗しました: timeout");
    }

    #[test]
    fn test_message_overrides() {
        let config: WidgetConfig = serde_json::from_str(
            r#"{
                "siteId": "site-1",
                "baseUrl": "https://widget.example.com",
                "messages": {"consentRequired": "Consent required."}
            }"#,
        )
        .unwrap();
        assert_eq!(config.messages.consent_required, "Consent required.");
        // Untouched fields keep their defaults
        assert!(config.messages.asr_empty.contains("音声の認識"));
    }
}
