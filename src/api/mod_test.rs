use super::*;

#[test]
fn test_blank_transcript_detection() {
    assert!(Transcript { text: String::new() }.is_blank());
    assert!(Transcript {
        text: "  \n\t ".to_string()
    }
    .is_blank());
    assert!(!Transcript {
        text: "こんにちは".to_string()
    }
    .is_blank());
}

#[test]
fn test_session_info_tolerates_missing_optional_fields() {
    let info: SessionInfo = serde_json::from_str(r#"{"sessionId": "s-123"}"#).unwrap();
    assert_eq!(info.session_id, "s-123");
    assert!(info.user_id.is_none());
    assert!(info.intimacy_level.is_none());

    let info: SessionInfo =
        serde_json::from_str(r#"{"sessionId": "s-456", "intimacyLevel": 2}"#).unwrap();
    assert_eq!(info.intimacy_level, Some(2));
}

#[test]
fn test_error_display_messages() {
    assert_eq!(ApiError::MissingSession.to_string(), "no active session");
    assert_eq!(
        ApiError::PayloadTooLarge { size_bytes: 99 }.to_string(),
        "utterance too large (99 bytes)"
    );
    let status = ApiError::Status {
        status: 502,
        path: "/api/chat".to_string(),
        body: "llm_empty".to_string(),
    };
    assert_eq!(
        status.to_string(),
        "backend returned 502 for /api/chat: llm_empty"
    );
}

#[test]
fn test_asr_payload_bound_is_fifteen_mebibytes() {
    assert_eq!(MAX_ASR_PAYLOAD_BYTES, 15 * 1024 * 1024);
}

#[test]
fn test_client_has_no_session_before_bootstrap() {
    let client = HttpApiClient::new("https://widget.example.com/", "site-1");
    assert!(client.session_id().is_none());
}

#[tokio::test]
async fn test_log_event_without_session_is_silently_dropped() {
    // No session means no network call; this must return immediately
    let client = HttpApiClient::new("https://widget.example.com", "site-1");
    client
        .log_event(crate::events::telemetry_events::WIDGET_OPEN, None)
        .await;
}
