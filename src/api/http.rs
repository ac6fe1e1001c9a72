// HTTP implementation of the backend interface

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{ApiError, Reply, SessionInfo, Transcript, WidgetApi, MAX_ASR_PAYLOAD_BYTES};
use crate::orchestrator::InteractionMode;
use crate::recorder::CapturedUtterance;
use crate::{debug, warn};

const SESSION_PATH: &str = "/api/session";
const ASR_PATH: &str = "/api/asr";
const CHAT_PATH: &str = "/api/chat";
const LOGS_PATH: &str = "/api/logs";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest<'a> {
    site_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    session_id: &'a str,
    user_text: &'a str,
    input_mode: InteractionMode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogBatchRequest<'a> {
    session_id: &'a str,
    events: Vec<LogEntry<'a>>,
}

#[derive(Serialize)]
struct LogEntry<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    meta: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AsrResponse {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    assistant_text: String,
    #[serde(default)]
    intimacy_level: Option<u32>,
}

/// Backend client over plain HTTP.
///
/// Holds the session established at bootstrap; every session-scoped call reads
/// it under the lock so the orchestrator never has to thread a session id
/// through the pipeline.
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
    site_id: String,
    session: Mutex<Option<SessionInfo>>,
}

impl HttpApiClient {
    pub fn new(base_url: impl Into<String>, site_id: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            site_id: site_id.into(),
            session: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn require_session(&self) -> Result<String, ApiError> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.session_id.clone())
            .ok_or(ApiError::MissingSession)
    }

    /// Check the response status, folding non-success into `ApiError::Status`.
    async fn check(path: &str, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            path: path.to_string(),
            body,
        })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

#[async_trait]
impl WidgetApi for HttpApiClient {
    fn session_id(&self) -> Option<String> {
        self.session.lock().as_ref().map(|s| s.session_id.clone())
    }

    async fn create_session(&self) -> Result<SessionInfo, ApiError> {
        let response = self
            .client
            .post(self.url(SESSION_PATH))
            .json(&SessionRequest {
                site_id: &self.site_id,
            })
            .send()
            .await?;
        let response = Self::check(SESSION_PATH, response).await?;
        let info: SessionInfo = response.json().await?;

        debug!("[api] session established: {}", info.session_id);
        *self.session.lock() = Some(info.clone());
        Ok(info)
    }

    async fn transcribe(&self, utterance: &CapturedUtterance) -> Result<Transcript, ApiError> {
        let session_id = self.require_session()?;

        if utterance.size_bytes > MAX_ASR_PAYLOAD_BYTES {
            // The backend would answer 413; skip the upload
            return Err(ApiError::PayloadTooLarge {
                size_bytes: utterance.size_bytes,
            });
        }

        let part = reqwest::multipart::Part::bytes(utterance.data.clone())
            .file_name("audio.wav")
            .mime_str(utterance.mime_type)
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("sessionId", session_id)
            .part("audio", part);

        let response = self
            .client
            .post(self.url(ASR_PATH))
            .multipart(form)
            .send()
            .await?;

        if response.status().as_u16() == 413 {
            return Err(ApiError::PayloadTooLarge {
                size_bytes: utterance.size_bytes,
            });
        }
        let response = Self::check(ASR_PATH, response).await?;
        let body: AsrResponse = response.json().await?;
        Ok(Transcript { text: body.text })
    }

    async fn converse(&self, user_text: &str, mode: InteractionMode) -> Result<Reply, ApiError> {
        let session_id = self.require_session()?;

        let response = self
            .client
            .post(self.url(CHAT_PATH))
            .json(&ChatRequest {
                session_id: &session_id,
                user_text,
                input_mode: mode,
            })
            .send()
            .await?;
        let response = Self::check(CHAT_PATH, response).await?;
        let body: ChatResponse = response.json().await?;

        let assistant_text = body.assistant_text.trim().to_string();
        if assistant_text.is_empty() {
            return Err(ApiError::EmptyReply);
        }
        Ok(Reply {
            assistant_text,
            intimacy_level: body.intimacy_level,
        })
    }

    async fn log_event(&self, event_type: &str, meta: Option<serde_json::Value>) {
        // No session yet means nowhere to attribute the event; drop it
        let session_id = match self.session.lock().as_ref() {
            Some(s) => s.session_id.clone(),
            None => return,
        };

        let batch = LogBatchRequest {
            session_id: &session_id,
            events: vec![LogEntry { event_type, meta }],
        };

        // Telemetry must never break the turn
        match self.client.post(self.url(LOGS_PATH)).json(&batch).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(
                    "[api] log sink rejected {} with {}",
                    event_type,
                    response.status()
                );
            }
            Ok(_) => {}
            Err(e) => warn!("[api] failed to deliver {} event: {}", event_type, e),
        }
    }
}
