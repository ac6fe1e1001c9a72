// Backend collaborator interface
// The orchestrator talks to the widget backend only through `WidgetApi`;
// the HTTP client lives in `http` and tests supply fakes.

use async_trait::async_trait;
use serde::Deserialize;

use crate::orchestrator::InteractionMode;
use crate::recorder::CapturedUtterance;

pub mod http;
pub use http::HttpApiClient;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

/// Upper bound on an encoded utterance accepted for transcription (15 MiB).
/// The backend enforces the same bound with a 413; checking client-side saves
/// the upload.
pub const MAX_ASR_PAYLOAD_BYTES: usize = 15 * 1024 * 1024;

/// Errors from backend calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// A session-scoped call was made before session bootstrap completed.
    #[error("no active session")]
    MissingSession,
    /// The request never completed (network, timeout, DNS).
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend answered with a non-success status.
    #[error("backend returned {status} for {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },
    /// The encoded utterance exceeds what the backend will accept.
    #[error("utterance too large ({size_bytes} bytes)")]
    PayloadTooLarge { size_bytes: usize },
    /// The reply pipeline produced no text.
    #[error("empty reply from backend")]
    EmptyReply,
}

/// Session established at widget bootstrap.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub intimacy_level: Option<u32>,
}

/// Result of transcribing one utterance. May be empty when the audio carried
/// no recognizable speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
}

impl Transcript {
    /// Whether the transcript is usable as a conversation turn.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub assistant_text: String,
    pub intimacy_level: Option<u32>,
}

/// Everything the orchestrator needs from the backend.
///
/// `log_event` is fire-and-forget by contract: implementations swallow every
/// failure, so telemetry can never turn a working turn into a broken one.
#[async_trait]
pub trait WidgetApi: Send + Sync {
    /// Current session id, if bootstrap has completed.
    fn session_id(&self) -> Option<String>;

    /// Establish a session for this site. Called once at widget bootstrap.
    async fn create_session(&self) -> Result<SessionInfo, ApiError>;

    /// Transcribe one captured utterance.
    async fn transcribe(&self, utterance: &CapturedUtterance) -> Result<Transcript, ApiError>;

    /// Obtain the assistant reply for one user turn. `mode` tells the backend
    /// whether the text came in by voice or typing.
    async fn converse(&self, user_text: &str, mode: InteractionMode) -> Result<Reply, ApiError>;

    /// Record one telemetry event. Never fails; errors are swallowed.
    async fn log_event(&self, event_type: &str, meta: Option<serde_json::Value>);
}
