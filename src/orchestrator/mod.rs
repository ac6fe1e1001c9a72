// Turn orchestration
// Owns the mutable session (mic handle, detector, in-flight flag, mode) and
// sequences one conversational turn end to end. Every failure path funnels
// into the single teardown routine so no exit can leave hardware held or the
// phase stuck outside idle.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use crate::api::{ApiError, WidgetApi};
use crate::audio::{AudioBuffer, MicrophoneSource, MicrophoneStream};
use crate::config::{UserMessages, WidgetConfig};
use crate::events::{
    current_timestamp, telemetry_events, AsrDoneMeta, ErrorMeta, ErrorNoticePayload, LlmDoneMeta,
    MessagePayload, MessageRole, ModeSwitchMeta, PhaseChangedPayload, TtsEndMeta, UiEventEmitter,
};
use crate::phase::{transition, Phase, TurnEvent};
use crate::recorder::{CapturedUtterance, Recorder};
use crate::speech::SpeechOutputEngine;
use crate::vad::{VadEvent, VoiceActivityDetector};
use crate::{info, warn};

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

/// Which input path is active. Switching while the other path's hardware is
/// live tears that path down first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    Voice,
    Text,
}

/// Microphone consent, persisted by the embedding host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    Unset,
    Accepted,
    Rejected,
}

/// Stage tags attached to error telemetry.
mod phase_tags {
    pub const MIC_PERMISSION: &str = "mic_permission";
    pub const VAD: &str = "vad";
    pub const ASR_EMPTY: &str = "asr_empty";
    pub const PIPELINE: &str = "pipeline";
    pub const CHAT_TEXT: &str = "chat_text";
    pub const USER_STOP: &str = "user_stop";
    pub const MODE_SWITCH: &str = "mode_switch";
}

/// Mutable per-session state, exclusively owned by the orchestrator.
///
/// `mic` and `vad` are nulled on every teardown, never left pointing at a
/// stopped object, so "is X active" stays a cheap `is_some()` check.
struct SessionContext {
    phase: Phase,
    mode: InteractionMode,
    consent: Consent,
    in_flight: bool,
    /// Bumped by teardown and by every turn start. A turn captures the value
    /// when it takes `in_flight` and re-checks it after each await, so a
    /// continuation resuming after teardown (or after a newer turn began)
    /// can never touch state it no longer owns.
    turn_seq: u64,
    mic: Option<Box<dyn MicrophoneStream>>,
    vad: Option<VoiceActivityDetector>,
}

impl SessionContext {
    fn new(consent: Consent) -> Self {
        Self {
            phase: Phase::Idle,
            mode: InteractionMode::Voice,
            consent,
            in_flight: false,
            turn_seq: 0,
            mic: None,
            vad: None,
        }
    }
}

/// Drives one conversational turn at a time against the collaborator
/// interfaces. All entry points take `&self`; the session context lives
/// behind a mutex that is never held across an await.
pub struct Orchestrator<A, S, E>
where
    A: WidgetApi,
    S: SpeechOutputEngine,
    E: UiEventEmitter,
{
    api: Arc<A>,
    speech: Arc<S>,
    ui: Arc<E>,
    microphone: Arc<dyn MicrophoneSource>,
    config: WidgetConfig,
    ctx: Mutex<SessionContext>,
}

impl<A, S, E> Orchestrator<A, S, E>
where
    A: WidgetApi,
    S: SpeechOutputEngine,
    E: UiEventEmitter,
{
    pub fn new(
        api: Arc<A>,
        speech: Arc<S>,
        ui: Arc<E>,
        microphone: Arc<dyn MicrophoneSource>,
        config: WidgetConfig,
        consent: Consent,
    ) -> Self {
        Self {
            api,
            speech,
            ui,
            microphone,
            config,
            ctx: Mutex::new(SessionContext::new(consent)),
        }
    }

    // ----- observable state -----

    pub fn phase(&self) -> Phase {
        self.ctx.lock().phase
    }

    pub fn mode(&self) -> InteractionMode {
        self.ctx.lock().mode
    }

    pub fn consent(&self) -> Consent {
        self.ctx.lock().consent
    }

    pub fn is_in_flight(&self) -> bool {
        self.ctx.lock().in_flight
    }

    pub fn is_mic_held(&self) -> bool {
        self.ctx.lock().mic.is_some()
    }

    pub fn is_vad_active(&self) -> bool {
        self.ctx.lock().vad.is_some()
    }

    fn messages(&self) -> &UserMessages {
        &self.config.messages
    }

    /// Update the phase inside an existing lock, notifying the UI on change.
    fn set_phase(&self, ctx: &mut SessionContext, next: Phase) {
        if ctx.phase == next {
            return;
        }
        info!("[orchestrator] phase {:?} -> {:?}", ctx.phase, next);
        ctx.phase = next;
        self.ui.emit_phase_changed(PhaseChangedPayload {
            phase: next,
            timestamp: current_timestamp(),
        });
    }

    // ----- lifecycle -----

    /// Establish the backend session. Failure is non-fatal to rendering; the
    /// user is told to reload and turns stay disabled until a session exists.
    pub async fn init_session(&self) {
        match self.api.create_session().await {
            Ok(info) => {
                info!("[orchestrator] session ready: {}", info.session_id);
                self.api
                    .log_event(telemetry_events::SESSION_CREATE, None)
                    .await;
            }
            Err(e) => {
                warn!("[orchestrator] session bootstrap failed: {}", e);
                self.ui.emit_error(ErrorNoticePayload {
                    message: self.messages().session_init_failed.clone(),
                });
            }
        }
    }

    /// The widget panel was opened.
    pub async fn handle_open(&self) {
        self.api.log_event(telemetry_events::WIDGET_OPEN, None).await;
    }

    pub async fn accept_consent(&self) {
        self.ctx.lock().consent = Consent::Accepted;
        self.api
            .log_event(telemetry_events::CONSENT_ACCEPT, None)
            .await;
    }

    pub async fn reject_consent(&self) {
        self.ctx.lock().consent = Consent::Rejected;
        self.api
            .log_event(telemetry_events::CONSENT_REJECT, None)
            .await;
    }

    /// Select the input mode, tearing down the previous mode's resources
    /// first so mic and speech output are never held across the switch.
    pub async fn set_mode(&self, mode: InteractionMode) {
        {
            let ctx = self.ctx.lock();
            if ctx.mode == mode {
                return;
            }
        }

        let other_mode_active = {
            let ctx = self.ctx.lock();
            ctx.mic.is_some() || ctx.vad.is_some() || ctx.phase != Phase::Idle
        };
        if other_mode_active {
            self.teardown(phase_tags::MODE_SWITCH, None).await;
        }

        self.ctx.lock().mode = mode;
        let meta = serde_json::to_value(ModeSwitchMeta {
            mode: match mode {
                InteractionMode::Voice => "voice".to_string(),
                InteractionMode::Text => "text".to_string(),
            },
        })
        .ok();
        self.api
            .log_event(telemetry_events::MODE_SWITCH, meta)
            .await;
    }

    // ----- voice path -----

    /// Run one full voice turn: acquire the mic, listen for an utterance,
    /// then transcribe, reply, and speak. Resolves when the turn reaches
    /// idle (normally or through teardown).
    pub async fn start_voice_turn(&self) {
        // Preconditions are user-visible, never silently swallowed
        {
            let ctx = self.ctx.lock();
            if ctx.consent != Consent::Accepted {
                drop(ctx);
                self.ui.emit_error(ErrorNoticePayload {
                    message: self.messages().consent_required.clone(),
                });
                return;
            }
            if ctx.phase != Phase::Idle || ctx.in_flight {
                info!(
                    "[orchestrator] voice turn refused, phase={:?} in_flight={}",
                    ctx.phase, ctx.in_flight
                );
                return;
            }
            if ctx.mode != InteractionMode::Voice {
                return;
            }
        }

        // Acquire the mic before leaving idle so a denial never leaves a
        // half-initialized listening state
        let buffer = AudioBuffer::new();
        let (failure_tx, failure_rx) = mpsc::channel();
        let mut mic = match self.microphone.acquire(buffer.clone(), failure_tx) {
            Ok(mic) => mic,
            Err(e) => {
                warn!("[orchestrator] microphone unavailable: {}", e);
                self.ctx.lock().mode = InteractionMode::Text;
                self.teardown(
                    phase_tags::MIC_PERMISSION,
                    Some(self.messages().mic_unavailable.clone()),
                )
                .await;
                return;
            }
        };

        let recorder = Recorder::new(mic.sample_rate());
        let mut vad = VoiceActivityDetector::new(self.config.vad.clone());
        let mut event_rx = vad.subscribe_events();
        if let Err(e) = vad.start(buffer, recorder, failure_rx) {
            mic.release();
            self.teardown(phase_tags::VAD, Some(format!("VADエラー: {}", e)))
                .await;
            return;
        }

        {
            let mut ctx = self.ctx.lock();
            ctx.mic = Some(mic);
            ctx.vad = Some(vad);
            let next = transition(ctx.phase, TurnEvent::Start);
            self.set_phase(&mut ctx, next);
        }

        // Listen until the detector delivers a terminal event. Teardown drops
        // the detector, which closes this channel and ends the loop quietly.
        while let Some(event) = event_rx.recv().await {
            match event {
                VadEvent::SpeechStart => {
                    self.api
                        .log_event(telemetry_events::VAD_SPEECH_START, None)
                        .await;
                }
                VadEvent::SpeechEnd(utterance) => {
                    if self.handle_speech_end(utterance).await {
                        return;
                    }
                }
                VadEvent::Error(message) => {
                    self.teardown(phase_tags::VAD, Some(format!("VADエラー: {}", message)))
                        .await;
                    return;
                }
            }
        }
    }

    /// React to a finished utterance. Returns false for a stale event (a
    /// straggler after stop or teardown), which must not re-enter the
    /// pipeline.
    async fn handle_speech_end(&self, utterance: CapturedUtterance) -> bool {
        let seq = {
            let mut ctx = self.ctx.lock();
            if ctx.phase != Phase::Listening || ctx.in_flight {
                info!("[orchestrator] discarding stale speech-end");
                return false;
            }
            ctx.in_flight = true;
            ctx.turn_seq = ctx.turn_seq.wrapping_add(1);
            let next = transition(ctx.phase, TurnEvent::VadDone);
            self.set_phase(&mut ctx, next);
            ctx.turn_seq
        };

        // The detector only runs while listening; release the mic with it so
        // idle never holds hardware
        self.release_capture_resources();

        self.api
            .log_event(
                telemetry_events::VAD_SPEECH_END,
                serde_json::to_value(utterance.meta()).ok(),
            )
            .await;

        self.run_voice_pipeline(utterance, seq).await;
        true
    }

    /// Transcribe, reply, and speak one captured utterance. Runs in the
    /// thinking and speaking phases with `in_flight` held.
    async fn run_voice_pipeline(&self, utterance: CapturedUtterance, seq: u64) {
        let asr_started = Instant::now();
        let transcript = match self.api.transcribe(&utterance).await {
            Ok(t) => t,
            Err(e) => {
                self.fail_pipeline(phase_tags::PIPELINE, &e).await;
                return;
            }
        };
        self.api
            .log_event(
                telemetry_events::ASR_DONE,
                serde_json::to_value(AsrDoneMeta {
                    asr_ms: asr_started.elapsed().as_millis() as u64,
                })
                .ok(),
            )
            .await;

        if !self.turn_still_live(seq) {
            return;
        }

        if transcript.is_blank() {
            // Dead end, not a crash: the audio carried nothing recognizable
            self.teardown(
                phase_tags::ASR_EMPTY,
                Some(self.messages().asr_empty.clone()),
            )
            .await;
            return;
        }

        self.ui.emit_message(MessagePayload {
            role: MessageRole::User,
            text: transcript.text.trim().to_string(),
        });

        let reply = match self
            .reply_stage(transcript.text.trim(), InteractionMode::Voice)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.fail_pipeline(phase_tags::PIPELINE, &e).await;
                return;
            }
        };

        if !self.turn_still_live(seq) {
            return;
        }
        {
            let mut ctx = self.ctx.lock();
            let next = transition(ctx.phase, TurnEvent::LlmDone);
            self.set_phase(&mut ctx, next);
        }

        self.speak_stage(&reply).await;

        // A stale continuation (stop during speak, possibly with a newer turn
        // already in flight) must not clear state it does not own
        if !self.turn_still_live(seq) {
            return;
        }
        let mut ctx = self.ctx.lock();
        let next = transition(ctx.phase, TurnEvent::TtsEnd);
        self.set_phase(&mut ctx, next);
        ctx.in_flight = false;
    }

    // ----- text path -----

    /// Run one text turn. Bypasses mic and detection entirely but follows the
    /// same thinking → speaking → idle progression and teardown discipline.
    pub async fn send_text(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        {
            let ctx = self.ctx.lock();
            if ctx.in_flight {
                return;
            }
        }
        if self.api.session_id().is_none() {
            self.ui.emit_error(ErrorNoticePayload {
                message: self.messages().session_pending.clone(),
            });
            return;
        }

        // A text turn while listening supersedes the voice turn
        self.release_capture_resources();

        let seq = {
            let mut ctx = self.ctx.lock();
            ctx.in_flight = true;
            ctx.turn_seq = ctx.turn_seq.wrapping_add(1);
            self.set_phase(&mut ctx, Phase::Thinking);
            ctx.turn_seq
        };

        self.ui.emit_message(MessagePayload {
            role: MessageRole::User,
            text: text.to_string(),
        });

        let reply = match self.reply_stage(text, InteractionMode::Text).await {
            Ok(reply) => reply,
            Err(e) => {
                let message = UserMessages::render(&self.messages().chat_failed, &e.to_string());
                self.teardown(phase_tags::CHAT_TEXT, Some(message)).await;
                return;
            }
        };

        // Stop during converse already ran teardown; the reply stays on
        // screen but must not be spoken or re-enter a phase
        if !self.turn_still_live(seq) {
            return;
        }
        {
            let mut ctx = self.ctx.lock();
            self.set_phase(&mut ctx, Phase::Speaking);
        }

        self.speak_stage(&reply).await;

        if !self.turn_still_live(seq) {
            return;
        }
        let mut ctx = self.ctx.lock();
        ctx.in_flight = false;
        self.set_phase(&mut ctx, Phase::Idle);
    }

    // ----- shared stages -----

    /// Obtain the assistant reply and surface it to the UI.
    async fn reply_stage(&self, user_text: &str, mode: InteractionMode) -> Result<String, ApiError> {
        let llm_started = Instant::now();
        let reply = self.api.converse(user_text, mode).await?;
        self.api
            .log_event(
                telemetry_events::LLM_DONE,
                serde_json::to_value(LlmDoneMeta {
                    llm_ms: llm_started.elapsed().as_millis() as u64,
                })
                .ok(),
            )
            .await;

        self.ui.emit_message(MessagePayload {
            role: MessageRole::Assistant,
            text: reply.assistant_text.clone(),
        });
        Ok(reply.assistant_text)
    }

    /// Speak the reply. Speech failures are logged and swallowed: a reply
    /// that cannot be spoken is still on screen, so the turn succeeded.
    async fn speak_stage(&self, text: &str) {
        // One physical synthesizer; anything still playing yields first
        self.speech.cancel();
        self.api.log_event(telemetry_events::TTS_START, None).await;

        let tts_started = Instant::now();
        let tts_ms = match self.speech.speak(text, self.config.locale.as_deref()).await {
            Ok(timing) => timing.tts_ms,
            Err(e) => {
                warn!("[orchestrator] speech output failed: {}", e);
                tts_started.elapsed().as_millis() as u64
            }
        };

        self.api
            .log_event(
                telemetry_events::TTS_END,
                serde_json::to_value(TtsEndMeta { tts_ms }).ok(),
            )
            .await;
    }

    // ----- stop & teardown -----

    /// Explicit user stop, legal from every phase. Not an error, but it runs
    /// the same teardown.
    pub async fn stop(&self) {
        {
            let mut ctx = self.ctx.lock();
            let next = transition(ctx.phase, TurnEvent::Stop);
            self.set_phase(&mut ctx, next);
        }
        self.teardown(phase_tags::USER_STOP, None).await;
        self.api.log_event(telemetry_events::STOP, None).await;
    }

    /// Whether the turn identified by `seq` is still the live one. Checked
    /// after every suspension point so a turn cancelled mid-await (or
    /// superseded by a newer turn) becomes a no-op.
    fn turn_still_live(&self, seq: u64) -> bool {
        let ctx = self.ctx.lock();
        ctx.turn_seq == seq
            && ctx.in_flight
            && matches!(ctx.phase, Phase::Thinking | Phase::Speaking)
    }

    /// Stop and discard the detector and the mic handle. Nulls both.
    fn release_capture_resources(&self) {
        let (vad, mic) = {
            let mut ctx = self.ctx.lock();
            (ctx.vad.take(), ctx.mic.take())
        };
        if let Some(mut vad) = vad {
            vad.stop();
        }
        if let Some(mut mic) = mic {
            mic.release();
        }
    }

    /// Pipeline failure: teardown with the localized stage message and the
    /// raw error attached to telemetry only.
    async fn fail_pipeline(&self, tag: &str, err: &ApiError) {
        let message = UserMessages::render(&self.messages().pipeline_failed, &err.to_string());
        self.teardown(tag, Some(message)).await;
    }

    /// The single resource-release path for Stop, Error, and mode switch.
    ///
    /// Idempotent: a second call finds nothing held and an already-idle
    /// phase, and changes nothing. Logging the error event happens last and
    /// its failure is swallowed by the API contract.
    pub async fn teardown(&self, phase_tag: &str, user_message: Option<String>) {
        info!("[orchestrator] teardown, tag={}", phase_tag);

        self.release_capture_resources();
        self.speech.cancel();

        {
            let mut ctx = self.ctx.lock();
            ctx.in_flight = false;
            // Invalidate any continuation still awaiting a collaborator
            ctx.turn_seq = ctx.turn_seq.wrapping_add(1);
            self.set_phase(&mut ctx, Phase::Idle);
        }

        if let Some(message) = &user_message {
            self.ui.emit_error(ErrorNoticePayload {
                message: message.clone(),
            });
        }

        let meta = serde_json::to_value(ErrorMeta {
            phase: phase_tag.to_string(),
            message: user_message.unwrap_or_default(),
        })
        .ok();
        self.api.log_event(telemetry_events::ERROR, meta).await;
    }
}
