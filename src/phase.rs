// Turn phase state machine
// Pure transition function; the orchestrator owns the live phase value and
// applies events through `transition` at every stage boundary.

use serde::Serialize;

/// What the pipeline is doing right now. Exactly one value is live at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Nothing active, ready to start a turn
    Idle,
    /// Microphone held, VAD watching for speech
    Listening,
    /// Utterance captured, waiting on transcription/reply
    Thinking,
    /// Reply being spoken
    Speaking,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Idle
    }
}

/// Events that drive phase transitions.
///
/// Carries no payload: transcript text and reply text flow through the
/// orchestrator, never through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    /// User pressed start
    Start,
    /// User pressed stop
    Stop,
    /// VAD confirmed end of speech
    VadDone,
    /// Reply text obtained
    LlmDone,
    /// Speech output finished (or failed, which is not a turn failure)
    TtsEnd,
    /// Any stage failed
    Error,
}

/// Apply one event to the current phase.
///
/// `Stop` and `Error` are the non-negotiable safety exits: they reach `Idle`
/// from every phase. Every other pair either advances the turn monotonically
/// (idle → listening → thinking → speaking → idle) or is a no-op, so stale or
/// duplicate events from async callbacks can never corrupt the phase.
///
/// No side effects, no I/O. The orchestrator leans on this determinism to make
/// teardown idempotent: applying it to an already-idle phase changes nothing.
pub fn transition(current: Phase, event: TurnEvent) -> Phase {
    match (current, event) {
        // ANY -> idle
        (_, TurnEvent::Stop) | (_, TurnEvent::Error) => Phase::Idle,

        (Phase::Idle, TurnEvent::Start) => Phase::Listening,
        (Phase::Listening, TurnEvent::VadDone) => Phase::Thinking,
        (Phase::Thinking, TurnEvent::LlmDone) => Phase::Speaking,
        (Phase::Speaking, TurnEvent::TtsEnd) => Phase::Idle,

        // Out-of-order events leave the phase untouched
        (phase, _) => phase,
    }
}

#[cfg(test)]
#[path = "phase_test.rs"]
mod tests;
