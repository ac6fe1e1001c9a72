// Voice activity detection
// A pure segmenter (energy thresholds over an injected clock) plus a driver
// that runs it against the live capture buffer on a dedicated analysis thread
// and delivers boundary events over a bounded channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::mpsc as tokio_mpsc;

use crate::audio::{AudioBuffer, CaptureError};
use crate::audio_constants::{ANALYSIS_INTERVAL_MS, EVENT_CHANNEL_BUFFER_SIZE};
use crate::recorder::{CapturedUtterance, Recorder};
use crate::{debug, info, warn};

mod segmenter;
pub use segmenter::{EndReason, SegmentEvent, SpeechSegmenter, VadConfig};

#[cfg(test)]
mod mod_test;

/// Boundary events delivered to the orchestrator.
///
/// Per utterance the channel carries at most one `SpeechStart`, then exactly
/// one of `SpeechEnd` or `Error`; after either terminal event the detector is
/// exhausted and delivers nothing further.
#[derive(Debug, Clone)]
pub enum VadEvent {
    /// Speech onset confirmed
    SpeechStart,
    /// Utterance concluded and finalized
    SpeechEnd(CapturedUtterance),
    /// Analysis cannot proceed (stream died, encoding failed)
    Error(String),
}

/// Errors from detector lifecycle misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VadError {
    /// `subscribe_events()` must be called before `start()` so boundary
    /// events are never silently dropped.
    #[error("subscribe_events() must be called before start()")]
    NoEventSubscriber,
    /// The detector is already running.
    #[error("detector is already running")]
    AlreadyRunning,
}

/// Everything the analysis thread needs, moved in at start.
struct AnalysisState {
    config: VadConfig,
    buffer: AudioBuffer,
    recorder: Recorder,
    failure_rx: Receiver<CaptureError>,
    should_stop: Arc<AtomicBool>,
    event_tx: tokio_mpsc::Sender<VadEvent>,
}

/// Continuous speech-boundary analysis over a live capture buffer.
///
/// Owns the recorder for the utterance: the driver starts it when onset is
/// confirmed, feeds it speech frames (with the onset window pre-rolled and
/// trailing silence held back), and finalizes it on end-of-speech. The
/// orchestrator only ever sees the finished `CapturedUtterance`.
pub struct VoiceActivityDetector {
    config: VadConfig,
    analysis_thread: Option<JoinHandle<()>>,
    should_stop: Arc<AtomicBool>,
    event_tx: Option<tokio_mpsc::Sender<VadEvent>>,
    thread_exit_rx: Option<Receiver<()>>,
}

impl VoiceActivityDetector {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            analysis_thread: None,
            should_stop: Arc::new(AtomicBool::new(false)),
            event_tx: None,
            thread_exit_rx: None,
        }
    }

    /// Subscribe to boundary events. Must be called before `start()`; each
    /// call replaces the previous receiver.
    pub fn subscribe_events(&mut self) -> tokio_mpsc::Receiver<VadEvent> {
        let (tx, rx) = tokio_mpsc::channel(EVENT_CHANNEL_BUFFER_SIZE);
        self.event_tx = Some(tx);
        rx
    }

    /// Whether the analysis thread is live.
    pub fn is_running(&self) -> bool {
        match &self.analysis_thread {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    /// Begin continuous analysis of `buffer`, buffering speech into
    /// `recorder`. Capture failures arriving on `failure_rx` surface once as
    /// `VadEvent::Error`, after which the detector is stopped.
    pub fn start(
        &mut self,
        buffer: AudioBuffer,
        recorder: Recorder,
        failure_rx: Receiver<CaptureError>,
    ) -> Result<(), VadError> {
        if self.is_running() {
            debug!("[vad] start called but already running");
            return Err(VadError::AlreadyRunning);
        }
        let event_tx = self.event_tx.clone().ok_or(VadError::NoEventSubscriber)?;

        info!(
            "[vad] starting analysis, min_speech={}ms silence={}ms max_speech={}ms",
            self.config.min_speech_ms, self.config.silence_ms, self.config.max_speech_ms
        );

        self.should_stop.store(false, Ordering::SeqCst);

        let state = AnalysisState {
            config: self.config.clone(),
            buffer,
            recorder,
            failure_rx,
            should_stop: self.should_stop.clone(),
            event_tx,
        };

        let (exit_tx, exit_rx) = mpsc::channel();
        self.thread_exit_rx = Some(exit_rx);

        let handle = thread::spawn(move || {
            analysis_thread_main(state);
            let _ = exit_tx.send(());
        });
        self.analysis_thread = Some(handle);
        Ok(())
    }

    /// Halt analysis immediately.
    ///
    /// Safe to call multiple times and before `start()`; no events are
    /// delivered after this returns.
    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);

        let thread = match self.analysis_thread.take() {
            Some(t) => t,
            None => return,
        };

        // Wait briefly for the thread to confirm exit; if it is wedged we
        // drop the handle and let the stop flag catch it on its next tick.
        if let Some(rx) = self.thread_exit_rx.take() {
            match rx.recv_timeout(Duration::from_millis(500)) {
                Ok(()) => debug!("[vad] analysis thread exit confirmed"),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    warn!("[vad] timeout waiting for analysis thread exit");
                    return;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    debug!("[vad] analysis thread already exited");
                }
            }
        }
        let _ = thread.join();
    }
}

impl Drop for VoiceActivityDetector {
    fn drop(&mut self) {
        // Signal without waiting; the thread exits on its next tick
        self.should_stop.store(true, Ordering::SeqCst);
    }
}

/// Frames held back from the recorder: the rolling onset window before speech
/// is confirmed, and candidate trailing silence during speech.
struct FrameRouter {
    /// Rolling pre-roll window while no utterance is confirmed
    pending: Vec<f32>,
    /// Max pre-roll samples retained (onset window plus slack)
    pending_cap: usize,
    /// Sub-threshold frames since speech last paused
    silence_tail: Vec<f32>,
    energy_threshold: f32,
}

impl FrameRouter {
    fn new(config: &VadConfig, sample_rate: u32) -> Self {
        let window_ms = config.min_speech_ms + 2 * ANALYSIS_INTERVAL_MS;
        Self {
            pending: Vec::new(),
            pending_cap: (window_ms * sample_rate as u64 / 1000) as usize,
            silence_tail: Vec::new(),
            energy_threshold: config.energy_threshold,
        }
    }

    /// Buffer a frame seen before onset confirmation, keeping only the most
    /// recent onset window.
    fn buffer_pre_roll(&mut self, frame: &[f32]) {
        self.pending.extend_from_slice(frame);
        if self.pending.len() > self.pending_cap {
            let excess = self.pending.len() - self.pending_cap;
            self.pending.drain(..excess);
        }
    }

    /// Onset confirmed: move the pre-roll window into the recorder.
    fn flush_pre_roll(&mut self, recorder: &mut Recorder) {
        recorder.start();
        let pending = std::mem::take(&mut self.pending);
        recorder.append(&pending);
    }

    /// Route one in-speech frame. Loud frames (and any held-back pause before
    /// them) go to the recorder; quiet frames are held back so an utterance
    /// that ends in silence is not padded with the trailing quiet.
    fn route_in_speech(&mut self, frame: &[f32], recorder: &mut Recorder) {
        if SpeechSegmenter::rms(frame) >= self.energy_threshold {
            if !self.silence_tail.is_empty() {
                let tail = std::mem::take(&mut self.silence_tail);
                recorder.append(&tail);
            }
            recorder.append(frame);
        } else {
            self.silence_tail.extend_from_slice(frame);
        }
    }

    /// Utterance ended: trailing silence is dropped, but a max-duration cut
    /// keeps the held-back frames since speech was still in progress.
    fn finish(&mut self, reason: EndReason, recorder: &mut Recorder) {
        match reason {
            EndReason::Silence => self.silence_tail.clear(),
            EndReason::MaxDuration => {
                let tail = std::mem::take(&mut self.silence_tail);
                recorder.append(&tail);
            }
        }
    }
}

/// Main loop for the analysis thread.
///
/// Drains the capture buffer on a fixed interval, feeds the segmenter, and
/// routes frames into the recorder. Exits after delivering the terminal event
/// for the utterance, on capture failure, or on the stop flag.
fn analysis_thread_main(mut state: AnalysisState) {
    debug!("[vad] analysis thread started, interval={}ms", ANALYSIS_INTERVAL_MS);

    let interval = Duration::from_millis(ANALYSIS_INTERVAL_MS);
    let started_at = Instant::now();
    let mut segmenter = SpeechSegmenter::new(state.config.clone());
    let mut router = FrameRouter::new(&state.config, state.recorder.sample_rate());

    loop {
        if state.should_stop.load(Ordering::SeqCst) {
            debug!("[vad] stop signal received, exiting analysis thread");
            break;
        }
        thread::sleep(interval);
        if state.should_stop.load(Ordering::SeqCst) {
            debug!("[vad] stop signal received after sleep, exiting analysis thread");
            break;
        }

        // Capture failure surfaces once, then the detector is done
        match state.failure_rx.try_recv() {
            Ok(err) => {
                warn!("[vad] capture failure: {}", err);
                let _ = state.event_tx.try_send(VadEvent::Error(err.to_string()));
                break;
            }
            Err(TryRecvError::Empty) => {}
            // Sender dropped on clean release; not a failure
            Err(TryRecvError::Disconnected) => {}
        }

        let frame = state.buffer.drain_samples();
        let now_ms = started_at.elapsed().as_millis() as u64;

        // An empty drain is fed as a silent frame so silence timing still
        // advances when the device goes quiet between ticks
        match segmenter.push_frame(&frame, now_ms) {
            None => {
                if frame.is_empty() {
                    continue;
                }
                if segmenter.in_speech() {
                    router.route_in_speech(&frame, &mut state.recorder);
                } else {
                    router.buffer_pre_roll(&frame);
                }
            }
            Some(SegmentEvent::SpeechStart { onset_ms }) => {
                info!("[vad] speech onset confirmed at {}ms", onset_ms);
                router.flush_pre_roll(&mut state.recorder);
                state.recorder.append(&frame);
                if let Err(e) = state.event_tx.try_send(VadEvent::SpeechStart) {
                    warn!("[vad] failed to send speech-start event: {}", e);
                }
            }
            Some(SegmentEvent::SpeechEnd {
                reason,
                onset_ms,
                speech_end_ms,
            }) => {
                info!(
                    "[vad] speech ended ({:?}) onset={}ms end={}ms",
                    reason, onset_ms, speech_end_ms
                );
                router.finish(reason, &mut state.recorder);
                match state.recorder.stop() {
                    Ok(utterance) => {
                        if let Err(e) = state.event_tx.try_send(VadEvent::SpeechEnd(utterance)) {
                            warn!("[vad] failed to send speech-end event: {}", e);
                        }
                    }
                    Err(e) => {
                        let _ = state.event_tx.try_send(VadEvent::Error(e.to_string()));
                    }
                }
                // One utterance per detector instance
                break;
            }
        }
    }

    debug!("[vad] analysis thread exiting");
}
