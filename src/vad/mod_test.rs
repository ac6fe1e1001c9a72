use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tokio::time::timeout;

use super::*;
use crate::audio::AudioBuffer;
use crate::recorder::Recorder;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn fast_config() -> VadConfig {
    VadConfig {
        min_speech_ms: 100,
        silence_ms: 200,
        max_speech_ms: 2_000,
        energy_threshold: 0.01,
    }
}

#[test]
fn test_start_without_subscriber_fails() {
    let mut vad = VoiceActivityDetector::new(fast_config());
    let (_failure_tx, failure_rx) = mpsc::channel();
    let result = vad.start(AudioBuffer::new(), Recorder::new(16_000), failure_rx);
    assert_eq!(result.unwrap_err(), VadError::NoEventSubscriber);
}

#[test]
fn test_start_while_running_fails() {
    let mut vad = VoiceActivityDetector::new(fast_config());
    let _rx = vad.subscribe_events();

    let (_failure_tx, failure_rx) = mpsc::channel();
    vad.start(AudioBuffer::new(), Recorder::new(16_000), failure_rx)
        .unwrap();

    let (_failure_tx2, failure_rx2) = mpsc::channel();
    let result = vad.start(AudioBuffer::new(), Recorder::new(16_000), failure_rx2);
    assert_eq!(result.unwrap_err(), VadError::AlreadyRunning);

    vad.stop();
}

#[test]
fn test_stop_without_start_is_a_no_op() {
    let mut vad = VoiceActivityDetector::new(fast_config());
    vad.stop();
    vad.stop();
    assert!(!vad.is_running());
}

#[test]
fn test_stop_is_idempotent_after_start() {
    let mut vad = VoiceActivityDetector::new(fast_config());
    let _rx = vad.subscribe_events();
    let (_failure_tx, failure_rx) = mpsc::channel();
    vad.start(AudioBuffer::new(), Recorder::new(16_000), failure_rx)
        .unwrap();

    vad.stop();
    assert!(!vad.is_running());
    vad.stop();
    assert!(!vad.is_running());
}

#[tokio::test]
async fn test_capture_failure_surfaces_as_error_event() {
    let mut vad = VoiceActivityDetector::new(fast_config());
    let mut rx = vad.subscribe_events();

    let (failure_tx, failure_rx) = mpsc::channel();
    vad.start(AudioBuffer::new(), Recorder::new(16_000), failure_rx)
        .unwrap();

    failure_tx
        .send(crate::audio::CaptureError::StreamError(
            "device unplugged".to_string(),
        ))
        .unwrap();

    let event = timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for error event")
        .expect("channel closed without event");
    match event {
        VadEvent::Error(message) => assert!(message.contains("device unplugged")),
        other => panic!("expected Error event, got {:?}", other),
    }

    vad.stop();
}

/// Full utterance over the real analysis thread: a producer feeds loud
/// samples for a while and then goes quiet, which must yield exactly one
/// SpeechStart and one SpeechEnd carrying a non-empty utterance.
#[tokio::test(flavor = "multi_thread")]
async fn test_live_utterance_produces_start_then_end() {
    let mut vad = VoiceActivityDetector::new(fast_config());
    let mut rx = vad.subscribe_events();

    let buffer = AudioBuffer::new();
    let (_failure_tx, failure_rx) = mpsc::channel();
    vad.start(buffer.clone(), Recorder::new(16_000), failure_rx)
        .unwrap();

    // ~600 ms of sustained energy at 16 kHz, pushed in 20 ms slices so every
    // analysis tick sees fresh loud samples
    let producer = thread::spawn(move || {
        let slice = vec![0.3f32; 320];
        for _ in 0..30 {
            buffer.push_samples(&slice);
            thread::sleep(Duration::from_millis(20));
        }
        // Then nothing: empty drains count as silence
    });

    let first = timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for speech start")
        .expect("channel closed before speech start");
    assert!(matches!(first, VadEvent::SpeechStart), "got {:?}", first);

    let second = timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for speech end")
        .expect("channel closed before speech end");
    match second {
        VadEvent::SpeechEnd(utterance) => {
            assert!(utterance.duration_ms > 0);
            assert!(utterance.size_bytes > 44);
            assert_eq!(utterance.mime_type, "audio/wav");
        }
        other => panic!("expected SpeechEnd, got {:?}", other),
    }

    producer.join().unwrap();

    // The utterance is terminal; the analysis thread winds down on its own
    vad.stop();
    assert!(!vad.is_running());
}

mod frame_router {
    use super::*;

    fn router() -> FrameRouter {
        FrameRouter::new(&fast_config(), 16_000)
    }

    #[test]
    fn test_pre_roll_keeps_only_the_onset_window() {
        let mut r = router();
        // Cap for 100 ms min speech plus slack at 16 kHz
        let cap = r.pending_cap;
        for _ in 0..20 {
            r.buffer_pre_roll(&[0.2; 800]);
        }
        assert!(r.pending.len() <= cap);
        assert!(r.pending.len() > 0);
    }

    #[test]
    fn test_flush_pre_roll_starts_recorder_with_window() {
        let mut r = router();
        r.buffer_pre_roll(&[0.2; 800]);

        let mut recorder = Recorder::new(16_000);
        r.flush_pre_roll(&mut recorder);
        assert!(recorder.is_recording());
        assert!(r.pending.is_empty());

        let utterance = recorder.stop().unwrap();
        // 800 samples at 16 kHz = 50 ms
        assert_eq!(utterance.duration_ms, 50);
    }

    #[test]
    fn test_trailing_silence_is_dropped_on_silence_end() {
        let mut r = router();
        let mut recorder = Recorder::new(16_000);
        recorder.start();

        r.route_in_speech(&[0.3; 800], &mut recorder);
        r.route_in_speech(&[0.001; 800], &mut recorder);
        r.route_in_speech(&[0.001; 800], &mut recorder);
        r.finish(EndReason::Silence, &mut recorder);

        let utterance = recorder.stop().unwrap();
        // Only the loud frame made it in
        assert_eq!(utterance.duration_ms, 50);
    }

    #[test]
    fn test_pause_is_restored_when_speech_resumes() {
        let mut r = router();
        let mut recorder = Recorder::new(16_000);
        recorder.start();

        r.route_in_speech(&[0.3; 800], &mut recorder);
        r.route_in_speech(&[0.001; 800], &mut recorder);
        // Speech resumes: the pause belongs inside the utterance
        r.route_in_speech(&[0.3; 800], &mut recorder);
        r.finish(EndReason::Silence, &mut recorder);

        let utterance = recorder.stop().unwrap();
        assert_eq!(utterance.duration_ms, 150);
    }

    #[test]
    fn test_max_duration_keeps_held_back_frames() {
        let mut r = router();
        let mut recorder = Recorder::new(16_000);
        recorder.start();

        r.route_in_speech(&[0.3; 800], &mut recorder);
        r.route_in_speech(&[0.001; 800], &mut recorder);
        r.finish(EndReason::MaxDuration, &mut recorder);

        let utterance = recorder.stop().unwrap();
        assert_eq!(utterance.duration_ms, 100);
    }
}
