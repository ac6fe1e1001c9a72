// Audio capture boundary: sample buffer plus the narrow microphone capability
// traits the orchestrator and VAD are written against.

use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::audio_constants::MAX_BUFFER_SAMPLES;

pub mod wav;
pub use wav::{encode_wav_bytes, WAV_MIME_TYPE};


/// Type alias for ring buffer producer half
type RingProducer = ringbuf::HeapProd<f32>;

/// Type alias for ring buffer consumer half
type RingConsumer = ringbuf::HeapCons<f32>;

/// Thread-safe buffer carrying samples from a live microphone to the
/// detection loop.
///
/// Built on a SPSC ring buffer for low-contention capture:
/// - the capture callback writes via `push_samples()`
/// - the detection loop reads via `drain_samples()`
///
/// Capacity is bounded; once full, further pushes are dropped rather than
/// growing memory while nobody is draining.
pub struct AudioBuffer {
    producer: Arc<Mutex<RingProducer>>,
    consumer: Arc<Mutex<RingConsumer>>,
}

impl AudioBuffer {
    /// Create a new empty buffer with the default bounded capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SAMPLES)
    }

    /// Create a new buffer with a specific capacity in samples.
    pub fn with_capacity(capacity: usize) -> Self {
        let rb = HeapRb::<f32>::new(capacity);
        let (producer, consumer) = rb.split();
        Self {
            producer: Arc::new(Mutex::new(producer)),
            consumer: Arc::new(Mutex::new(consumer)),
        }
    }

    /// Push samples from the capture callback.
    ///
    /// Returns the number of samples actually written; 0 when the buffer is
    /// full.
    pub fn push_samples(&self, samples: &[f32]) -> usize {
        self.producer.lock().push_slice(samples)
    }

    /// Drain every sample currently available.
    ///
    /// Called periodically by the detection loop; returns an empty vec when
    /// nothing new arrived since the last drain.
    pub fn drain_samples(&self) -> Vec<f32> {
        let mut cons = self.consumer.lock();
        let available = cons.occupied_len();
        if available == 0 {
            return Vec::new();
        }
        let mut drained = vec![0.0; available];
        cons.pop_slice(&mut drained);
        drained
    }

    /// Number of samples waiting to be drained.
    pub fn pending_len(&self) -> usize {
        self.consumer.lock().occupied_len()
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for AudioBuffer {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
            consumer: Arc::clone(&self.consumer),
        }
    }
}

impl std::fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("pending_len", &self.pending_len())
            .finish()
    }
}

/// Errors raised at the microphone boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// No audio input device is available on the host.
    #[error("no audio input device available")]
    NoDevice,
    /// The user (or platform policy) denied microphone access.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),
    /// The capture stream failed after it was established.
    #[error("audio stream error: {0}")]
    StreamError(String),
}

/// Capability interface for acquiring the host microphone.
///
/// The core never touches platform audio APIs directly; the embedding host
/// supplies an adapter and tests supply a deterministic fake. Acquisition may
/// fail (permission denied, no device) and that failure is a recoverable,
/// user-visible condition for the orchestrator.
pub trait MicrophoneSource: Send + Sync {
    /// Acquire the microphone and begin pushing captured samples into
    /// `buffer`. Mid-stream failures (device unplugged, stream ended) are
    /// reported once through `failure`.
    ///
    /// Returns a live stream handle; dropping or releasing it must stop
    /// capture and free the device.
    fn acquire(
        &self,
        buffer: AudioBuffer,
        failure: Sender<CaptureError>,
    ) -> Result<Box<dyn MicrophoneStream>, CaptureError>;
}

/// A live, exclusively-held capture stream.
///
/// Exactly one exists per voice turn; the orchestrator nulls its reference on
/// every teardown so "is the mic held" stays a cheap `is_some()` check.
pub trait MicrophoneStream: Send {
    /// Sample rate the device is actually delivering (Hz).
    fn sample_rate(&self) -> u32;

    /// Stop capture and release the device. Must be idempotent.
    fn release(&mut self);
}
