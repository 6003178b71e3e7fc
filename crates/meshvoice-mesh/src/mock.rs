//! Mock implementations for testing and simulation
//!
//! Provides a mock microphone and audio output that record how they are
//! used instead of touching real devices.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::media::{AudioConstraints, LocalTrack, MediaDevices, MediaError};
use crate::peer::RemoteStream;
use crate::sink::{AudioOutput, AudioSink, SinkError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Mock Microphone
// ============================================================================

/// Captured track that counts how often it was stopped.
#[derive(Debug)]
pub struct MockTrack {
    id: String,
    enabled: AtomicBool,
    stops: AtomicUsize,
}

impl MockTrack {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            enabled: AtomicBool::new(true),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl LocalTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Microphone that hands out `MockTrack`s, or fails with a fixed error.
#[derive(Debug, Default)]
pub struct MockMicrophone {
    failure: Option<MediaError>,
    requests: AtomicUsize,
    tracks: Mutex<Vec<Arc<MockTrack>>>,
}

impl MockMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: MediaError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Number of `get_user_media` calls.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Tracks handed out so far.
    pub fn tracks(&self) -> Vec<Arc<MockTrack>> {
        lock(&self.tracks).clone()
    }
}

#[async_trait]
impl MediaDevices for MockMicrophone {
    async fn get_user_media(
        &self,
        _constraints: &AudioConstraints,
    ) -> Result<Arc<dyn LocalTrack>, MediaError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let track = Arc::new(MockTrack::new(&format!("mock-mic-{n}")));
        lock(&self.tracks).push(Arc::clone(&track));
        Ok(track)
    }
}

// ============================================================================
// Mock Audio Output
// ============================================================================

#[derive(Debug, Default)]
struct OutputLog {
    attached: Vec<String>,
    removed: Vec<String>,
    volumes: Vec<f64>,
}

/// Audio output that records attached and removed streams.
#[derive(Debug, Clone, Default)]
pub struct MockAudioOutput {
    log: Arc<Mutex<OutputLog>>,
    fail: Arc<AtomicBool>,
}

impl MockAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `attach` fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Stream ids in attach order.
    pub fn attached(&self) -> Vec<String> {
        lock(&self.log).attached.clone()
    }

    /// Stream ids in removal order.
    pub fn removed(&self) -> Vec<String> {
        lock(&self.log).removed.clone()
    }

    pub fn volumes(&self) -> Vec<f64> {
        lock(&self.log).volumes.clone()
    }

    /// Sinks currently playing.
    pub fn active(&self) -> usize {
        let log = lock(&self.log);
        log.attached.len() - log.removed.len()
    }
}

impl AudioOutput for MockAudioOutput {
    fn attach(
        &self,
        _peer_id: &str,
        stream: &RemoteStream,
        volume: f64,
    ) -> Result<Box<dyn AudioSink>, SinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::Playback("mock output failure".into()));
        }
        let mut log = lock(&self.log);
        log.attached.push(stream.id.clone());
        log.volumes.push(volume);
        Ok(Box::new(MockSink {
            stream_id: stream.id.clone(),
            log: Arc::clone(&self.log),
            removed: false,
        }))
    }
}

struct MockSink {
    stream_id: String,
    log: Arc<Mutex<OutputLog>>,
    removed: bool,
}

impl AudioSink for MockSink {
    fn stream_id(&self) -> &str {
        &self.stream_id
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        lock(&self.log).removed.push(self.stream_id.clone());
    }
}
