//! Local microphone capture.
//!
//! The platform capture API is an external collaborator behind
//! `MediaDevices`. The coordinator owns the resulting `LocalMedia` for the
//! lifetime of a voice session and every peer connection reads from it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use meshvoice_config::schema::AudioConfig;
use thiserror::Error;
use tracing::{debug, info};

/// Capture constraints requested from the platform. Audio only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

impl From<&AudioConfig> for AudioConstraints {
    fn from(config: &AudioConfig) -> Self {
        Self {
            echo_cancellation: config.echo_cancellation,
            noise_suppression: config.noise_suppression,
            auto_gain_control: config.auto_gain_control,
        }
    }
}

/// Microphone access failures. Fatal to starting a voice session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("no microphone found")]
    DeviceNotFound,
    #[error("failed to access microphone: {0}")]
    Other(String),
}

impl MediaError {
    /// Human-readable message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            MediaError::PermissionDenied => {
                "Microphone permission denied. Please allow access to use voice chat.".into()
            }
            MediaError::DeviceNotFound => {
                "No microphone found. Please connect a microphone.".into()
            }
            MediaError::Other(detail) => format!("Failed to access microphone: {detail}"),
        }
    }
}

/// A captured audio track.
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;
    /// Enable or disable sending audio. Disabled tracks send silence.
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
    /// Stop capture. The track cannot be restarted.
    fn stop(&self);
}

/// Platform microphone access.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<Arc<dyn LocalTrack>, MediaError>;
}

/// Local audio held for the duration of a voice session.
///
/// Cloning shares the same track; `release` stops it exactly once no matter
/// how many clones exist.
#[derive(Clone)]
pub struct LocalMedia {
    track: Arc<dyn LocalTrack>,
    released: Arc<AtomicBool>,
}

impl LocalMedia {
    pub fn new(track: Arc<dyn LocalTrack>) -> Self {
        Self {
            track,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Acquire the microphone with the given constraints.
    pub async fn acquire(
        devices: &dyn MediaDevices,
        constraints: &AudioConstraints,
    ) -> Result<Self, MediaError> {
        debug!(?constraints, "Requesting microphone");
        let track = devices.get_user_media(constraints).await?;
        info!(track = %track.id(), "Microphone acquired");
        Ok(Self::new(track))
    }

    pub fn track(&self) -> &Arc<dyn LocalTrack> {
        &self.track
    }

    pub fn track_id(&self) -> &str {
        self.track.id()
    }

    pub fn is_muted(&self) -> bool {
        !self.track.is_enabled()
    }

    pub fn set_muted(&self, muted: bool) {
        self.track.set_enabled(!muted);
    }

    /// Stop the track. Returns false if it was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.track.stop();
        info!(track = %self.track.id(), "Microphone released");
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for LocalMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMedia")
            .field("track", &self.track.id())
            .field("enabled", &self.track.is_enabled())
            .field("released", &self.is_released())
            .finish()
    }
}
