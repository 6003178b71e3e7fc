//! Voice session orchestration.
//!
//! `MeshCoordinator` keeps one peer connection for every other voice-active
//! participant, routes relay signals to them and drives teardown.
//! `VoiceSession` runs a coordinator on its own task behind a command
//! handle.

mod coordinator;
mod session;
mod types;


pub use coordinator::MeshCoordinator;
pub use session::VoiceSession;
pub use types::{MeshBackends, MeshInput, MeshStatus, SessionError, VoiceEvent, VoiceSettings};
