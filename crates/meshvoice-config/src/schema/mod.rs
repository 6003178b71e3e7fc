//! Configuration schema types for Meshvoice.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with defaults.

mod relay;
mod system;
mod voice;

pub use relay::*;
pub use system::*;
pub use voice::*;

use serde::{Deserialize, Serialize};

/// Root configuration for Meshvoice.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct MeshvoiceConfig {
    pub voice: VoiceConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}
