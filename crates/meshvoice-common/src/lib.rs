pub mod errors;
pub mod id;

pub use errors::{ConfigError, MeshvoiceError};
pub use id::{new_id, new_participant_id};

pub type Result<T> = std::result::Result<T, MeshvoiceError>;
