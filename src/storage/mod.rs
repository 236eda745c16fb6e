pub mod rotator;
pub mod types;

pub use rotator::{FileRotator, RotationPolicy, StorageError};
pub use types::MatchRecord;
