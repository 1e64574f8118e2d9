//! # Vouch Common
//!
//! Shared types, errors, and constants used across Vouch components.
//!
//! ## Modules
//! - `types` - Core data structures (ChallengeDescriptor, SessionStatus, EvidenceArtifact, etc.)
//! - `error` - Error taxonomy surfaced to the user
//! - `constants` - Shared thresholds, timeouts, and key prefixes

pub mod constants;
pub mod error;
pub mod types;

pub use error::{ErrorKind, VouchError};
pub use types::*;
