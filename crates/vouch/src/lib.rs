//! # Vouch - liveness verification engine
//!
//! Drives one liveness session at a time on a kiosk or client device:
//! randomized gesture challenges, landmark-based validation, a bounded
//! recording, and exactly-once evidence submission.
//!
//! ## Architecture
//! ```text
//! Camera ──frames──▶ SessionMachine ──landmarks──▶ ChallengeValidator
//!                        │   ▲
//!              artifact  │   │ commands / snapshots (SessionHandle)
//!                        ▼   │
//!               EvidenceStore ──▶ SubmissionClient ──▶ verifier
//! ```

pub mod capture;
pub mod challenge;
pub mod config;
pub mod evidence;
pub mod landmarks;
pub mod routes;
pub mod session;
pub mod state;
pub mod submission;
pub mod trace;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AppConfig, ConfigOverrides};
pub use session::{SessionCommand, SessionHandle, SessionMachine, spawn_session_driver};
