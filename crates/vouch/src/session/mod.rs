//! Liveness session orchestration.
//!
//! [`Session`] is the aggregate the host UI observes. [`SessionMachine`]
//! owns it together with the capture device, recorder, and validator and
//! is the only thing that mutates it. [`spawn_session_driver`] runs a
//! machine on its own task and feeds it commands, timers, and job results
//! one at a time.

mod driver;
mod machine;
mod retry;

pub use driver::{CommandAck, DriverError, SessionCommand, SessionHandle, spawn_session_driver};
pub use machine::{
    Collaborators, InitJob, InitOutcome, InitReport, ProcessJob, ProcessOutcome, SessionMachine,
    TickOutcome,
};
pub use retry::{RetryDecision, RetryPolicy, RetryTracker};

use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use vouch_common::{Challenge, SessionSnapshot, SessionStatus};

/// One verification attempt
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub challenges: Vec<Challenge>,
    pub current_index: usize,
    pub status: SessionStatus,
    pub face_present: bool,
    pub face_confidence: f32,
    pub created_at: DateTime<Utc>,
    pub recording_started_at: Option<DateTime<Utc>>,
    pub recording_ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            session_id: new_session_id(),
            challenges: Vec::new(),
            current_index: 0,
            status: SessionStatus::Intro,
            face_present: false,
            face_confidence: 0.0,
            created_at: Utc::now(),
            recording_started_at: None,
            recording_ended_at: None,
        }
    }

    /// The challenge being validated right now
    pub fn current(&self) -> Option<&Challenge> {
        self.challenges.get(self.current_index)
    }

    pub fn all_passed(&self) -> bool {
        !self.challenges.is_empty() && self.challenges.iter().all(|c| c.state.completed)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let instruction = match self.status {
            SessionStatus::Recording => self.current().map(|c| c.descriptor.instruction_text.clone()),
            _ => None,
        };

        SessionSnapshot {
            session_id: self.session_id.clone(),
            status: self.status.clone(),
            challenges: self.challenges.clone(),
            current_index: self.current_index,
            face_present: self.face_present,
            face_confidence: self.face_confidence,
            created_at: self.created_at,
            recording_started_at: self.recording_started_at,
            recording_ended_at: self.recording_ended_at,
            instruction,
        }
    }

    pub(crate) fn transition(&mut self, to: SessionStatus) {
        tracing::info!(
            session_id = %self.session_id,
            from = self.status.name(),
            to = to.name(),
            "Session transition"
        );
        self.status = to;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Random opaque session id
pub fn new_session_id() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
