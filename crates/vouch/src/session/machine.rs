//! The session state machine.
//!
//! Every transition takes `&mut self`, so transitions are serialized by
//! construction. Work that has to wait on the outside world (camera and
//! detector start-up, evidence persistence and submission) is handed back
//! to the caller as an owned job future. The caller drives the job and
//! feeds its outcome back in; an outcome that arrives for a session that
//! has since been cancelled or replaced is discarded.
//!
//! The per-frame [`SessionMachine::tick`] is cancel-safe: it awaits the
//! device and the landmark source first and only mutates state after both
//! have answered. A frame already taken from the device when a tick is
//! dropped is held and used by the next tick, so the recording has no gaps.
//!
//! Cancelling or retrying a session that still holds an artifact leaves a
//! [`DiscardJob`] behind, which removes that artifact from the store.

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vouch_common::{Challenge, ErrorKind, EvidenceArtifact, SessionSnapshot, SessionStatus, Verdict, VouchError};

use super::Session;
use super::retry::{RetryDecision, RetryPolicy, RetryTracker};
use crate::capture::{Camera, DeviceLease, Frame, Recorder, Recording};
use crate::challenge::{ChallengeGenerator, ChallengeValidator};
use crate::config::{AppConfig, SessionConfig};
use crate::evidence::{self, EvidenceStore, FaceSummary};
use crate::landmarks::LandmarkSource;
use crate::submission::SubmissionClient;

/// External collaborators a machine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub camera: Arc<dyn Camera>,
    pub detector: Arc<dyn LandmarkSource>,
    pub store: Arc<dyn EvidenceStore>,
    pub submitter: Arc<dyn SubmissionClient>,
}

/// How initialization went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitReport {
    pub attempts: u32,
    pub backoff_waits: u32,
}

pub type InitJob = BoxFuture<'static, InitOutcome>;

/// Result of an [`InitJob`]
#[derive(Debug)]
pub struct InitOutcome {
    session_id: String,
    result: Result<DeviceLease, VouchError>,
    report: InitReport,
}

pub type ProcessJob = BoxFuture<'static, ProcessOutcome>;

/// Result of a [`ProcessJob`]
#[derive(Debug)]
pub struct ProcessOutcome {
    session_id: String,
    /// Whether the artifact is in the store
    persisted: bool,
    result: Result<Verdict, VouchError>,
}

pub type DiscardJob = BoxFuture<'static, ()>;

/// What a single sampling cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not sampling in the current status
    Idle,
    Observed,
    ChallengeCompleted { index: usize },
    /// Last challenge completed; processing is next
    RecordingFinished,
    /// Recording overran its budget; processing is next
    WatchdogExpired,
    /// The device failed and the session moved to error
    Failed,
}

pub struct SessionMachine {
    session_config: SessionConfig,
    retention: Duration,
    delete_after_ack: bool,
    user_id: String,

    collaborators: Collaborators,
    generator: ChallengeGenerator,
    validator: ChallengeValidator,
    recorder: Recorder,

    session: Session,
    device: Option<DeviceLease>,
    /// Frame taken by a tick that was dropped before applying it
    held_frame: Option<Frame>,
    watchdog: Option<Instant>,
    /// Artifact awaiting a verdict
    pending: Option<Arc<EvidenceArtifact>>,
    persisted: bool,
    /// Artifacts of abandoned sessions, still to be removed from the store
    abandoned: Vec<Arc<EvidenceArtifact>>,
    init_report: Option<InitReport>,
}

impl SessionMachine {
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> Self {
        Self {
            session_config: config.session.clone(),
            retention: config.store.retention(),
            delete_after_ack: config.store.delete_after_ack,
            user_id: config.submission.user_id.clone(),
            collaborators,
            generator: ChallengeGenerator::new(config.challenges.clone()),
            validator: ChallengeValidator::new(config.validator.clone()),
            recorder: Recorder::new(),
            session: Session::new(),
            device: None,
            held_frame: None,
            watchdog: None,
            pending: None,
            persisted: false,
            abandoned: Vec::new(),
            init_report: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> &SessionStatus {
        &self.session.status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn init_report(&self) -> Option<InitReport> {
        self.init_report
    }

    pub fn holds_device(&self) -> bool {
        self.device.is_some()
    }

    /// Artifact retained for (re)submission, if any
    pub fn pending_artifact(&self) -> Option<&EvidenceArtifact> {
        self.pending.as_deref()
    }

    /// When the recording watchdog fires
    pub fn recording_deadline(&self) -> Option<Instant> {
        self.watchdog
    }

    /// Whether frames should be sampled in the current status
    pub fn is_sampling(&self) -> bool {
        matches!(
            self.session.status,
            SessionStatus::Detecting | SessionStatus::Recording
        )
    }

    pub fn sample_interval(&self) -> Duration {
        self.session_config.sample_interval()
    }

    /// intro → initializing
    pub fn start(&mut self) -> Option<InitJob> {
        if self.session.status != SessionStatus::Intro {
            tracing::debug!(status = self.session.status.name(), "Start ignored");
            return None;
        }
        self.session.transition(SessionStatus::Initializing);
        Some(self.init_job())
    }

    fn init_job(&self) -> InitJob {
        let session_id = self.session.session_id.clone();
        let camera = self.collaborators.camera.clone();
        let detector = self.collaborators.detector.clone();
        let store = self.collaborators.store.clone();
        let retention = self.retention;
        let policy = RetryPolicy::from(&self.session_config);

        async move {
            if tokio::time::timeout(policy.attempt_timeout, sweep_expired(store.as_ref(), retention))
                .await
                .is_err()
            {
                tracing::warn!(
                    timeout_ms = policy.attempt_timeout.as_millis() as u64,
                    "Evidence sweep timed out"
                );
            }

            let lease = match camera.acquire().await {
                Ok(stream) => DeviceLease::new(stream),
                Err(e) => {
                    return InitOutcome {
                        session_id,
                        result: Err(camera_error(e)),
                        report: InitReport::default(),
                    };
                }
            };

            let mut retry = RetryTracker::new(policy);
            let result = loop {
                let attempt = retry.begin_attempt();
                match tokio::time::timeout(policy.attempt_timeout, detector.prepare()).await {
                    Ok(Ok(())) => {
                        tracing::debug!(attempt = attempt, "Landmark source ready");
                        break Ok(lease);
                    }
                    Ok(Err(e)) => match retry.on_failure() {
                        RetryDecision::Backoff(wait) => {
                            tracing::warn!(
                                attempt = attempt,
                                error = %e,
                                backoff_ms = wait.as_millis() as u64,
                                "Landmark source not ready, retrying"
                            );
                            tokio::time::sleep(wait).await;
                        }
                        RetryDecision::GiveUp => {
                            break Err(VouchError::Detector(format!(
                                "not ready after {} attempts: {}",
                                attempt, e
                            )));
                        }
                    },
                    Err(_) => {
                        break Err(VouchError::Detector(format!(
                            "attempt {} timed out after {:?}",
                            attempt, policy.attempt_timeout
                        )));
                    }
                }
            };

            InitOutcome {
                session_id,
                result,
                report: InitReport {
                    attempts: retry.attempts(),
                    backoff_waits: retry.backoff_waits(),
                },
            }
        }
        .boxed()
    }

    /// Apply an [`InitJob`] outcome: initializing → detecting | error
    pub fn finish_init(&mut self, outcome: InitOutcome) -> bool {
        if outcome.session_id != self.session.session_id
            || self.session.status != SessionStatus::Initializing
        {
            // Dropping the outcome releases any device it acquired
            tracing::debug!(session_id = %outcome.session_id, "Discarding stale init outcome");
            return false;
        }

        self.init_report = Some(outcome.report);
        match outcome.result {
            Ok(lease) => {
                self.device = Some(lease);
                self.validator.reset();
                self.session.challenges = self
                    .generator
                    .generate()
                    .into_iter()
                    .map(Challenge::new)
                    .collect();
                self.session.current_index = 0;
                tracing::info!(
                    attempts = outcome.report.attempts,
                    challenges = self.session.challenges.len(),
                    "Capture ready"
                );
                self.session.transition(SessionStatus::Detecting);
            }
            Err(e) => self.fail(e),
        }
        true
    }

    /// detecting → recording, only while a face is present
    pub fn begin(&mut self) -> bool {
        if self.session.status != SessionStatus::Detecting {
            tracing::debug!(status = self.session.status.name(), "Begin ignored");
            return false;
        }
        if !self.session.face_present {
            tracing::debug!("Begin rejected: no face present");
            return false;
        }
        if self.session.challenges.is_empty() {
            return false;
        }

        let now = Utc::now();
        // Frames taken before recording started stay out of the video
        self.held_frame = None;
        self.recorder.start(now);
        self.session.recording_started_at = Some(now);
        self.session.recording_ended_at = None;
        self.session.current_index = 0;
        self.session.challenges[0].state.started_at = Some(now);

        let budget = self
            .session_config
            .recording_budget(self.session.challenges.len());
        self.watchdog = Some(Instant::now() + budget);

        tracing::info!(budget_ms = budget.as_millis() as u64, "Recording started");
        self.session.transition(SessionStatus::Recording);
        true
    }

    /// One sampling cycle: read a frame, extract landmarks, then apply
    pub async fn tick(&mut self) -> TickOutcome {
        let recording = match self.session.status {
            SessionStatus::Detecting => false,
            SessionStatus::Recording => true,
            _ => return TickOutcome::Idle,
        };
        if recording && self.watchdog.is_some_and(|at| Instant::now() >= at) {
            self.expire_watchdog();
            return TickOutcome::WatchdogExpired;
        }

        let index = self.session.current_index;

        let frame = match self.held_frame.take() {
            Some(frame) => Ok(Some(frame)),
            None => match self.device.as_mut() {
                Some(lease) => lease.next_frame().await,
                None => Err(VouchError::Camera("capture device not held".to_string())),
            },
        };
        let frame = match frame {
            Ok(Some(frame)) => self.held_frame.insert(frame),
            Ok(None) => {
                self.fail(VouchError::Camera("capture stream ended".to_string()));
                return TickOutcome::Failed;
            }
            Err(e) => {
                self.fail(camera_error(e));
                return TickOutcome::Failed;
            }
        };

        let sample = match self.collaborators.detector.detect(frame).await {
            Ok(sample) => sample,
            Err(e) => {
                tracing::debug!(error = %e, "Landmark extraction failed");
                None
            }
        };

        // No awaits past this point
        if let Some(frame) = self.held_frame.take() {
            if recording {
                self.recorder.append(&frame.data);
            }
        }

        let threshold = self.session_config.presence_threshold;
        self.session.face_confidence = sample.map_or(0.0, |s| s.confidence);
        self.session.face_present = sample.is_some_and(|s| s.confidence >= threshold);
        let face = sample.filter(|_| self.session.face_present);

        if !recording {
            if let Some(face) = face {
                self.validator.prime(&face.landmarks);
            }
            return TickOutcome::Observed;
        }

        let challenge = &mut self.session.challenges[index];
        if let Some(face) = face {
            let result = self
                .validator
                .validate(index, &challenge.descriptor, &face.landmarks);
            if challenge.state.apply(result.passed, result.confidence, Utc::now()) {
                tracing::info!(
                    index = index,
                    gesture = ?challenge.descriptor.family(),
                    "Challenge completed"
                );
            }
        }
        if !challenge.state.completed {
            return TickOutcome::Observed;
        }

        let next = index + 1;
        if next >= self.session.challenges.len() {
            self.finish_recording();
            return TickOutcome::RecordingFinished;
        }
        self.session.current_index = next;
        self.session.challenges[next].state.started_at = Some(Utc::now());
        TickOutcome::ChallengeCompleted { index }
    }

    /// recording → processing when the recording budget ran out
    pub fn expire_watchdog(&mut self) -> bool {
        if self.session.status != SessionStatus::Recording {
            return false;
        }
        let completed = self
            .session
            .challenges
            .iter()
            .filter(|c| c.state.completed)
            .count();
        tracing::warn!(
            completed = completed,
            total = self.session.challenges.len(),
            "Recording watchdog expired"
        );
        self.finish_recording();
        true
    }

    fn finish_recording(&mut self) {
        let now = Utc::now();
        self.watchdog = None;
        if let Some(frame) = self.held_frame.take() {
            self.recorder.append(&frame.data);
        }

        let started_at = self.session.recording_started_at.unwrap_or(now);
        let recording = self.recorder.stop(now).unwrap_or(Recording {
            bytes: Vec::new(),
            chunks: 0,
            started_at,
            ended_at: now,
        });
        self.session.recording_ended_at = Some(recording.ended_at);

        let artifact = evidence::assemble(
            &self.session.session_id,
            recording,
            &self.session.challenges,
            FaceSummary {
                detected: self.session.face_present,
                confidence: self.session.face_confidence,
            },
        );
        tracing::info!(
            bytes = artifact.video_bytes.len(),
            all_passed = artifact.metadata.all_challenges_passed,
            "Evidence assembled"
        );

        self.pending = Some(Arc::new(artifact));
        self.persisted = false;
        self.device = None;
        self.session.transition(SessionStatus::Processing);
    }

    /// The persist-and-submit job for the artifact awaiting a verdict
    pub fn processing_job(&self) -> Option<ProcessJob> {
        if self.session.status != SessionStatus::Processing {
            return None;
        }
        let artifact = self.pending.clone()?;

        let session_id = self.session.session_id.clone();
        let store = self.collaborators.store.clone();
        let submitter = self.collaborators.submitter.clone();
        let user_id = self.user_id.clone();
        let limit = self.session_config.processing_timeout();
        let delete_after_ack = self.delete_after_ack;
        let already_persisted = self.persisted;

        Some(
            async move {
                let deadline = Instant::now() + limit;
                let timed_out = |persisted: bool| ProcessOutcome {
                    session_id: session_id.clone(),
                    persisted,
                    result: Err(VouchError::Timeout(format!("no verdict within {:?}", limit))),
                };

                if !already_persisted {
                    match tokio::time::timeout_at(deadline, store.put(&artifact)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            return ProcessOutcome {
                                session_id: session_id.clone(),
                                persisted: false,
                                result: Err(e),
                            };
                        }
                        Err(_) => return timed_out(false),
                    }
                }

                let verdict =
                    match tokio::time::timeout_at(deadline, submitter.submit(&user_id, &artifact)).await {
                        Ok(result) => result,
                        Err(_) => return timed_out(true),
                    };

                if matches!(verdict, Ok(Verdict::Accepted)) && delete_after_ack {
                    match tokio::time::timeout_at(deadline, store.delete(&artifact.id)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(id = %artifact.id, error = %e, "Failed to delete acknowledged evidence")
                        }
                        Err(_) => tracing::warn!(id = %artifact.id, "Timed out deleting acknowledged evidence"),
                    }
                }

                ProcessOutcome {
                    session_id,
                    persisted: true,
                    result: verdict,
                }
            }
            .boxed(),
        )
    }

    /// Apply a [`ProcessJob`] outcome: processing → success | error
    pub fn finish_processing(&mut self, outcome: ProcessOutcome) -> bool {
        if outcome.session_id != self.session.session_id
            || self.session.status != SessionStatus::Processing
        {
            tracing::debug!(session_id = %outcome.session_id, "Discarding stale processing outcome");
            return false;
        }

        self.persisted = outcome.persisted;
        match outcome.result {
            Ok(Verdict::Accepted) => {
                self.pending = None;
                tracing::info!("Evidence accepted");
                self.session.transition(SessionStatus::Success);
            }
            Ok(Verdict::Rejected { reason }) => {
                tracing::info!(reason = ?reason, "Evidence rejected");
                let message = reason.unwrap_or_else(|| ErrorKind::Rejected.user_message().to_string());
                self.fail_with(ErrorKind::Rejected, message);
            }
            Err(e) => self.fail(e),
        }
        true
    }

    /// error(timeout | submission) → processing, reusing the retained artifact
    pub fn resubmit(&mut self) -> bool {
        let resubmittable = self
            .session
            .status
            .error_kind()
            .is_some_and(|kind| kind.allows_resubmit());
        if !resubmittable || self.pending.is_none() {
            tracing::debug!(status = self.session.status.name(), "Resubmit ignored");
            return false;
        }
        tracing::info!(persisted = self.persisted, "Resubmitting evidence");
        self.session.transition(SessionStatus::Processing);
        true
    }

    /// Abandon the current attempt and return to intro with a fresh session.
    ///
    /// Accepted from every status except success. Nothing recorded so far
    /// is kept: an artifact that may already be in the store is queued for
    /// [`SessionMachine::discard_job`].
    pub fn cancel(&mut self) -> bool {
        if self.session.status == SessionStatus::Success {
            return false;
        }
        let previous = self.session.status.name();
        self.reset();
        tracing::info!(previous = previous, "Session cancelled");
        true
    }

    /// error → intro (fresh session) → initializing
    pub fn retry(&mut self) -> Option<InitJob> {
        if self.session.status.error_kind().is_none() {
            tracing::debug!(status = self.session.status.name(), "Retry ignored");
            return None;
        }
        self.reset();
        self.start()
    }

    /// Removes artifacts left by cancelled or retried sessions
    pub fn discard_job(&mut self) -> Option<DiscardJob> {
        if self.abandoned.is_empty() {
            return None;
        }
        let abandoned = std::mem::take(&mut self.abandoned);
        let store = self.collaborators.store.clone();
        let limit = self.session_config.processing_timeout();

        Some(
            async move {
                for artifact in abandoned {
                    match tokio::time::timeout(limit, store.delete(&artifact.id)).await {
                        Ok(Ok(true)) => tracing::info!(id = %artifact.id, "Discarded abandoned evidence"),
                        Ok(Ok(false)) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(id = %artifact.id, error = %e, "Failed to discard abandoned evidence")
                        }
                        Err(_) => tracing::warn!(id = %artifact.id, "Timed out discarding abandoned evidence"),
                    }
                }
            }
            .boxed(),
        )
    }

    fn reset(&mut self) {
        self.device = None;
        self.held_frame = None;
        self.recorder.discard();
        self.validator.reset();
        self.watchdog = None;
        if let Some(artifact) = self.pending.take() {
            self.abandoned.push(artifact);
        }
        self.persisted = false;
        self.init_report = None;
        self.session = Session::new();
    }

    fn fail(&mut self, error: VouchError) {
        tracing::warn!(error = %error, status = self.session.status.name(), "Session failed");
        let kind = error.kind();
        self.fail_with(kind, kind.user_message());
    }

    fn fail_with(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.device = None;
        self.held_frame = None;
        if self.recorder.is_recording() {
            self.session.recording_ended_at = Some(Utc::now());
        }
        self.recorder.discard();
        self.watchdog = None;
        if !kind.allows_resubmit() {
            self.pending = None;
        }
        self.session.transition(SessionStatus::error(kind, message));
    }
}

fn camera_error(error: VouchError) -> VouchError {
    match error {
        VouchError::Camera(msg) => VouchError::Camera(msg),
        other => VouchError::Camera(other.to_string()),
    }
}

/// Remove evidence past retention. Failures only cost disk space.
async fn sweep_expired(store: &dyn EvidenceStore, retention: Duration) {
    let cutoff = chrono::TimeDelta::from_std(retention)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age));
    let Some(cutoff) = cutoff else {
        return;
    };

    match store.delete_older_than(cutoff).await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed = removed, "Swept expired evidence"),
        Err(e) => tracing::warn!(error = %e, "Evidence sweep failed"),
    }
}
