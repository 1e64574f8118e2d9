//! Scripted collaborators for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vouch_common::{EvidenceArtifact, Verdict, VouchError};

use crate::capture::{Camera, CaptureStream, Frame};
use crate::evidence::{EvidenceStore, MemoryEvidenceStore};
use crate::landmarks::{FaceLandmarks, FaceSample, LandmarkSource, Pose};
use crate::submission::SubmissionClient;

/// A confident face holding `pose`
pub fn face(pose: Pose) -> Option<FaceSample> {
    Some(FaceSample {
        landmarks: FaceLandmarks::posed(&pose),
        confidence: 0.95,
    })
}

pub fn neutral() -> Option<FaceSample> {
    face(Pose::default())
}

pub fn eyes(openness: f32) -> Option<FaceSample> {
    face(Pose {
        eye_openness: openness,
        ..Pose::default()
    })
}

pub fn smiling(smile: f32) -> Option<FaceSample> {
    face(Pose {
        smile,
        ..Pose::default()
    })
}

#[derive(Default)]
struct CameraState {
    open: AtomicBool,
    acquisitions: AtomicUsize,
    releases: AtomicUsize,
    frames: AtomicUsize,
}

/// Camera producing numbered chunks forever
#[derive(Clone, Default)]
pub struct ScriptedCamera {
    state: Arc<CameraState>,
    deny: Option<String>,
    fail_after: Option<usize>,
}

impl ScriptedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denied(reason: &str) -> Self {
        Self {
            deny: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Deliver `frames` frames, then report the device as lost
    pub fn failing_after(frames: usize) -> Self {
        Self {
            fail_after: Some(frames),
            ..Self::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.state.acquisitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Camera for ScriptedCamera {
    async fn acquire(&self) -> Result<Box<dyn CaptureStream>, VouchError> {
        if let Some(reason) = &self.deny {
            return Err(VouchError::Camera(reason.clone()));
        }
        self.state.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.state.open.store(true, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            state: self.state.clone(),
            fail_after: self.fail_after,
        }))
    }
}

struct ScriptedStream {
    state: Arc<CameraState>,
    fail_after: Option<usize>,
}

#[async_trait]
impl CaptureStream for ScriptedStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, VouchError> {
        let n = self.state.frames.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| n >= limit) {
            return Err(VouchError::Camera("device disconnected".to_string()));
        }
        Ok(Some(Frame {
            data: format!("chunk-{};", n).into_bytes(),
            captured_at: Utc::now(),
        }))
    }

    fn release(&mut self) {
        self.state.open.store(false, Ordering::SeqCst);
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Landmark source replaying a queue of detections.
///
/// Once the queue runs dry the last detection repeats.
#[derive(Default)]
pub struct ScriptedDetector {
    faces: Mutex<VecDeque<Option<FaceSample>>>,
    last: Mutex<Option<FaceSample>>,
    prepare_failures: AtomicU32,
    prepare_calls: AtomicU32,
    prepare_hangs: bool,
    stall_detect: AtomicBool,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` readiness attempts
    pub fn failing_prepare(n: u32) -> Self {
        let detector = Self::default();
        detector.prepare_failures.store(n, Ordering::SeqCst);
        detector
    }

    /// Never finish a readiness attempt
    pub fn hanging_prepare() -> Self {
        Self {
            prepare_hangs: true,
            ..Self::default()
        }
    }

    pub fn push(&self, face: Option<FaceSample>) {
        self.faces.lock().unwrap().push_back(face);
    }

    pub fn push_all(&self, faces: impl IntoIterator<Item = Option<FaceSample>>) {
        self.faces.lock().unwrap().extend(faces);
    }

    /// Make the next `detect` call never finish
    pub fn stall_next_detect(&self) {
        self.stall_detect.store(true, Ordering::SeqCst);
    }

    pub fn prepare_calls(&self) -> u32 {
        self.prepare_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LandmarkSource for ScriptedDetector {
    async fn prepare(&self) -> Result<(), VouchError> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        if self.prepare_hangs {
            std::future::pending::<()>().await;
        }
        let remaining = self.prepare_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.prepare_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(VouchError::Detector("model not loaded".to_string()));
        }
        Ok(())
    }

    async fn detect(&self, _frame: &Frame) -> Result<Option<FaceSample>, VouchError> {
        if self.stall_detect.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let next = self.faces.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(face) = next {
            *last = face;
        }
        Ok(*last)
    }
}

/// Submitter answering from a script (default: accept)
#[derive(Default)]
pub struct ScriptedSubmitter {
    answers: Mutex<VecDeque<Result<Verdict, VouchError>>>,
    delay: Option<Duration>,
    received: Mutex<Vec<EvidenceArtifact>>,
}

impl ScriptedSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answering(answers: Vec<Result<Verdict, VouchError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            ..Self::default()
        }
    }

    /// Take `delay` before answering
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn received(&self) -> Vec<EvidenceArtifact> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionClient for ScriptedSubmitter {
    async fn submit(&self, _user_id: &str, artifact: &EvidenceArtifact) -> Result<Verdict, VouchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.received.lock().unwrap().push(artifact.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Verdict::Accepted))
    }
}

/// In-memory store whose deletions never complete
#[derive(Default)]
pub struct StalledStore {
    inner: MemoryEvidenceStore,
}

impl StalledStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl EvidenceStore for StalledStore {
    async fn put(&self, artifact: &EvidenceArtifact) -> Result<(), VouchError> {
        self.inner.put(artifact).await
    }

    async fn get(&self, id: &str) -> Result<Option<EvidenceArtifact>, VouchError> {
        self.inner.get(id).await
    }

    async fn delete(&self, _id: &str) -> Result<bool, VouchError> {
        std::future::pending().await
    }

    async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> Result<usize, VouchError> {
        std::future::pending().await
    }
}
