//! Replay of recorded landmark traces.
//!
//! A trace is a JSON-lines file, one object per sampled frame:
//!
//! ```text
//! {"face": {"yaw": -0.12}, "confidence": 0.97}
//! {"face": null}
//! {"face": {"nose_tip": {"x": 0.5, "y": 0.5}, ...}, "confidence": 0.9}
//! ```
//!
//! `face` is either a full [`FaceLandmarks`] set or a compact [`Pose`].
//! [`TraceCamera`] plays the lines back as frames (looping at the end) and
//! [`TraceLandmarkSource`] decodes each frame back into a face. Together
//! they stand in for a real camera and estimator during kiosk rehearsals.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use vouch_common::VouchError;

use crate::capture::{Camera, CaptureStream, Frame};
use crate::landmarks::{FaceLandmarks, FaceSample, LandmarkSource, Pose};

/// Face description in a trace line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TracedFace {
    Landmarks(FaceLandmarks),
    Pose(Pose),
}

impl TracedFace {
    pub fn landmarks(&self) -> FaceLandmarks {
        match self {
            Self::Landmarks(landmarks) => *landmarks,
            Self::Pose(pose) => FaceLandmarks::posed(pose),
        }
    }
}

/// One trace line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    #[serde(default)]
    pub face: Option<TracedFace>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

/// A parsed trace
#[derive(Debug, Clone)]
pub struct LandmarkTrace {
    records: Arc<Vec<TraceRecord>>,
}

impl LandmarkTrace {
    pub fn parse(text: &str) -> Result<Self, VouchError> {
        let mut records = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record = serde_json::from_str(line)
                .map_err(|e| VouchError::InvalidInput(format!("trace line {}: {}", n + 1, e)))?;
            records.push(record);
        }
        if records.is_empty() {
            return Err(VouchError::InvalidInput("trace has no frames".to_string()));
        }
        Ok(Self {
            records: Arc::new(records),
        })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, VouchError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| VouchError::InvalidInput(format!("trace {}: {}", path.display(), e)))?;
        let trace = Self::parse(&text)?;
        tracing::info!(path = %path.display(), frames = trace.len(), "Landmark trace loaded");
        Ok(trace)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn camera(&self) -> TraceCamera {
        TraceCamera {
            records: self.records.clone(),
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn landmark_source(&self) -> TraceLandmarkSource {
        TraceLandmarkSource
    }
}

/// Camera that plays back a trace. Only one stream may be open at a time.
#[derive(Debug, Clone)]
pub struct TraceCamera {
    records: Arc<Vec<TraceRecord>>,
    in_use: Arc<AtomicBool>,
}

#[async_trait]
impl Camera for TraceCamera {
    async fn acquire(&self) -> Result<Box<dyn CaptureStream>, VouchError> {
        if self.in_use.swap(true, Ordering::SeqCst) {
            return Err(VouchError::Camera("device is already in use".to_string()));
        }
        Ok(Box::new(TraceStream {
            records: self.records.clone(),
            in_use: self.in_use.clone(),
            position: 0,
        }))
    }
}

struct TraceStream {
    records: Arc<Vec<TraceRecord>>,
    in_use: Arc<AtomicBool>,
    position: usize,
}

#[async_trait]
impl CaptureStream for TraceStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, VouchError> {
        if self.records.is_empty() {
            return Ok(None);
        }
        let record = &self.records[self.position % self.records.len()];
        self.position += 1;

        let mut data = serde_json::to_vec(record)?;
        data.push(b'\n');
        Ok(Some(Frame {
            data,
            captured_at: Utc::now(),
        }))
    }

    fn release(&mut self) {
        self.in_use.store(false, Ordering::SeqCst);
    }
}

/// Decodes frames produced by a [`TraceCamera`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLandmarkSource;

#[async_trait]
impl LandmarkSource for TraceLandmarkSource {
    async fn prepare(&self) -> Result<(), VouchError> {
        Ok(())
    }

    async fn detect(&self, frame: &Frame) -> Result<Option<FaceSample>, VouchError> {
        let record: TraceRecord = serde_json::from_slice(&frame.data)?;
        Ok(record.face.map(|face| FaceSample {
            landmarks: face.landmarks(),
            confidence: record.confidence,
        }))
    }
}
