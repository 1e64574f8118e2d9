//! Face landmarks and the signals derived from them.
//!
//! The landmark estimator itself is external. It is reached through the
//! [`LandmarkSource`] trait and reports at most one face per frame as a
//! [`FaceSample`]. Everything downstream works on the handful of named
//! anchors in [`FaceLandmarks`], never on estimator-specific indices.
//!
//! Coordinates are normalized to the frame (0..1) and mirrored the way a
//! selfie preview is: the user's left is −x.

mod mesh;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vouch_common::VouchError;

use crate::capture::Frame;

pub use mesh::MESH_POINT_COUNT;

/// A normalized 2D landmark
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Four contour points of one eye
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    pub outer: Point,
    pub inner: Point,
    pub top: Point,
    pub bottom: Point,
}

impl EyeLandmarks {
    /// Eye aspect ratio (lid gap over eye width); ~0.3 open, <0.2 closed
    pub fn aspect_ratio(&self) -> f32 {
        self.top.distance(&self.bottom) / self.outer.distance(&self.inner).max(0.001)
    }
}

/// Estimator-neutral facial anchors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub nose_tip: Point,
    pub left_cheek: Point,
    pub right_cheek: Point,
    pub forehead: Point,
    pub chin: Point,
    pub left_eye: EyeLandmarks,
    pub right_eye: EyeLandmarks,
    pub mouth_left: Point,
    pub mouth_right: Point,
    pub upper_lip: Point,
    pub lower_lip: Point,
}

/// Scalar gesture signals for one frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceSignals {
    /// Nose offset from the face's vertical midline, in face widths (−left, +right)
    pub yaw: f32,
    /// Nose offset from the face's horizontal midline, in face heights (+down)
    pub pitch: f32,
    /// Mean eye aspect ratio of both eyes
    pub eye_openness: f32,
    /// Mouth-corner lift above the lip center, in mouth widths
    pub smile: f32,
}

/// Compact pose description; inverse of [`FaceLandmarks::signals`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
    #[serde(default = "default_eye_openness")]
    pub eye_openness: f32,
    #[serde(default)]
    pub smile: f32,
}

fn default_eye_openness() -> f32 {
    NEUTRAL_EYE_OPENNESS
}

/// Typical open-eye aspect ratio
pub const NEUTRAL_EYE_OPENNESS: f32 = 0.3;

impl Default for Pose {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            eye_openness: NEUTRAL_EYE_OPENNESS,
            smile: 0.0,
        }
    }
}

// Reference geometry for posed faces
const FACE_LEFT_X: f32 = 0.3;
const FACE_RIGHT_X: f32 = 0.7;
const FOREHEAD_Y: f32 = 0.2;
const CHIN_Y: f32 = 0.8;
const EYE_Y: f32 = 0.4;
const EYE_HALF_WIDTH: f32 = 0.05;
const MOUTH_Y: f32 = 0.68;
const MOUTH_HALF_WIDTH: f32 = 0.1;
const LIP_HALF_GAP: f32 = 0.02;

impl FaceLandmarks {
    /// Derive the gesture signals for this frame
    pub fn signals(&self) -> FaceSignals {
        let face_width = self.left_cheek.distance(&self.right_cheek).max(0.001);
        let face_height = self.forehead.distance(&self.chin).max(0.001);
        let mid_x = (self.left_cheek.x + self.right_cheek.x) / 2.0;
        let mid_y = (self.forehead.y + self.chin.y) / 2.0;

        let mouth_width = self.mouth_left.distance(&self.mouth_right).max(0.001);
        let lip_center_y = (self.upper_lip.y + self.lower_lip.y) / 2.0;
        let corner_y = (self.mouth_left.y + self.mouth_right.y) / 2.0;

        FaceSignals {
            yaw: (self.nose_tip.x - mid_x) / face_width,
            pitch: (self.nose_tip.y - mid_y) / face_height,
            eye_openness: (self.left_eye.aspect_ratio() + self.right_eye.aspect_ratio()) / 2.0,
            // Image y grows downward, so raised corners have a smaller y
            smile: (lip_center_y - corner_y) / mouth_width,
        }
    }

    /// Build anchors for a reference face holding the given pose
    pub fn posed(pose: &Pose) -> Self {
        let face_width = FACE_RIGHT_X - FACE_LEFT_X;
        let face_height = CHIN_Y - FOREHEAD_Y;
        let mid_y = (FOREHEAD_Y + CHIN_Y) / 2.0;

        let eye = |center_x: f32, outer_x: f32, inner_x: f32| {
            let half_gap = pose.eye_openness * EYE_HALF_WIDTH;
            EyeLandmarks {
                outer: Point::new(outer_x, EYE_Y),
                inner: Point::new(inner_x, EYE_Y),
                top: Point::new(center_x, EYE_Y - half_gap),
                bottom: Point::new(center_x, EYE_Y + half_gap),
            }
        };

        let corner_y = MOUTH_Y - pose.smile * 2.0 * MOUTH_HALF_WIDTH;

        Self {
            nose_tip: Point::new(0.5 + pose.yaw * face_width, mid_y + pose.pitch * face_height),
            left_cheek: Point::new(FACE_LEFT_X, mid_y),
            right_cheek: Point::new(FACE_RIGHT_X, mid_y),
            forehead: Point::new(0.5, FOREHEAD_Y),
            chin: Point::new(0.5, CHIN_Y),
            left_eye: eye(0.38, 0.33, 0.43),
            right_eye: eye(0.62, 0.67, 0.57),
            mouth_left: Point::new(0.5 - MOUTH_HALF_WIDTH, corner_y),
            mouth_right: Point::new(0.5 + MOUTH_HALF_WIDTH, corner_y),
            upper_lip: Point::new(0.5, MOUTH_Y - LIP_HALF_GAP),
            lower_lip: Point::new(0.5, MOUTH_Y + LIP_HALF_GAP),
        }
    }

    /// Pick the anchors out of a 468-point face mesh.
    ///
    /// Returns `None` when the mesh is short.
    pub fn from_mesh(points: &[[f32; 3]]) -> Option<Self> {
        mesh::anchors(points)
    }
}

/// One detected face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceSample {
    pub landmarks: FaceLandmarks,
    /// Presence confidence in [0, 1]
    pub confidence: f32,
}

/// External landmark estimator.
#[async_trait]
pub trait LandmarkSource: Send + Sync {
    /// Load and warm up the estimator. May be called again after a failure.
    async fn prepare(&self) -> Result<(), VouchError>;

    /// Extract zero or one face from a frame
    async fn detect(&self, frame: &Frame) -> Result<Option<FaceSample>, VouchError>;
}
