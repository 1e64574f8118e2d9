//! Core types shared across Vouch components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_BLINK_COUNT;
use crate::error::ErrorKind;

/// Head-turn direction, from the user's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnDirection {
    Left,
    Right,
}

/// Underlying gesture family; adjacent challenges never share one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureFamily {
    HeadTurn,
    Blink,
    Smile,
    HeadNod,
}

/// A physical action the user is asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Gesture {
    HeadTurn { direction: TurnDirection },
    Blink {
        #[serde(default = "default_repeat_count")]
        repeat_count: u8,
    },
    Smile,
    HeadNod,
}

fn default_repeat_count() -> u8 {
    DEFAULT_BLINK_COUNT
}

impl Gesture {
    pub fn family(&self) -> GestureFamily {
        match self {
            Self::HeadTurn { .. } => GestureFamily::HeadTurn,
            Self::Blink { .. } => GestureFamily::Blink,
            Self::Smile => GestureFamily::Smile,
            Self::HeadNod => GestureFamily::HeadNod,
        }
    }

    /// Human-readable instruction for this gesture
    pub fn instruction(&self) -> String {
        match self {
            Self::HeadTurn { direction: TurnDirection::Left } => {
                "Slowly turn your head to the left".to_string()
            }
            Self::HeadTurn { direction: TurnDirection::Right } => {
                "Slowly turn your head to the right".to_string()
            }
            Self::Blink { repeat_count: 1 } => "Blink once".to_string(),
            Self::Blink { repeat_count } => format!("Blink {} times", repeat_count),
            Self::Smile => "Give us a big smile".to_string(),
            Self::HeadNod => "Nod your head".to_string(),
        }
    }
}

/// One issued challenge. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeDescriptor {
    #[serde(flatten)]
    pub gesture: Gesture,

    /// Stamped at generation time so the text never changes once shown
    pub instruction_text: String,
}

impl ChallengeDescriptor {
    pub fn new(gesture: Gesture) -> Self {
        Self {
            instruction_text: gesture.instruction(),
            gesture,
        }
    }

    pub fn family(&self) -> GestureFamily {
        self.gesture.family()
    }
}

/// Mutable progress for one descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeState {
    pub completed: bool,

    /// Latest validator confidence, clamped to [0, 1]
    pub progress: f32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChallengeState {
    /// Apply one frame's validator output.
    ///
    /// Completion locks in on the first passing frame; later frames keep
    /// updating `progress` but never clear `completed`. Returns true only on
    /// the frame that completed the challenge.
    pub fn apply(&mut self, passed: bool, confidence: f32, now: DateTime<Utc>) -> bool {
        self.progress = confidence.clamp(0.0, 1.0);
        if passed && !self.completed {
            self.completed = true;
            self.completed_at = Some(now);
            return true;
        }
        false
    }
}

/// A descriptor paired with its state (co-indexed, 1:1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub descriptor: ChallengeDescriptor,
    pub state: ChallengeState,
}

impl Challenge {
    pub fn new(descriptor: ChallengeDescriptor) -> Self {
        Self {
            descriptor,
            state: ChallengeState::default(),
        }
    }
}

/// Session status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionStatus {
    /// Waiting for the user to start
    Intro,
    /// Acquiring the camera and preparing the landmark source
    Initializing,
    /// Observing face presence, waiting for the begin trigger
    Detecting,
    /// Recording and validating challenges
    Recording,
    /// Persisting and submitting evidence
    Processing,
    /// Verdict accepted
    Success,
    /// Attempt ended with an error
    Error { kind: ErrorKind, message: String },
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Intro
    }
}

impl SessionStatus {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Terminal for the current attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Initializing => "initializing",
            Self::Detecting => "detecting",
            Self::Recording => "recording",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Error { .. } => "error",
        }
    }
}

/// Result metadata stored with the evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    /// A face was present on the last sampled frame
    pub face_detected: bool,

    /// Landmark-source confidence on the last sampled frame
    pub face_confidence: f32,

    /// Every issued challenge completed before recording stopped
    pub all_challenges_passed: bool,

    pub recording_started_at: DateTime<Utc>,
    pub recording_ended_at: DateTime<Utc>,

    /// Hex SHA-256 of `video_bytes`
    pub video_sha256: String,
}

/// Persisted evidence for one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceArtifact {
    /// Same as the session id that produced it
    pub id: String,

    /// Opaque encoded video
    #[serde(with = "video_bytes")]
    pub video_bytes: Vec<u8>,

    /// The finished challenge list (no landmarks)
    pub challenge_summary: Vec<Challenge>,

    pub metadata: EvidenceMetadata,

    pub created_at: DateTime<Utc>,
}

/// Verdict returned by the verification endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    Accepted,
    Rejected {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// Read-only view of a session for the host UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,

    #[serde(flatten)]
    pub status: SessionStatus,

    pub challenges: Vec<Challenge>,
    pub current_index: usize,
    pub face_present: bool,
    pub face_confidence: f32,
    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_ended_at: Option<DateTime<Utc>>,

    /// Instruction for the challenge currently being validated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

/// Video bytes as a base64 string.
mod video_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(de::Error::custom)
    }
}
