//! Per-gesture validation against live landmarks.
//!
//! One validator lives for one session. It keeps tracking state for the
//! challenge it is currently scoring and resets that state whenever the
//! session moves on to the next index. Baselines for pose-relative gestures
//! are seeded from the last face seen before the challenge began; with no
//! such face, the first few frames of the challenge are averaged instead.

use vouch_common::{ChallengeDescriptor, Gesture, TurnDirection};

use crate::config::ValidatorConfig;
use crate::landmarks::{FaceLandmarks, FaceSignals};

/// One frame's verdict for the current challenge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validation {
    pub passed: bool,
    /// Progress toward the gesture in [0, 1]
    pub confidence: f32,
}

impl Validation {
    const PENDING: Validation = Validation {
        passed: false,
        confidence: 0.0,
    };
}

/// Neutral reference for a pose-relative signal
#[derive(Debug, Clone, Copy)]
struct Baseline {
    sum: f32,
    frames: usize,
    needed: usize,
}

impl Baseline {
    fn new(seed: Option<f32>, calibration_frames: usize) -> Self {
        match seed {
            Some(value) => Self {
                sum: value,
                frames: 1,
                needed: 1,
            },
            None => Self {
                sum: 0.0,
                frames: 0,
                needed: calibration_frames.max(1),
            },
        }
    }

    /// Feed a frame into calibration. Returns true if the frame was consumed.
    fn absorb(&mut self, value: f32) -> bool {
        if self.frames >= self.needed {
            return false;
        }
        self.sum += value;
        self.frames += 1;
        true
    }

    fn value(&self) -> f32 {
        self.sum / self.frames.max(1) as f32
    }
}

#[derive(Debug)]
enum Tracker {
    Idle,
    HeadTurn {
        direction: TurnDirection,
        baseline: Baseline,
    },
    Blink {
        required: u8,
        closed_frames: u32,
        blinks: u32,
    },
    Smile {
        baseline: Baseline,
    },
    HeadNod {
        baseline: Baseline,
        /// Largest signed excursion so far
        peak: f32,
        /// Largest travel back from `peak`
        rebound: f32,
    },
}

/// Stateful challenge validator (one per session)
pub struct ChallengeValidator {
    config: ValidatorConfig,
    active: Option<usize>,
    tracker: Tracker,
    last_seen: Option<FaceSignals>,
}

impl ChallengeValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            active: None,
            tracker: Tracker::Idle,
            last_seen: None,
        }
    }

    /// Forget everything, including the last-seen face
    pub fn reset(&mut self) {
        self.active = None;
        self.tracker = Tracker::Idle;
        self.last_seen = None;
    }

    /// Record a face seen outside of recording, for baseline seeding
    pub fn prime(&mut self, landmarks: &FaceLandmarks) {
        self.last_seen = Some(landmarks.signals());
    }

    /// Score one frame against the challenge at `index`
    pub fn validate(
        &mut self,
        index: usize,
        descriptor: &ChallengeDescriptor,
        landmarks: &FaceLandmarks,
    ) -> Validation {
        if self.active != Some(index) {
            self.begin(index, descriptor);
        }

        let signals = landmarks.signals();
        let result = self.score(&signals);
        self.last_seen = Some(signals);

        tracing::trace!(
            index,
            gesture = ?descriptor.family(),
            confidence = result.confidence,
            passed = result.passed,
            "Validated frame"
        );

        result
    }

    fn begin(&mut self, index: usize, descriptor: &ChallengeDescriptor) {
        let seed = self.last_seen;
        let frames = self.config.calibration_frames;

        self.tracker = match descriptor.gesture {
            Gesture::HeadTurn { direction } => Tracker::HeadTurn {
                direction,
                baseline: Baseline::new(seed.map(|s| s.yaw), frames),
            },
            Gesture::Blink { repeat_count } => Tracker::Blink {
                required: repeat_count.max(1),
                closed_frames: 0,
                blinks: 0,
            },
            Gesture::Smile => Tracker::Smile {
                baseline: Baseline::new(seed.map(|s| s.smile), frames),
            },
            Gesture::HeadNod => Tracker::HeadNod {
                baseline: Baseline::new(seed.map(|s| s.pitch), frames),
                peak: 0.0,
                rebound: 0.0,
            },
        };
        self.active = Some(index);

        tracing::debug!(index, seeded = seed.is_some(), "Validator tracking new challenge");
    }

    fn score(&mut self, signals: &FaceSignals) -> Validation {
        let cfg = &self.config;
        let threshold = cfg.pass_threshold;
        let by_threshold = |confidence: f32| Validation {
            passed: confidence >= threshold,
            confidence,
        };

        match &mut self.tracker {
            Tracker::Idle => Validation::PENDING,

            Tracker::HeadTurn {
                direction,
                baseline,
            } => {
                if baseline.absorb(signals.yaw) {
                    return Validation::PENDING;
                }
                let displacement = signals.yaw - baseline.value();
                let signed = match direction {
                    TurnDirection::Left => -displacement,
                    TurnDirection::Right => displacement,
                };
                by_threshold(ratio(signed, cfg.head_turn_saturation))
            }

            Tracker::Blink {
                required,
                closed_frames,
                blinks,
            } => {
                if signals.eye_openness < cfg.eye_closed_threshold {
                    *closed_frames += 1;
                } else {
                    if *closed_frames >= cfg.min_closed_frames {
                        *blinks += 1;
                    }
                    *closed_frames = 0;
                }
                let required = u32::from(*required);
                Validation {
                    passed: *blinks >= required,
                    confidence: (*blinks as f32 / required as f32).min(1.0),
                }
            }

            Tracker::Smile { baseline } => {
                if baseline.absorb(signals.smile) {
                    return Validation::PENDING;
                }
                by_threshold(ratio(signals.smile - baseline.value(), cfg.smile_saturation))
            }

            Tracker::HeadNod {
                baseline,
                peak,
                rebound,
            } => {
                if baseline.absorb(signals.pitch) {
                    return Validation::PENDING;
                }
                let offset = signals.pitch - baseline.value();
                if offset.abs() > peak.abs() {
                    *peak = offset;
                    *rebound = 0.0;
                } else {
                    *rebound = rebound.max((*peak - offset).abs());
                }
                let out = ratio(peak.abs(), cfg.head_nod_saturation);
                let back = ratio(*rebound, cfg.head_nod_saturation);
                by_threshold((out + back) / 2.0)
            }
        }
    }
}

/// Linear ramp from 0 to 1 at `saturation`
fn ratio(value: f32, saturation: f32) -> f32 {
    (value / saturation).clamp(0.0, 1.0)
}
