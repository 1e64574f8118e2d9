//! Randomized challenge sequences.

use rand::Rng;
use rand::seq::SliceRandom;
use vouch_common::{ChallengeDescriptor, Gesture, TurnDirection};

use crate::config::ChallengeConfig;

/// Challenge generator service
pub struct ChallengeGenerator {
    config: ChallengeConfig,
}

impl ChallengeGenerator {
    pub fn new(config: ChallengeConfig) -> Self {
        Self { config }
    }

    /// The fixed catalog of challenge kinds
    pub fn catalog(&self) -> [Gesture; 5] {
        [
            Gesture::HeadTurn { direction: TurnDirection::Left },
            Gesture::HeadTurn { direction: TurnDirection::Right },
            Gesture::Blink {
                repeat_count: self.config.blink_repeat_count,
            },
            Gesture::Smile,
            Gesture::HeadNod,
        ]
    }

    /// Generate a new challenge sequence.
    ///
    /// A configured fixed sequence is returned as-is.
    pub fn generate(&self) -> Vec<ChallengeDescriptor> {
        if let Some(sequence) = &self.config.sequence {
            return sequence.iter().copied().map(ChallengeDescriptor::new).collect();
        }
        self.generate_with(&mut rand::rng())
    }

    /// Generate a sequence from the given RNG.
    ///
    /// Left and right head turns share one slot: each session keeps exactly
    /// one direction, so no gesture family appears twice and adjacent
    /// entries always differ.
    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<ChallengeDescriptor> {
        let direction = if rng.random_bool(0.5) {
            TurnDirection::Left
        } else {
            TurnDirection::Right
        };

        let mut kinds: Vec<Gesture> = self
            .catalog()
            .into_iter()
            .filter(|g| match g {
                Gesture::HeadTurn { direction: d } => *d == direction,
                _ => true,
            })
            .collect();
        kinds.shuffle(rng);

        let count = rng
            .random_range(self.config.min_count..=self.config.max_count)
            .min(kinds.len());
        kinds.truncate(count);

        let sequence: Vec<ChallengeDescriptor> =
            kinds.into_iter().map(ChallengeDescriptor::new).collect();

        tracing::debug!(
            count = sequence.len(),
            kinds = ?sequence.iter().map(|c| c.family()).collect::<Vec<_>>(),
            "Generated challenge sequence"
        );

        sequence
    }
}
