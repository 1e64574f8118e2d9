//! Challenge generation and validation.
//!
//! The generator issues a shuffled sequence of gestures at session start.
//! The validator scores live landmarks against the current challenge,
//! tracking whatever short history each gesture needs between frames.

mod generator;
mod validator;

pub use generator::ChallengeGenerator;
pub use validator::{ChallengeValidator, Validation};
