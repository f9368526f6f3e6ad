//! Block transforms
//!
//! Everything the transform stage can apply to a block. All transforms
//! implement [`BlockTransform`] and work in place.

mod gain;
mod pitch_shift;
mod transform;

pub use gain::Gain;
pub use pitch_shift::PitchShifter;
pub use transform::{BlockTransform, FnTransform, Passthrough};
