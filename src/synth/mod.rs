//! Additive tone synthesis
//!
//! Each sonified packet becomes one [`ActiveTone`]; the [`ToneEngine`] mixes all
//! live tones into fixed-size blocks once per synthesis tick.

pub mod engine;
pub mod tone;
pub mod waveform;

pub use engine::{MixOutcome, ToneEngine};
pub use tone::{ActiveTone, ToneParams, ToneSnapshot};
pub use waveform::Waveform;
