//! Stateless oscillator shapes evaluated at a phase in radians

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
}

impl Waveform {
    /// Sample value in [-1, 1] at `phase`
    #[inline]
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => phase.sin(),
            Waveform::Square => {
                if phase.sin() >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => {
                let t = (phase / TAU).rem_euclid(1.0);
                if t < 0.5 {
                    -1.0 + 4.0 * t
                } else {
                    3.0 - 4.0 * t
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_sine() {
        assert!(close(Waveform::Sine.sample(0.0), 0.0));
        assert!(close(Waveform::Sine.sample(PI / 2.0), 1.0));
    }

    #[test]
    fn test_square() {
        assert_eq!(Waveform::Square.sample(0.0), 1.0);
        assert_eq!(Waveform::Square.sample(PI / 2.0), 1.0);
        assert_eq!(Waveform::Square.sample(3.0 * PI / 2.0), -1.0);
    }

    #[test]
    fn test_triangle() {
        assert!(close(Waveform::Triangle.sample(0.0), -1.0));
        assert!(close(Waveform::Triangle.sample(PI / 2.0), 0.0));
        assert!(close(Waveform::Triangle.sample(PI), 1.0));
        assert!(close(Waveform::Triangle.sample(3.0 * PI / 2.0), 0.0));
        // folded into [0, 1) before shaping
        assert!(close(Waveform::Triangle.sample(TAU + PI), 1.0));
    }

    #[test]
    fn test_bounded() {
        for waveform in [Waveform::Sine, Waveform::Square, Waveform::Triangle] {
            for i in 0..1000 {
                let phase = i as f32 * TAU / 1000.0;
                let v = waveform.sample(phase);
                assert!((-1.0..=1.0).contains(&v), "{waveform:?} at {phase} = {v}");
            }
        }
    }
}
