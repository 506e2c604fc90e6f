// src/engine/envelope_follower.rs

//! Per-voice envelope follower used as a modulation source. Grounded on
//! `original_source/EnvelopeFollower.h` (exponential attack/release
//! coefficients with a denormal flush-to-zero) and the teacher's
//! `fx_components/envelope_follower.rs` for the attack/release branch shape.

#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    sample_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f32) -> Self {
        let mut follower = Self {
            sample_rate,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
        };
        follower.set_parameters(10.0, 150.0);
        follower
    }

    pub fn set_parameters(&mut self, attack_ms: f32, release_ms: f32) {
        self.attack_coeff = Self::time_to_coeff(attack_ms, self.sample_rate);
        self.release_coeff = Self::time_to_coeff(release_ms, self.sample_rate);
    }

    fn time_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
        (-(1.0 / (time_ms.max(0.1) * 0.001 * sample_rate))).exp()
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let input_abs = input.abs();
        self.envelope = if input_abs > self.envelope {
            self.attack_coeff * (self.envelope - input_abs) + input_abs
        } else {
            self.release_coeff * (self.envelope - input_abs) + input_abs
        };
        if self.envelope.abs() < 1e-9 {
            self.envelope = 0.0;
        }
        self.envelope
    }

    pub fn value(&self) -> f32 {
        self.envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_rising_then_falling_amplitude() {
        let mut follower = EnvelopeFollower::new(48_000.0);
        for _ in 0..2000 {
            follower.process(1.0);
        }
        let high = follower.value();
        assert!(high > 0.8);
        for _ in 0..20_000 {
            follower.process(0.0);
        }
        assert!(follower.value() < high);
    }

    #[test]
    fn flushes_to_exact_zero_eventually() {
        let mut follower = EnvelopeFollower::new(48_000.0);
        follower.process(1.0);
        for _ in 0..200_000 {
            follower.process(0.0);
        }
        assert_eq!(follower.value(), 0.0);
    }
}
