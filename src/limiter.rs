// src/limiter.rs

//! The master soft-clip limiter. Grounded directly on the teacher's
//! `Limiter` in `audio_engine.rs`: an attack/release envelope follower
//! driving a gain-reduction factor, plus a final hard safety clamp. The
//! `gain_reduction_db` telemetry field is kept as a plain `f32` here rather
//! than an `Arc<AtomicU32>`, since spec §5 makes the orchestrator the sole
//! owner of audio-thread state — there is no UI thread polling it directly
//! out of this crate.

#[derive(Debug)]
pub struct Limiter {
    attack_coeff: f32,
    envelope: f32,
    pub gain_reduction_db: f32,
}

impl Limiter {
    pub fn new(sample_rate: f32) -> Self {
        let attack_ms = 0.01;
        Self {
            attack_coeff: (-(1.0 / (attack_ms * 0.001 * sample_rate))).exp(),
            envelope: 0.0,
            gain_reduction_db: 0.0,
        }
    }

    /// `release_coeff` is passed in rather than stored, matching the
    /// teacher's signature, so a release-time control can be changed without
    /// recomputing limiter state.
    pub fn process(&mut self, input: f32, threshold: f32, release_coeff: f32) -> f32 {
        let gain = self.gain_for(input, threshold, release_coeff);
        (input * gain).clamp(-1.0, 1.0)
    }

    /// Advances the envelope follower from a single linked-channel input
    /// (e.g. `max(|left|, |right|)`) and returns the gain factor to apply to
    /// both channels, so a stereo master bus is gain-reduced identically on
    /// both sides instead of shifting the stereo image.
    pub fn gain_for(&mut self, input: f32, threshold: f32, release_coeff: f32) -> f32 {
        let input_abs = input.abs();

        self.envelope = if input_abs > self.envelope {
            self.attack_coeff * (self.envelope - input_abs) + input_abs
        } else {
            release_coeff * (self.envelope - input_abs) + input_abs
        };
        self.envelope = self.envelope.max(1e-6);

        let gain = if self.envelope > threshold {
            threshold / self.envelope
        } else {
            1.0
        };

        let reduction_db = 20.0 * gain.log10();
        self.gain_reduction_db = -reduction_db.clamp(-24.0, 0.0);

        gain
    }
}

pub fn release_ms_to_coeff(release_ms: f32, sample_rate: f32) -> f32 {
    (-(1.0 / (release_ms.max(0.1) * 0.001 * sample_rate))).exp()
}

/// The master soft-clip curve from spec §4.7: identity inside `[-1, 1]`,
/// exponential approach to the rail outside it. Non-finite input maps to
/// silence rather than propagating a NaN/Inf into the output buffer.
pub fn soft_clip(x: f32) -> f32 {
    if !x.is_finite() {
        return 0.0;
    }
    if x > 1.0 {
        1.0 - (1.0 - x).exp()
    } else if x < -1.0 {
        -1.0 + (1.0 + x).exp()
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_does_not_reduce_below_threshold() {
        let mut limiter = Limiter::new(48_000.0);
        let release = release_ms_to_coeff(100.0, 48_000.0);
        let out = limiter.process(0.1, 0.9, release);
        assert!((out - 0.1).abs() < 1e-3);
        assert!(limiter.gain_reduction_db.abs() < 0.5);
    }

    #[test]
    fn limiter_clamps_hot_signal() {
        let mut limiter = Limiter::new(48_000.0);
        let release = release_ms_to_coeff(100.0, 48_000.0);
        let mut out = 0.0;
        for _ in 0..2000 {
            out = limiter.process(2.0, 0.8, release);
        }
        assert!(out <= 1.0 && out >= -1.0);
        assert!(limiter.gain_reduction_db > 0.0);
    }
}
