// src/fx/components/chorus.rs

//! Two detuned modulated delay taps summed together; same building block as
//! `flanger.rs` but longer delay, slower LFO, and no feedback path,
//! matching the spec's distinction between the two slot kinds.

use super::{DelayLine, UnitLfo};

pub struct Chorus {
    delay: DelayLine,
    lfo_a: UnitLfo,
    lfo_b: UnitLfo,
    rate_hz: f32,
    depth_ms: f32,
    base_delay_ms: f32,
    mix: f32,
}

impl Chorus {
    pub fn new(sample_rate: f32) -> Self {
        let mut lfo_b = UnitLfo::new(sample_rate);
        // Offset the second voice's phase so the two taps don't move in lockstep.
        lfo_b.next_sine(0.0);
        Self {
            delay: DelayLine::new(40.0, sample_rate),
            lfo_a: UnitLfo::new(sample_rate),
            lfo_b,
            rate_hz: 0.5,
            depth_ms: 4.0,
            base_delay_ms: 15.0,
            mix: 0.5,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        self.delay.write(input);
        let mod_a = self.lfo_a.next_sine(self.rate_hz);
        let mod_b = self.lfo_b.next_sine(self.rate_hz * 1.3 + 0.01);
        let tap_a = self.delay.read_ms((self.base_delay_ms + mod_a * self.depth_ms).max(0.1));
        let tap_b = self.delay.read_ms((self.base_delay_ms * 1.7 + mod_b * self.depth_ms).max(0.1));
        let wet = (tap_a + tap_b) * 0.5;
        input * (1.0 - self.mix) + wet * self.mix
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.rate_hz = value.max(0.01),
            1 => self.depth_ms = value.clamp(0.1, 10.0),
            2 => self.mix = value.clamp(0.0, 1.0),
            _ => {}
        }
    }
}
