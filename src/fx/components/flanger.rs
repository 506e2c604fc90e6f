// src/fx/components/flanger.rs

//! A modulated short delay line with feedback. Grounded on the teacher's
//! `fx_components/flanger.rs`.

use super::{DelayLine, UnitLfo};

pub struct Flanger {
    delay: DelayLine,
    lfo: UnitLfo,
    rate_hz: f32,
    depth_ms: f32,
    feedback: f32,
}

impl Flanger {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            delay: DelayLine::new(20.0, sample_rate),
            lfo: UnitLfo::new(sample_rate),
            rate_hz: 0.2,
            depth_ms: 5.0,
            feedback: 0.85,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let lfo_out = self.lfo.next_sine(self.rate_hz);
        let delay_ms = (self.depth_ms + lfo_out * self.depth_ms).max(0.1);
        let wet = self.delay.read_ms(delay_ms);
        self.delay.write((input + wet * self.feedback).clamp(-1.0, 1.0));
        wet
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.rate_hz = value.max(0.01),
            1 => self.depth_ms = value.clamp(0.1, 15.0),
            2 => self.feedback = value.clamp(-0.99, 0.99),
            _ => {}
        }
    }
}
