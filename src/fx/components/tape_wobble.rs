// src/fx/components/tape_wobble.rs

//! Simulated tape wow/flutter: a delay line whose read offset is slowly
//! modulated by a sine LFO, with no feedback path (a pure pitch-wobble
//! send, not an echo). Grounded on the same delay-line building block as
//! `tape_echo.rs`, reworked for a slow, shallow modulation instead of a
//! discrete repeat.

use super::{DelayLine, UnitLfo};

pub struct TapeWobble {
    delay: DelayLine,
    lfo: UnitLfo,
    rate_hz: f32,
    depth_ms: f32,
    center_ms: f32,
}

impl TapeWobble {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            delay: DelayLine::new(60.0, sample_rate),
            lfo: UnitLfo::new(sample_rate),
            rate_hz: 0.15,
            depth_ms: 3.0,
            center_ms: 20.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        self.delay.write(input);
        let wobble = self.lfo.next_sine(self.rate_hz);
        self.delay.read_ms((self.center_ms + wobble * self.depth_ms).max(0.1))
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.rate_hz = value.clamp(0.01, 5.0),
            1 => self.depth_ms = value.clamp(0.0, 20.0),
            2 => self.center_ms = value.clamp(1.0, 55.0),
            _ => {}
        }
    }
}
