// src/fx/components/tape_echo.rs

//! A delay line with saturating feedback and high-frequency damping,
//! modeling the mild compression/saturation of a tape echo. Grounded on
//! the teacher's `fx_components/delay.rs` core, combined with the
//! `fast_tanh` saturation the teacher's waveshaper uses for its drive stage.

use super::{fast_tanh, DelayLine};

pub struct TapeEcho {
    delay: DelayLine,
    damping_z1: f32,
    time_ms: f32,
    feedback: f32,
    damping: f32,
    saturation: f32,
}

impl TapeEcho {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            delay: DelayLine::new(2000.0, sample_rate),
            damping_z1: 0.0,
            time_ms: 350.0,
            feedback: 0.4,
            damping: 0.4,
            saturation: 0.3,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.delay.read_ms(self.time_ms);
        self.damping_z1 = delayed * (1.0 - self.damping) + self.damping_z1 * self.damping;
        let saturated = fast_tanh(self.damping_z1 * (1.0 + self.saturation * 3.0));
        self.delay.write((input + saturated * self.feedback).clamp(-1.0, 1.0));
        saturated
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.time_ms = value.clamp(5.0, 2000.0),
            1 => self.feedback = value.clamp(0.0, 0.95),
            2 => self.damping = value.clamp(0.0, 0.99),
            3 => self.saturation = value.clamp(0.0, 1.0),
            _ => {}
        }
    }
}
