// src/fx/components/delay.rs

//! The stereo-aware delay bus slot: alternating ping-pong left/right taps
//! from a single mono send, with feedback and damping. Grounded on the
//! teacher's `fx_components/delay.rs::DelayLine`; stereo-aware per spec
//! §4.7 (one of the two slots with a dedicated wet-stereo pair).

use super::DelayLine;

pub struct Delay {
    left: DelayLine,
    right: DelayLine,
    damping_l: f32,
    damping_r: f32,
    time_ms: f32,
    feedback: f32,
    damping: f32,
}

impl Delay {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            left: DelayLine::new(2000.0, sample_rate),
            right: DelayLine::new(2000.0, sample_rate),
            damping_l: 0.0,
            damping_r: 0.0,
            time_ms: 375.0,
            feedback: 0.35,
            damping: 0.3,
        }
    }

    /// Ping-pong: left taps at `time_ms`, right at `time_ms * 2` so the
    /// repeats alternate channels.
    pub fn process(&mut self, input: f32) -> (f32, f32) {
        let wet_l = self.left.read_ms(self.time_ms);
        let wet_r = self.right.read_ms(self.time_ms * 2.0);

        self.damping_l = wet_l * (1.0 - self.damping) + self.damping_l * self.damping;
        self.damping_r = wet_r * (1.0 - self.damping) + self.damping_r * self.damping;

        self.left.write((input + self.damping_r * self.feedback).clamp(-1.0, 1.0));
        self.right.write((self.damping_l * self.feedback).clamp(-1.0, 1.0));

        (self.damping_l, self.damping_r)
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.time_ms = value.clamp(5.0, 1000.0),
            1 => self.feedback = value.clamp(0.0, 0.95),
            2 => self.damping = value.clamp(0.0, 0.99),
            _ => {}
        }
    }
}
