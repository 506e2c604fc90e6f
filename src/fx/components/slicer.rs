// src/fx/components/slicer.rs

//! A tempo-feel gate/trance-slicer: a free-running square LFO chops the
//! signal's amplitude between a floor and full level, with a short smoothed
//! edge to avoid hard clicks. Grounded on the teacher's
//! `fx_components/lfo.rs` phase accumulator, reused here as a gate clock
//! rather than a filter or pitch modulator.

use super::UnitLfo;

pub struct Slicer {
    lfo: UnitLfo,
    rate_hz: f32,
    depth: f32,
    smoothed_gain: f32,
}

impl Slicer {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            lfo: UnitLfo::new(sample_rate),
            rate_hz: 4.0,
            depth: 0.8,
            smoothed_gain: 1.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let gate = self.lfo.next_square(self.rate_hz);
        let target = if gate > 0.0 { 1.0 } else { 1.0 - self.depth };
        self.smoothed_gain += (target - self.smoothed_gain) * 0.35;
        input * self.smoothed_gain
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.rate_hz = value.clamp(0.1, 32.0),
            1 => self.depth = value.clamp(0.0, 1.0),
            _ => {}
        }
    }
}
