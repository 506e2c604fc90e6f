// src/fx/components/phaser.rs

//! A 4-stage allpass cascade with an LFO-modulated corner frequency,
//! grounded on the teacher's `fx_components/filter.rs` allpass coefficient
//! shape, generalized into a cascade the way a classic phaser stacks them.

use super::UnitLfo;
use std::f32::consts::PI;

struct AllpassStage {
    z1: f32,
}

impl AllpassStage {
    fn process(&mut self, input: f32, coeff: f32) -> f32 {
        let output = -coeff * input + self.z1;
        self.z1 = input + coeff * output;
        output
    }
}

pub struct Phaser {
    stages: [AllpassStage; 4],
    lfo: UnitLfo,
    sample_rate: f32,
    rate_hz: f32,
    depth: f32,
    feedback: f32,
    last_output: f32,
}

impl Phaser {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            stages: std::array::from_fn(|_| AllpassStage { z1: 0.0 }),
            lfo: UnitLfo::new(sample_rate),
            sample_rate,
            rate_hz: 0.3,
            depth: 0.7,
            feedback: 0.3,
            last_output: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let lfo_out = self.lfo.next_sine(self.rate_hz);
        let center_hz = 800.0 + lfo_out * self.depth * 700.0;
        let g = (PI * center_hz.clamp(50.0, self.sample_rate * 0.45) / self.sample_rate).tan();
        let coeff = (g - 1.0) / (g + 1.0);

        let mut signal = input + self.last_output * self.feedback;
        for stage in self.stages.iter_mut() {
            signal = stage.process(signal, coeff);
        }
        self.last_output = signal;
        signal
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.rate_hz = value.max(0.01),
            1 => self.depth = value.clamp(0.0, 1.0),
            2 => self.feedback = value.clamp(0.0, 0.95),
            _ => {}
        }
    }
}
