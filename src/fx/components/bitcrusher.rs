// src/fx/components/bitcrusher.rs

//! Sample-and-hold downsampling plus bit-depth quantization, grounded on
//! the teacher's `fx_components/quantizer.rs` modulo-counter sample-and-hold
//! (its comment documents a prior unstable counter bug; this crate keeps
//! the fixed modulo form).

pub struct Bitcrusher {
    bit_depth: f32,
    downsample_factor: u32,
    sample_counter: u32,
    held_sample: f32,
}

impl Bitcrusher {
    pub fn new() -> Self {
        Self {
            bit_depth: 8.0,
            downsample_factor: 4,
            sample_counter: 0,
            held_sample: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        if self.sample_counter == 0 {
            self.held_sample = input;
        }
        self.sample_counter = (self.sample_counter + 1) % self.downsample_factor;

        let num_steps = 2.0f32.powf(self.bit_depth);
        let scaled = (self.held_sample * 0.5 + 0.5) * num_steps;
        (scaled.round() / num_steps) * 2.0 - 1.0
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.bit_depth = value.clamp(1.0, 16.0),
            1 => self.downsample_factor = (value.round().max(1.0)) as u32,
            _ => {}
        }
    }
}
