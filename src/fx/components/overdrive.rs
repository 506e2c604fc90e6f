// src/fx/components/overdrive.rs

//! A drive-then-saturate waveshaper, grounded on the teacher's
//! `fx_components/waveshaper.rs` (its `Saturation` mode specifically,
//! matching a simple tape/tube overdrive rather than the full multi-mode
//! shaper the teacher exposes).

use super::fast_tanh;

pub struct Overdrive {
    drive_db: f32,
}

impl Overdrive {
    pub fn new() -> Self {
        Self { drive_db: 6.0 }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let gain = 10.0f32.powf(self.drive_db.clamp(0.0, 48.0) / 20.0);
        fast_tanh(input * gain)
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        if param_id == 0 {
            self.drive_db = value.clamp(0.0, 48.0);
        }
    }
}
