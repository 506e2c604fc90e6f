// src/fx/components/compressor.rs

//! A feed-forward peak compressor with separate attack/release smoothing of
//! the gain-reduction envelope, grounded on the teacher's
//! `engine/envelope_follower.rs` one-pole follower design, applied here to
//! drive gain reduction above a threshold instead of modulation output.

pub struct Compressor {
    sample_rate: f32,
    envelope: f32,
    threshold_db: f32,
    ratio: f32,
    attack_ms: f32,
    release_ms: f32,
    makeup_db: f32,
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            envelope: 0.0,
            threshold_db: -18.0,
            ratio: 4.0,
            attack_ms: 5.0,
            release_ms: 80.0,
            makeup_db: 0.0,
        }
    }

    fn coeff(&self, time_ms: f32) -> f32 {
        (-1.0 / (time_ms.max(0.1) * 0.001 * self.sample_rate)).exp()
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let input_level = input.abs().max(1e-8);
        let coeff = if input_level > self.envelope {
            self.coeff(self.attack_ms)
        } else {
            self.coeff(self.release_ms)
        };
        self.envelope = input_level + coeff * (self.envelope - input_level);

        let level_db = 20.0 * self.envelope.log10();
        let over_db = (level_db - self.threshold_db).max(0.0);
        let reduction_db = over_db - over_db / self.ratio.max(1.0);

        let gain = 10.0f32.powf((self.makeup_db - reduction_db) / 20.0);
        input * gain
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.threshold_db = value.clamp(-60.0, 0.0),
            1 => self.ratio = value.clamp(1.0, 20.0),
            2 => self.attack_ms = value.clamp(0.1, 200.0),
            3 => self.release_ms = value.clamp(1.0, 2000.0),
            4 => self.makeup_db = value.clamp(0.0, 24.0),
            _ => {}
        }
    }
}
