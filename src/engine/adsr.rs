// src/engine/adsr.rs

//! A 5-stage envelope generator with exponential decay/release, grounded on
//! `original_source/engines/Adsr.h`. The teacher's own `synth.rs::Adsr` uses
//! linear decay/release instead; this crate follows the original's
//! exponential curve (with a Zeno-snap threshold so release never takes
//! forever to reach zero) since the spec requires that exact behavior,
//! while keeping the teacher's struct/state-enum shape.

const SNAP_THRESHOLD: f32 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdsrStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone, Copy)]
pub struct AdsrSettings {
    pub attack_s: f32,
    pub decay_s: f32,
    pub sustain: f32,
    pub release_s: f32,
}

impl Default for AdsrSettings {
    fn default() -> Self {
        Self {
            attack_s: 0.01,
            decay_s: 0.1,
            sustain: 0.8,
            release_s: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Adsr {
    settings: AdsrSettings,
    stage: AdsrStage,
    value: f32,
    attack_rate: f32,
    decay_coeff: f32,
    release_coeff: f32,
    sample_rate: f32,
}

impl Adsr {
    pub fn new(sample_rate: f32) -> Self {
        let mut adsr = Self {
            settings: AdsrSettings::default(),
            stage: AdsrStage::Idle,
            value: 0.0,
            attack_rate: 0.0,
            decay_coeff: 0.0,
            release_coeff: 0.0,
            sample_rate,
        };
        adsr.set_settings(adsr.settings);
        adsr
    }

    pub fn set_settings(&mut self, settings: AdsrSettings) {
        self.settings = settings;
        self.attack_rate = 1.0 / (settings.attack_s * self.sample_rate + 1.0);
        self.decay_coeff = (-1.0 / (settings.decay_s * self.sample_rate * 0.2 + 1.0)).exp();
        self.release_coeff = (-1.0 / (settings.release_s * self.sample_rate * 0.2 + 1.0)).exp();
    }

    pub fn stage(&self) -> AdsrStage {
        self.stage
    }

    pub fn settings(&self) -> AdsrSettings {
        self.settings
    }

    pub fn note_on(&mut self) {
        self.stage = AdsrStage::Attack;
    }

    pub fn note_off(&mut self) {
        if self.stage != AdsrStage::Idle {
            self.stage = AdsrStage::Release;
        }
    }

    pub fn reset(&mut self) {
        self.stage = AdsrStage::Idle;
        self.value = 0.0;
    }

    pub fn is_active(&self) -> bool {
        self.stage != AdsrStage::Idle
    }

    pub fn next_value(&mut self) -> f32 {
        match self.stage {
            AdsrStage::Idle => 0.0,
            AdsrStage::Attack => {
                self.value += self.attack_rate;
                if self.value >= 1.0 {
                    self.value = 1.0;
                    self.stage = AdsrStage::Decay;
                }
                self.value
            }
            AdsrStage::Decay => {
                self.value = self.settings.sustain + (self.value - self.settings.sustain) * self.decay_coeff;
                if (self.value - self.settings.sustain).abs() < SNAP_THRESHOLD
                    || self.value <= self.settings.sustain
                {
                    self.value = self.settings.sustain;
                    self.stage = AdsrStage::Sustain;
                }
                self.value
            }
            AdsrStage::Sustain => {
                self.value = self.settings.sustain;
                self.value
            }
            AdsrStage::Release => {
                self.value *= self.release_coeff;
                if self.value < SNAP_THRESHOLD {
                    self.value = 0.0;
                    self.stage = AdsrStage::Idle;
                }
                self.value
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn reaches_full_attack_then_decays_to_sustain() {
        let mut adsr = Adsr::new(48_000.0);
        adsr.set_settings(AdsrSettings {
            attack_s: 0.001,
            decay_s: 0.01,
            sustain: 0.5,
            release_s: 0.01,
        });
        adsr.note_on();
        let mut peak = 0.0f32;
        for _ in 0..10_000 {
            peak = peak.max(adsr.next_value());
            if adsr.stage() == AdsrStage::Sustain {
                break;
            }
        }
        assert_relative_eq!(peak, 1.0, epsilon = 1e-3);
        assert_eq!(adsr.stage(), AdsrStage::Sustain);
        assert_relative_eq!(adsr.value, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn release_reaches_idle_and_zero() {
        let mut adsr = Adsr::new(48_000.0);
        adsr.note_on();
        for _ in 0..5000 {
            adsr.next_value();
        }
        adsr.note_off();
        let mut last = 1.0;
        for _ in 0..50_000 {
            last = adsr.next_value();
            if adsr.stage() == AdsrStage::Idle {
                break;
            }
        }
        assert_eq!(adsr.stage(), AdsrStage::Idle);
        assert_eq!(last, 0.0);
    }
}
