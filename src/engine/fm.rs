// src/engine/fm.rs

//! A 2-operator FM voice (modulator phase-modulating a carrier, DX7-style),
//! grounded on `original_source/engines/FmOperator.h`/`FmEngine.h`,
//! simplified from the original's 6-operator/algorithm-matrix design per
//! the voice-producer's "opaque, deliberately simple" framing — one
//! carrier, one modulator, each with its own envelope.

use super::adsr::{Adsr, AdsrSettings};
use super::filter::{FilterMode, StateVariableFilter};
use super::{note_to_frequency, param_ids, VoiceProducer};
use crate::config::MAX_POLYPHONY;
use std::f32::consts::TAU;

struct Voice {
    note: u8,
    carrier_phase: f32,
    modulator_phase: f32,
    carrier_env: Adsr,
    modulator_env: Adsr,
    filter: StateVariableFilter,
}

impl Voice {
    fn new(sample_rate: f32) -> Self {
        Self {
            note: 0,
            carrier_phase: 0.0,
            modulator_phase: 0.0,
            carrier_env: Adsr::new(sample_rate),
            modulator_env: Adsr::new(sample_rate),
            filter: StateVariableFilter::new(sample_rate),
        }
    }

    fn is_active(&self) -> bool {
        self.carrier_env.is_active()
    }
}

pub struct FmEngine {
    sample_rate: f32,
    voices: Vec<Voice>,
    modulator_ratio: f32,
    modulation_index: f32,
    cutoff_hz: f32,
    resonance: f32,
    filter_env_amount: f32,
}

impl FmEngine {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: (0..MAX_POLYPHONY).map(|_| Voice::new(sample_rate)).collect(),
            modulator_ratio: 3.5,
            modulation_index: 2.0,
            cutoff_hz: 12_000.0,
            resonance: 0.1,
            filter_env_amount: 0.0,
        }
    }

    fn steal_voice(&mut self) -> usize {
        self.voices
            .iter()
            .position(|v| !v.is_active())
            .unwrap_or_else(|| {
                (0..self.voices.len())
                    .min_by_key(|&i| self.voices[i].carrier_env.stage() as u8)
                    .unwrap_or(0)
            })
    }
}

impl VoiceProducer for FmEngine {
    fn trigger(&mut self, note: u8, _velocity: u8, _duration_samples: f64) {
        let idx = self.steal_voice();
        let voice = &mut self.voices[idx];
        voice.note = note;
        voice.carrier_phase = 0.0;
        voice.modulator_phase = 0.0;
        voice.carrier_env.reset();
        voice.modulator_env.reset();
        voice.filter.reset();
        voice.carrier_env.note_on();
        voice.modulator_env.note_on();
    }

    fn release(&mut self, note: u8) {
        for voice in self.voices.iter_mut().filter(|v| v.note == note && v.is_active()) {
            voice.carrier_env.note_off();
            voice.modulator_env.note_off();
        }
    }

    fn render(&mut self, output: &mut [f32]) {
        let sample_rate = self.sample_rate;
        let modulator_ratio = self.modulator_ratio;
        let modulation_index = self.modulation_index;
        let cutoff_hz = self.cutoff_hz;
        let resonance = self.resonance;
        let filter_env_amount = self.filter_env_amount;

        for sample in output.iter_mut() {
            let mut mix = 0.0f32;
            for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
                let carrier_freq = note_to_frequency(voice.note);
                let modulator_freq = carrier_freq * modulator_ratio;

                voice.modulator_phase = (voice.modulator_phase + modulator_freq / sample_rate) % 1.0;
                let modulator_env = voice.modulator_env.next_value();
                let modulator_out = (voice.modulator_phase * TAU).sin() * modulation_index * modulator_env;

                voice.carrier_phase = (voice.carrier_phase + carrier_freq / sample_rate) % 1.0;
                let raw = (voice.carrier_phase * TAU + modulator_out).sin();

                let env_cutoff = (cutoff_hz + filter_env_amount * modulator_env * 10_000.0)
                    .clamp(20.0, sample_rate * 0.49);
                let filtered = voice.filter.process(raw, env_cutoff, resonance, FilterMode::LowPass);
                mix += filtered * voice.carrier_env.next_value();
            }
            *sample = mix * 0.3;
        }
    }

    fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            param_ids::AMP_ATTACK => self.update_carrier(|s| s.attack_s = value),
            param_ids::AMP_DECAY => self.update_carrier(|s| s.decay_s = value),
            param_ids::AMP_SUSTAIN => self.update_carrier(|s| s.sustain = value),
            param_ids::AMP_RELEASE => self.update_carrier(|s| s.release_s = value),
            param_ids::FILTER_ATTACK => self.update_modulator(|s| s.attack_s = value),
            param_ids::FILTER_DECAY => self.update_modulator(|s| s.decay_s = value),
            param_ids::FILTER_SUSTAIN => self.update_modulator(|s| s.sustain = value),
            param_ids::FILTER_RELEASE => self.update_modulator(|s| s.release_s = value),
            param_ids::FILTER_CUTOFF => self.cutoff_hz = value.clamp(20.0, 20_000.0),
            param_ids::FILTER_RESONANCE => self.resonance = value.clamp(0.0, 0.99),
            param_ids::FILTER_ENV_AMOUNT => self.filter_env_amount = value,
            param_ids::ENGINE_SPECIFIC_START => self.modulator_ratio = value.clamp(0.1, 16.0),
            x if x == param_ids::ENGINE_SPECIFIC_START + 1 => self.modulation_index = value.clamp(0.0, 12.0),
            _ => {}
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.voices = (0..MAX_POLYPHONY).map(|_| Voice::new(sample_rate)).collect();
    }

    fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.carrier_env.note_off();
            voice.modulator_env.note_off();
        }
    }

    fn is_active(&self) -> bool {
        self.voices.iter().any(|v| v.is_active())
    }
}

impl FmEngine {
    fn update_carrier(&mut self, f: impl Fn(&mut AdsrSettings)) {
        for voice in self.voices.iter_mut() {
            let mut settings = voice.carrier_env.settings();
            f(&mut settings);
            voice.carrier_env.set_settings(settings);
        }
    }

    fn update_modulator(&mut self, f: impl Fn(&mut AdsrSettings)) {
        for voice in self.voices.iter_mut() {
            let mut settings = voice.modulator_env.settings();
            f(&mut settings);
            voice.modulator_env.set_settings(settings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_modulation_index_produces_more_high_frequency_energy() {
        let mut quiet = FmEngine::new(48_000.0);
        quiet.set_parameter(param_ids::ENGINE_SPECIFIC_START + 1, 0.0);
        quiet.trigger(69, 100, super::super::HELD_INDEFINITELY);

        let mut bright = FmEngine::new(48_000.0);
        bright.set_parameter(param_ids::ENGINE_SPECIFIC_START + 1, 8.0);
        bright.trigger(69, 100, super::super::HELD_INDEFINITELY);

        let mut buf_quiet = [0.0f32; 1024];
        let mut buf_bright = [0.0f32; 1024];
        quiet.render(&mut buf_quiet);
        bright.render(&mut buf_bright);

        let zero_crossings = |buf: &[f32]| buf.windows(2).filter(|w| w[0].signum() != w[1].signum()).count();
        assert!(zero_crossings(&buf_bright) >= zero_crossings(&buf_quiet));
    }

    #[test]
    fn all_notes_off_silences_engine() {
        let mut engine = FmEngine::new(48_000.0);
        engine.set_parameter(param_ids::AMP_RELEASE, 0.01);
        engine.trigger(60, 100, super::super::HELD_INDEFINITELY);
        engine.all_notes_off();
        let mut buf = [0.0f32; 512];
        for _ in 0..200 {
            engine.render(&mut buf);
        }
        assert!(!engine.is_active());
    }
}
