// src/engine/subtractive.rs

//! A simple subtractive voice: band-limited sawtooth oscillator through the
//! shared state-variable filter, with independent amp/filter envelopes.
//! Grounded on `synth.rs`'s oscillator/filter/ADSR wiring, simplified to a
//! single oscillator per voice (the spec's Subtractive engine is
//! deliberately the plainest of the eight kinds).

use super::adsr::{Adsr, AdsrSettings};
use super::filter::{FilterMode, StateVariableFilter};
use super::{note_to_frequency, param_ids, VoiceProducer};
use crate::config::MAX_POLYPHONY;
use std::f32::consts::PI;

struct Voice {
    note: u8,
    phase: f32,
    amp_env: Adsr,
    filter_env: Adsr,
    filter: StateVariableFilter,
}

impl Voice {
    fn new(sample_rate: f32) -> Self {
        Self {
            note: 0,
            phase: 0.0,
            amp_env: Adsr::new(sample_rate),
            filter_env: Adsr::new(sample_rate),
            filter: StateVariableFilter::new(sample_rate),
        }
    }

    fn is_active(&self) -> bool {
        self.amp_env.is_active()
    }
}

pub struct SubtractiveEngine {
    sample_rate: f32,
    voices: Vec<Voice>,
    cutoff_hz: f32,
    resonance: f32,
    filter_env_amount: f32,
}

impl SubtractiveEngine {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: (0..MAX_POLYPHONY).map(|_| Voice::new(sample_rate)).collect(),
            cutoff_hz: 8000.0,
            resonance: 0.2,
            filter_env_amount: 0.0,
        }
    }

    fn steal_voice(&mut self) -> &mut Voice {
        if let Some(idx) = self.voices.iter().position(|v| !v.is_active()) {
            return &mut self.voices[idx];
        }
        // No free voice: steal the one closest to finishing release.
        let idx = (0..self.voices.len())
            .min_by(|&a, &b| {
                self.voices[a]
                    .amp_env
                    .stage()
                    .cmp_priority()
                    .cmp(&self.voices[b].amp_env.stage().cmp_priority())
            })
            .unwrap_or(0);
        &mut self.voices[idx]
    }

    fn saw(phase: f32) -> f32 {
        2.0 * (phase - (phase + 0.5).floor())
    }
}

impl super::adsr::AdsrStage {
    fn cmp_priority(self) -> u8 {
        match self {
            super::adsr::AdsrStage::Idle => 0,
            super::adsr::AdsrStage::Release => 1,
            super::adsr::AdsrStage::Decay => 2,
            super::adsr::AdsrStage::Sustain => 3,
            super::adsr::AdsrStage::Attack => 4,
        }
    }
}

impl VoiceProducer for SubtractiveEngine {
    fn trigger(&mut self, note: u8, _velocity: u8, _duration_samples: f64) {
        let voice = self.steal_voice();
        voice.note = note;
        voice.phase = 0.0;
        voice.amp_env.reset();
        voice.filter_env.reset();
        voice.filter.reset();
        voice.amp_env.note_on();
        voice.filter_env.note_on();
    }

    fn release(&mut self, note: u8) {
        for voice in self.voices.iter_mut().filter(|v| v.note == note && v.is_active()) {
            voice.amp_env.note_off();
            voice.filter_env.note_off();
        }
    }

    fn render(&mut self, output: &mut [f32]) {
        let sample_rate = self.sample_rate;
        let cutoff_hz = self.cutoff_hz;
        let resonance = self.resonance;
        let filter_env_amount = self.filter_env_amount;
        for sample in output.iter_mut() {
            let mut mix = 0.0f32;
            for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
                let freq = note_to_frequency(voice.note);
                voice.phase += freq / sample_rate;
                if voice.phase >= 1.0 {
                    voice.phase -= 1.0;
                }
                let raw = Self::saw(voice.phase);
                let env_cutoff = (cutoff_hz + filter_env_amount * voice.filter_env.next_value() * 10_000.0)
                    .clamp(20.0, sample_rate * 0.49);
                let filtered = voice.filter.process(raw, env_cutoff, resonance, FilterMode::LowPass);
                mix += filtered * voice.amp_env.next_value();
            }
            *sample = mix * 0.25;
        }
    }

    fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            param_ids::AMP_ATTACK => self.update_amp(|s| s.attack_s = value),
            param_ids::AMP_DECAY => self.update_amp(|s| s.decay_s = value),
            param_ids::AMP_SUSTAIN => self.update_amp(|s| s.sustain = value),
            param_ids::AMP_RELEASE => self.update_amp(|s| s.release_s = value),
            param_ids::FILTER_ATTACK => self.update_filter_env(|s| s.attack_s = value),
            param_ids::FILTER_DECAY => self.update_filter_env(|s| s.decay_s = value),
            param_ids::FILTER_SUSTAIN => self.update_filter_env(|s| s.sustain = value),
            param_ids::FILTER_RELEASE => self.update_filter_env(|s| s.release_s = value),
            param_ids::FILTER_CUTOFF => self.cutoff_hz = value.clamp(20.0, 20_000.0),
            param_ids::FILTER_RESONANCE => self.resonance = value.clamp(0.0, 0.99),
            param_ids::FILTER_ENV_AMOUNT => self.filter_env_amount = value,
            _ => {}
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.voices = (0..MAX_POLYPHONY).map(|_| Voice::new(sample_rate)).collect();
    }

    fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.amp_env.note_off();
            voice.filter_env.note_off();
        }
    }

    fn is_active(&self) -> bool {
        self.voices.iter().any(|v| v.is_active())
    }
}

impl SubtractiveEngine {
    fn update_amp(&mut self, f: impl Fn(&mut AdsrSettings)) {
        for voice in self.voices.iter_mut() {
            let mut settings = voice.amp_env.settings();
            f(&mut settings);
            voice.amp_env.set_settings(settings);
        }
    }

    fn update_filter_env(&mut self, f: impl Fn(&mut AdsrSettings)) {
        for voice in self.voices.iter_mut() {
            let mut settings = voice.filter_env.settings();
            f(&mut settings);
            voice.filter_env.set_settings(settings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_produces_nonzero_signal_then_decays_to_silence() {
        let mut engine = SubtractiveEngine::new(48_000.0);
        engine.set_parameter(param_ids::AMP_RELEASE, 0.01);
        engine.trigger(69, 100, super::super::HELD_INDEFINITELY);
        let mut buf = [0.0f32; 512];
        engine.render(&mut buf);
        assert!(buf.iter().any(|&s| s.abs() > 0.001));

        engine.release(69);
        for _ in 0..200 {
            engine.render(&mut buf);
        }
        assert!(!engine.is_active());
    }
}
