// src/engine/wavetable.rs

//! Wavetable playback: four fixed basic tables (sine/saw/square/triangle)
//! blended by a single morph position, through the shared ZDF filter with a
//! filter envelope. Grounded on the teacher's `wavetable_engine.rs` DSP
//! core, stripped of its UI atomics/egui visualizer plumbing and the
//! per-voice `rayon` parallel render (kept here, but driving a fixed
//! `VoiceProducer` param surface instead of `Arc<RwLock<..>>`-shared
//! settings).

use super::adsr::{Adsr, AdsrSettings};
use super::filter::{FilterMode, StateVariableFilter};
use super::{note_to_frequency, param_ids, VoiceProducer};
use crate::config::MAX_POLYPHONY;
use rayon::prelude::*;

const TABLE_SIZE: usize = 2048;

struct WavetableSet {
    tables: [Vec<f32>; 4],
}

impl WavetableSet {
    fn new_basic() -> Self {
        let sine: Vec<f32> = (0..TABLE_SIZE)
            .map(|i| (i as f32 / TABLE_SIZE as f32 * std::f32::consts::TAU).sin())
            .collect();
        let saw: Vec<f32> = (0..TABLE_SIZE)
            .map(|i| {
                let phase = i as f32 / TABLE_SIZE as f32;
                2.0 * (phase - (phase + 0.5).floor())
            })
            .collect();
        let square: Vec<f32> = (0..TABLE_SIZE)
            .map(|i| if i < TABLE_SIZE / 2 { 1.0 } else { -1.0 })
            .collect();
        let triangle: Vec<f32> = (0..TABLE_SIZE)
            .map(|i| {
                let phase = i as f32 / TABLE_SIZE as f32;
                (2.0 * phase - 1.0).abs() * 2.0 - 1.0
            })
            .collect();
        Self {
            tables: [sine, saw, square, triangle],
        }
    }

    fn sample(&self, morph_pos: f32, phase: f32) -> f32 {
        let morph_pos = morph_pos.clamp(0.0, 2.9999);
        let idx0 = morph_pos.floor() as usize;
        let idx1 = (idx0 + 1).min(3);
        let frac = morph_pos.fract();
        let s0 = Self::interpolated(&self.tables[idx0], phase);
        let s1 = Self::interpolated(&self.tables[idx1], phase);
        s0 * (1.0 - frac) + s1 * frac
    }

    fn interpolated(table: &[f32], phase: f32) -> f32 {
        let len = table.len();
        let wrapped = phase.rem_euclid(len as f32);
        let idx0 = wrapped.floor() as usize % len;
        let idx1 = (idx0 + 1) % len;
        let frac = wrapped.fract();
        table[idx0] * (1.0 - frac) + table[idx1] * frac
    }
}

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

pub struct WavetableEngine {
    sample_rate: f32,
    voices: Vec<Voice>,
    table_set: WavetableSet,
    morph_position: f32,
    cutoff_hz: f32,
    resonance: f32,
    filter_env_amount: f32,
    voice_outputs: Vec<Vec<f32>>,
}

impl WavetableEngine {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: (0..MAX_POLYPHONY).map(|_| Voice::new(sample_rate)).collect(),
            table_set: WavetableSet::new_basic(),
            morph_position: 0.0,
            cutoff_hz: 6000.0,
            resonance: 0.2,
            filter_env_amount: 0.0,
            voice_outputs: vec![Vec::new(); MAX_POLYPHONY],
        }
    }

    fn steal_voice(&mut self) -> usize {
        self.voices
            .iter()
            .position(|v| !v.is_active())
            .unwrap_or_else(|| {
                (0..self.voices.len())
                    .min_by_key(|&i| self.voices[i].amp_env.stage() as u8)
                    .unwrap_or(0)
            })
    }
}

impl VoiceProducer for WavetableEngine {
    fn trigger(&mut self, note: u8, _velocity: u8, _duration_samples: f64) {
        let idx = self.steal_voice();
        let voice = &mut self.voices[idx];
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
        let block_size = output.len();
        output.fill(0.0);

        if self.voice_outputs[0].len() != block_size {
            for buffer in &mut self.voice_outputs {
                buffer.resize(block_size, 0.0);
            }
        }

        let sample_rate = self.sample_rate;
        let morph_position = self.morph_position;
        let cutoff_hz = self.cutoff_hz;
        let resonance = self.resonance;
        let filter_env_amount = self.filter_env_amount;
        let table_set = &self.table_set;

        self.voices
            .par_iter_mut()
            .zip(self.voice_outputs.par_iter_mut())
            .for_each(|(voice, voice_output)| {
                if !voice.is_active() {
                    voice_output.fill(0.0);
                    return;
                }
                let freq = note_to_frequency(voice.note);
                for sample in voice_output.iter_mut().take(block_size) {
                    voice.phase += freq / sample_rate * TABLE_SIZE as f32;
                    if voice.phase >= TABLE_SIZE as f32 {
                        voice.phase -= TABLE_SIZE as f32;
                    }
                    let raw = table_set.sample(morph_position, voice.phase);
                    let env_cutoff =
                        (cutoff_hz + filter_env_amount * voice.filter_env.next_value() * 10_000.0)
                            .clamp(20.0, sample_rate * 0.49);
                    let filtered = voice.filter.process(raw, env_cutoff, resonance, FilterMode::LowPass);
                    *sample = filtered * voice.amp_env.next_value();
                }
            });

        for voice_output in &self.voice_outputs {
            for (out, voice_sample) in output.iter_mut().zip(voice_output.iter()) {
                *out += voice_sample * 0.3;
            }
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
            param_ids::ENGINE_SPECIFIC_START => self.morph_position = value.clamp(0.0, 3.0),
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

impl WavetableEngine {
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
    fn trigger_produces_signal_and_morph_changes_timbre() {
        let mut engine = WavetableEngine::new(48_000.0);
        engine.set_parameter(param_ids::AMP_RELEASE, 0.01);
        engine.trigger(69, 100, super::super::HELD_INDEFINITELY);
        let mut buf_sine = [0.0f32; 512];
        engine.render(&mut buf_sine);
        assert!(buf_sine.iter().any(|&s| s.abs() > 0.001));

        engine.set_parameter(param_ids::ENGINE_SPECIFIC_START, 1.0);
        let mut buf_saw = [0.0f32; 512];
        engine.render(&mut buf_saw);
        assert_ne!(buf_sine, buf_saw);
    }

    #[test]
    fn release_reaches_silence() {
        let mut engine = WavetableEngine::new(48_000.0);
        engine.set_parameter(param_ids::AMP_RELEASE, 0.01);
        engine.trigger(60, 100, super::super::HELD_INDEFINITELY);
        engine.release(60);
        let mut buf = [0.0f32; 512];
        for _ in 0..200 {
            engine.render(&mut buf);
        }
        assert!(!engine.is_active());
    }
}
