// src/engine/analog_drum.rs

//! Single-cycle analog-style drum synthesis: a pitch-sweeping sine for the
//! kick, filtered noise bursts for the snare/clap/hats/cymbal/perc/noise
//! lanes. Grounded on `original_source/engines/AnalogDrumEngine.h`'s
//! per-`DrumType` `render()` switch, simplified to one voice shape per
//! `DrumKind` instead of the original's hand-tuned per-type oscillator
//! banks (hat metallic-ring oscillators, clap multi-burst timer).

use super::filter::{FilterMode, StateVariableFilter};
use super::{param_ids, VoiceProducer};
use crate::config::MAX_POLYPHONY;
use std::f32::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrumKind {
    Kick,
    Snare,
    Clap,
    HiHatClosed,
    HiHatOpen,
    Cymbal,
    Perc,
    Noise,
}

impl DrumKind {
    fn from_note(note: u8) -> Self {
        match note % 8 {
            0 => DrumKind::Kick,
            1 => DrumKind::Snare,
            2 => DrumKind::Clap,
            3 => DrumKind::HiHatClosed,
            4 => DrumKind::HiHatOpen,
            5 => DrumKind::Cymbal,
            6 => DrumKind::Perc,
            _ => DrumKind::Noise,
        }
    }

    fn base_freq(self) -> f32 {
        match self {
            DrumKind::Kick => 55.0,
            DrumKind::Snare => 180.0,
            DrumKind::Clap => 900.0,
            DrumKind::HiHatClosed | DrumKind::HiHatOpen | DrumKind::Cymbal => 3000.0,
            DrumKind::Perc => 400.0,
            DrumKind::Noise => 0.0,
        }
    }

    fn decay_s(self) -> f32 {
        match self {
            DrumKind::Kick => 0.35,
            DrumKind::Snare => 0.18,
            DrumKind::Clap => 0.22,
            DrumKind::HiHatClosed => 0.06,
            DrumKind::HiHatOpen => 0.4,
            DrumKind::Cymbal => 0.8,
            DrumKind::Perc => 0.15,
            DrumKind::Noise => 0.25,
        }
    }

    fn tone_mix(self) -> f32 {
        match self {
            DrumKind::Kick => 1.0,
            DrumKind::Snare => 0.4,
            DrumKind::Clap | DrumKind::Noise => 0.0,
            DrumKind::HiHatClosed | DrumKind::HiHatOpen | DrumKind::Cymbal => 0.15,
            DrumKind::Perc => 0.6,
        }
    }
}

struct NoiseGenerator {
    seed: u32,
}

impl NoiseGenerator {
    fn new(seed: u32) -> Self {
        Self { seed }
    }

    fn next(&mut self) -> f32 {
        self.seed = self.seed.wrapping_mul(196_314_165).wrapping_add(907_633_515);
        (self.seed as i32) as f32 * 4.656_612_9e-10
    }
}

struct Voice {
    note: u8,
    active: bool,
    kind: DrumKind,
    phase: f32,
    frequency: f32,
    envelope: f32,
    decay_rate: f32,
    noise: NoiseGenerator,
    filter: StateVariableFilter,
}

impl Voice {
    fn new(sample_rate: f32, seed: u32) -> Self {
        Self {
            note: 0,
            active: false,
            kind: DrumKind::Kick,
            phase: 0.0,
            frequency: 55.0,
            envelope: 0.0,
            decay_rate: 1.0 / (0.3 * sample_rate),
            noise: NoiseGenerator::new(seed),
            filter: StateVariableFilter::new(sample_rate),
        }
    }
}

pub struct AnalogDrumEngine {
    sample_rate: f32,
    voices: Vec<Voice>,
    tone: f32,
    punch: f32,
    decay_scale: f32,
}

impl AnalogDrumEngine {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: (0..MAX_POLYPHONY)
                .map(|i| Voice::new(sample_rate, 22_222 + i as u32 * 7919))
                .collect(),
            tone: 0.5,
            punch: 0.5,
            decay_scale: 1.0,
        }
    }

    fn steal_voice(&mut self) -> usize {
        self.voices.iter().position(|v| !v.active).unwrap_or(0)
    }
}

impl VoiceProducer for AnalogDrumEngine {
    fn trigger(&mut self, note: u8, velocity: u8, _duration_samples: f64) {
        let idx = self.steal_voice();
        let kind = DrumKind::from_note(note);
        let punch_mult = 2.0 + self.punch * 6.0;
        let velocity_gain = velocity as f32 / 127.0;
        let decay_scale = self.decay_scale;
        let sample_rate = self.sample_rate;

        let voice = &mut self.voices[idx];
        voice.note = note;
        voice.active = true;
        voice.kind = kind;
        voice.phase = 0.0;
        voice.frequency = if kind == DrumKind::Kick {
            kind.base_freq() * punch_mult
        } else {
            kind.base_freq()
        };
        voice.decay_rate = 1.0 / (kind.decay_s() * decay_scale.max(0.05) * sample_rate);
        voice.envelope = velocity_gain;
        voice.filter.reset();
    }

    fn release(&mut self, _note: u8) {
        // Analog drum voices are one-shots: release is a no-op, matching the
        // original engine's envelope-only-decays-to-zero behavior.
    }

    fn render(&mut self, output: &mut [f32]) {
        let tone = self.tone;
        let sample_rate = self.sample_rate;

        for sample in output.iter_mut() {
            let mut mix = 0.0f32;
            for voice in self.voices.iter_mut().filter(|v| v.active) {
                voice.envelope -= voice.decay_rate;
                if voice.envelope <= 0.0 {
                    voice.active = false;
                    continue;
                }

                let target_freq = if voice.kind == DrumKind::Kick {
                    voice.kind.base_freq()
                } else {
                    voice.frequency
                };
                if voice.kind == DrumKind::Kick {
                    voice.frequency += (target_freq - voice.frequency) * (0.002 + (1.0 - tone) * 0.005);
                }
                voice.phase = (voice.phase + voice.frequency / sample_rate) % 1.0;

                let tonal = (voice.phase * TAU).sin();
                let noise = voice.noise.next();
                let raw = tonal * voice.kind.tone_mix() + noise * (1.0 - voice.kind.tone_mix());

                let cutoff = match voice.kind {
                    DrumKind::HiHatClosed | DrumKind::HiHatOpen | DrumKind::Cymbal => {
                        4000.0 + tone * 10_000.0
                    }
                    _ => 200.0 + tone * 8000.0,
                };
                let filtered = voice.filter.process(raw, cutoff.clamp(20.0, sample_rate * 0.49), 0.2, FilterMode::LowPass);

                mix += filtered * voice.envelope;
            }
            *sample = mix * 0.6;
        }
    }

    fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            param_ids::ANALOG_DRUM_START => self.tone = value.clamp(0.0, 1.0),
            x if x == param_ids::ANALOG_DRUM_START + 1 => self.punch = value.clamp(0.0, 1.0),
            x if x == param_ids::ANALOG_DRUM_START + 2 => self.decay_scale = value.clamp(0.1, 4.0),
            _ => {}
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.voices = (0..MAX_POLYPHONY)
            .map(|i| Voice::new(sample_rate, 22_222 + i as u32 * 7919))
            .collect();
    }

    fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.active = false;
        }
    }

    fn is_active(&self) -> bool {
        self.voices.iter().any(|v| v.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kick_trigger_produces_a_decaying_thump() {
        let mut engine = AnalogDrumEngine::new(48_000.0);
        engine.trigger(0, 127, 0.0);
        let mut buf = [0.0f32; 2048];
        engine.render(&mut buf);
        assert!(buf.iter().any(|&s| s.abs() > 0.01));
    }

    #[test]
    fn voice_self_terminates_without_release() {
        let mut engine = AnalogDrumEngine::new(48_000.0);
        engine.trigger(3, 100, 0.0);
        let mut buf = [0.0f32; 4096];
        for _ in 0..10 {
            engine.render(&mut buf);
        }
        assert!(!engine.is_active());
    }

    #[test]
    fn different_notes_select_different_drum_kinds() {
        assert_eq!(DrumKind::from_note(0), DrumKind::Kick);
        assert_eq!(DrumKind::from_note(3), DrumKind::HiHatClosed);
        assert_eq!(DrumKind::from_note(8), DrumKind::Kick);
    }
}
