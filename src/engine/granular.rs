// src/engine/granular.rs

//! A grain cloud over a loaded sample buffer: short overlapping grains at a
//! fixed spawn rate, each with a triangular attack/decay window, random
//! jitter on start position and a playback-rate knob. Grounded on
//! `original_source/engines/GranularEngine.h`'s `Grain`/spawn-scheduler
//! design, simplified from cubic-Hermite interpolation and per-grain stereo
//! offsets to linear interpolation and a mono grain cloud (the voice
//! producer interface is mono per spec §4.1).

use super::{param_ids, VoiceProducer};
use crate::config::MAX_POLYPHONY;
use std::sync::Arc;

const MAX_GRAINS_PER_VOICE: usize = 12;

#[derive(Clone, Copy)]
struct Grain {
    position: f32,
    speed: f32,
    life: u32,
    initial_life: u32,
    active: bool,
}

impl Default for Grain {
    fn default() -> Self {
        Self {
            position: 0.0,
            speed: 1.0,
            life: 0,
            initial_life: 1,
            active: false,
        }
    }
}

impl Grain {
    fn envelope(&self) -> f32 {
        let progress = 1.0 - (self.life as f32 / self.initial_life.max(1) as f32);
        if progress < 0.1 {
            progress / 0.1
        } else if progress > 0.9 {
            (1.0 - progress) / 0.1
        } else {
            1.0
        }
    }

    fn next_sample(&mut self, source: &[f32]) -> f32 {
        if !self.active || source.is_empty() {
            return 0.0;
        }
        let len = source.len();
        let idx = self.position as usize % len;
        let frac = self.position.fract();
        let next_idx = (idx + 1) % len;
        let raw = source[idx] * (1.0 - frac) + source[next_idx] * frac;

        let out = raw * self.envelope();
        self.position = (self.position + self.speed).rem_euclid(len as f32);
        self.life = self.life.saturating_sub(1);
        if self.life == 0 {
            self.active = false;
        }
        out
    }
}

struct Voice {
    note: u8,
    active: bool,
    grains: [Grain; MAX_GRAINS_PER_VOICE],
    spawn_countdown_samples: u32,
    playhead: f32,
    amp: f32,
}

impl Voice {
    fn new() -> Self {
        Self {
            note: 0,
            active: false,
            grains: [Grain::default(); MAX_GRAINS_PER_VOICE],
            spawn_countdown_samples: 0,
            playhead: 0.0,
            amp: 0.0,
        }
    }
}

pub struct GranularEngine {
    sample_rate: f32,
    voices: Vec<Voice>,
    sample: Arc<Vec<f32>>,
    grain_size_samples: u32,
    grain_spawn_interval_samples: u32,
    position_jitter: f32,
    playback_rate: f32,
}

impl GranularEngine {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: (0..MAX_POLYPHONY).map(|_| Voice::new()).collect(),
            sample: Arc::new(Vec::new()),
            grain_size_samples: (sample_rate * 0.08) as u32,
            grain_spawn_interval_samples: (sample_rate * 0.02) as u32,
            position_jitter: 0.01,
            playback_rate: 1.0,
        }
    }

    pub fn load_sample(&mut self, audio: Arc<Vec<f32>>) {
        self.sample = audio;
    }

    fn steal_voice(&mut self) -> usize {
        self.voices
            .iter()
            .position(|v| !v.active)
            .unwrap_or(0)
    }

    fn spawn_grain(&mut self, voice_idx: usize) {
        if self.sample.is_empty() {
            return;
        }
        let sample_len = self.sample.len() as f32;
        let jitter = (rand::random::<f32>() * 2.0 - 1.0) * self.position_jitter * sample_len;
        let voice = &mut self.voices[voice_idx];
        let slot = voice.grains.iter().position(|g| !g.active).unwrap_or(0);
        voice.grains[slot] = Grain {
            position: (voice.playhead + jitter).rem_euclid(sample_len),
            speed: self.playback_rate,
            life: self.grain_size_samples,
            initial_life: self.grain_size_samples.max(1),
            active: true,
        };
    }
}

impl VoiceProducer for GranularEngine {
    fn trigger(&mut self, note: u8, velocity: u8, _duration_samples: f64) {
        if self.sample.is_empty() {
            return;
        }
        let idx = self.steal_voice();
        let voice = &mut self.voices[idx];
        voice.note = note;
        voice.active = true;
        voice.playhead = 0.0;
        voice.amp = velocity as f32 / 127.0;
        voice.spawn_countdown_samples = 0;
        for grain in voice.grains.iter_mut() {
            grain.active = false;
        }
    }

    fn release(&mut self, note: u8) {
        for voice in self.voices.iter_mut().filter(|v| v.note == note && v.active) {
            voice.active = false;
        }
    }

    fn render(&mut self, output: &mut [f32]) {
        let spawn_interval = self.grain_spawn_interval_samples.max(1);
        for sample in output.iter_mut() {
            let mut mix = 0.0f32;
            for voice_idx in 0..self.voices.len() {
                if !self.voices[voice_idx].active {
                    continue;
                }
                if self.voices[voice_idx].spawn_countdown_samples == 0 {
                    self.spawn_grain(voice_idx);
                    self.voices[voice_idx].spawn_countdown_samples = spawn_interval;
                } else {
                    self.voices[voice_idx].spawn_countdown_samples -= 1;
                }

                let sample_ref = &self.sample;
                let voice = &mut self.voices[voice_idx];
                let mut voice_out = 0.0f32;
                for grain in voice.grains.iter_mut() {
                    voice_out += grain.next_sample(sample_ref);
                }
                mix += voice_out * voice.amp;
            }
            *sample = mix * 0.5;
        }
    }

    fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            param_ids::GRANULAR_START => {
                self.grain_size_samples = (value.clamp(1.0, 500.0) * 0.001 * self.sample_rate) as u32
            }
            x if x == param_ids::GRANULAR_START + 1 => {
                self.grain_spawn_interval_samples = (value.clamp(1.0, 200.0) * 0.001 * self.sample_rate) as u32
            }
            x if x == param_ids::GRANULAR_START + 2 => self.position_jitter = value.clamp(0.0, 1.0),
            x if x == param_ids::GRANULAR_START + 3 => self.playback_rate = value.clamp(-4.0, 4.0),
            _ => {}
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
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
    fn silent_with_no_sample_loaded() {
        let mut engine = GranularEngine::new(48_000.0);
        engine.trigger(60, 100, 0.0);
        let mut buf = [0.0f32; 512];
        engine.render(&mut buf);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn produces_sound_from_loaded_sample() {
        let mut engine = GranularEngine::new(48_000.0);
        let data: Vec<f32> = (0..4800).map(|i| (i as f32 * 0.05).sin()).collect();
        engine.load_sample(Arc::new(data));
        engine.trigger(60, 127, 0.0);
        let mut total = 0.0;
        let mut buf = [0.0f32; 512];
        for _ in 0..10 {
            engine.render(&mut buf);
            total += buf.iter().map(|s| s.abs()).sum::<f32>();
        }
        assert!(total > 0.0);
    }

    #[test]
    fn release_eventually_silences_voice() {
        let mut engine = GranularEngine::new(48_000.0);
        let data: Vec<f32> = (0..4800).map(|i| (i as f32 * 0.05).sin()).collect();
        engine.load_sample(Arc::new(data));
        engine.trigger(60, 127, 0.0);
        engine.release(60);
        assert!(!engine.is_active());
    }
}
