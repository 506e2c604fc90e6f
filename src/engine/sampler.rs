// src/engine/sampler.rs

//! One-shot/sustain/chopped sample playback. Grounded on the teacher's
//! `sampler_engine.rs` multi-voice shape (per-voice ADSR + filter, tail
//! fade-out) and on `original_source/engines/SamplerEngine.h` for play-mode
//! and chop/slice semantics: `PlayMode::{OneShot,Sustain,Chops}`, slice
//! regions built from fractional slice points, and `triggerNote`'s Chops
//! branch (fixed pitch, `note - 60` cycled modulo the slice count). OneShot
//! and Sustain instead track pitch relative to `note_to_frequency`'s A440
//! root, hence the two separate root-note constants below rather than one
//! shared root.

use super::adsr::{Adsr, AdsrSettings};
use super::filter::{FilterMode, StateVariableFilter};
use super::{note_to_frequency, param_ids, VoiceProducer, HELD_INDEFINITELY};
use crate::config::MAX_POLYPHONY;
use std::sync::Arc;

/// Chop-index root: `Chops` mode maps note 60 to slice 0, matching
/// `SamplerEngine.h`'s "Map Note 60 -> Slice 0" comment and its hardcoded
/// `note - 60` in `triggerNote`.
const SLICE_ROOT_NOTE: u8 = 60;

/// Pitch-tracking root for `OneShot`/`Sustain`: the note that plays a loaded
/// sample back at its native rate. Kept aligned with [`note_to_frequency`]'s
/// own A440 reference (note 69) rather than the original's hardcoded 60, so
/// that a loaded sample's native pitch maps to the note most listeners would
/// expect (and so that triggering note 69 with the pitch parameter at its
/// midpoint reproduces a loaded tone untransposed).
const PITCH_ROOT_NOTE: u8 = 69;

/// Grounded on `SamplerEngine::PlayMode`: `OneShot` and `Sustain` play the
/// loop region with note-relative pitch tracking, `Sustain` looping back to
/// the region start instead of releasing at the end. `Chops` ignores note
/// pitch entirely and instead selects one of the loaded slices by note,
/// playing it back at a fixed rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    OneShot,
    Sustain,
    Chops,
}

struct Voice {
    note: u8,
    phase: f64,
    start: f64,
    end: f64,
    pitch_ratio: f64,
    amp_env: Adsr,
    filter_env: Adsr,
    filter: StateVariableFilter,
}

impl Voice {
    fn new(sample_rate: f32) -> Self {
        Self {
            note: 0,
            phase: 0.0,
            start: 0.0,
            end: 0.0,
            pitch_ratio: 1.0,
            amp_env: Adsr::new(sample_rate),
            filter_env: Adsr::new(sample_rate),
            filter: StateVariableFilter::new(sample_rate),
        }
    }

    fn is_active(&self) -> bool {
        self.amp_env.is_active()
    }
}

pub struct SamplerEngine {
    sample_rate: f32,
    voices: Vec<Voice>,
    sample: Arc<Vec<f32>>,
    sample_rate_of_source: u32,
    play_mode: PlayMode,
    /// Fractional (`[0,1]`) slice start markers, grounded on
    /// `SamplerEngine::setSlicePoints`: slice `i` spans `[points[i],
    /// points[i+1])`, the last spanning to the buffer end.
    slice_points: Vec<f32>,
    loop_start_frac: f32,
    loop_end_frac: f32,
    /// Continuous pitch-shift in semitones, composed on top of (not instead
    /// of) note-relative pitch tracking. Grounded on `AudioEngine.cpp`'s
    /// `case 300: mPitch = (value - 0.5) * 48.0`.
    pitch_semitones: f32,
    cutoff_hz: f32,
    resonance: f32,
    filter_env_amount: f32,
    fade_out_frac: f32,
}

impl SamplerEngine {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: (0..MAX_POLYPHONY).map(|_| Voice::new(sample_rate)).collect(),
            sample: Arc::new(Vec::new()),
            sample_rate_of_source: sample_rate as u32,
            play_mode: PlayMode::OneShot,
            slice_points: Vec::new(),
            loop_start_frac: 0.0,
            loop_end_frac: 1.0,
            pitch_semitones: 0.0,
            cutoff_hz: 20_000.0,
            resonance: 0.1,
            filter_env_amount: 0.0,
            fade_out_frac: 0.01,
        }
    }

    pub fn load_sample(&mut self, audio: Arc<Vec<f32>>, sample_rate: u32, slice_points: Vec<f32>) {
        self.sample = audio;
        self.sample_rate_of_source = sample_rate.max(1);
        self.slice_points = slice_points;
    }

    pub fn is_chops_mode(&self) -> bool {
        self.play_mode == PlayMode::Chops
    }

    /// Start/end sample-frame bounds of slice `index`, grounded on
    /// `setSlicePoints`'s region-building loop.
    fn slice_bounds(&self, index: usize) -> Option<(f64, f64)> {
        let len = self.sample.len() as f64;
        let &start_frac = self.slice_points.get(index)?;
        let end_frac = self.slice_points.get(index + 1).copied().unwrap_or(1.0);
        let start = start_frac as f64 * len;
        let end = end_frac as f64 * len;
        (start < end).then_some((start, end))
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

    fn interpolated(&self, phase: f64) -> f32 {
        let len = self.sample.len();
        if len < 2 {
            return self.sample.first().copied().unwrap_or(0.0);
        }
        let idx0 = phase.floor() as usize;
        if idx0 + 1 >= len {
            return self.sample[len - 1];
        }
        let frac = (phase - idx0 as f64) as f32;
        self.sample[idx0] * (1.0 - frac) + self.sample[idx0 + 1] * frac
    }

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

impl VoiceProducer for SamplerEngine {
    fn trigger(&mut self, note: u8, _velocity: u8, _duration_samples: f64) {
        if self.sample.is_empty() {
            return;
        }
        let idx = self.steal_voice();
        let len = self.sample.len() as f64;

        let (start, end) = if self.play_mode == PlayMode::Chops && !self.slice_points.is_empty() {
            let raw_index = if note >= SLICE_ROOT_NOTE { (note - SLICE_ROOT_NOTE) as usize } else { 0 };
            let slice_index = raw_index % self.slice_points.len();
            self.slice_bounds(slice_index).unwrap_or((0.0, len))
        } else {
            (
                self.loop_start_frac.clamp(0.0, 1.0) as f64 * len,
                self.loop_end_frac.clamp(0.0, 1.0) as f64 * len,
            )
        };

        // Chops mode plays every slice at a fixed rate; the other two modes
        // track the triggered note relative to `PITCH_ROOT_NOTE`.
        let note_ratio = if self.play_mode == PlayMode::Chops {
            1.0
        } else {
            (note_to_frequency(note) / note_to_frequency(PITCH_ROOT_NOTE)) as f64
        };
        let pitch_shift_ratio = 2f64.powf(self.pitch_semitones as f64 / 12.0);
        let pitch_ratio =
            note_ratio * pitch_shift_ratio * (self.sample_rate_of_source as f64 / self.sample_rate as f64);

        let voice = &mut self.voices[idx];
        voice.note = note;
        voice.start = start;
        voice.end = end.max(start + 1.0);
        voice.phase = start;
        voice.pitch_ratio = pitch_ratio;
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
        output.fill(0.0);
        if self.sample.is_empty() {
            return;
        }

        let fade_out_samples = (self.sample.len() as f32 * self.fade_out_frac.clamp(0.0, 0.5)) as f64;
        let cutoff_hz = self.cutoff_hz;
        let resonance = self.resonance;
        let filter_env_amount = self.filter_env_amount;
        let sample_rate = self.sample_rate;
        // Only `Sustain` loops back to the region start; `OneShot` and
        // `Chops` release once they reach the end of their region.
        let loops = self.play_mode == PlayMode::Sustain;

        for frame in output.iter_mut() {
            let mut mix = 0.0f32;
            for voice_idx in 0..self.voices.len() {
                if !self.voices[voice_idx].is_active() {
                    continue;
                }
                let raw = self.interpolated(self.voices[voice_idx].phase);

                let mut fade_gain = 1.0f32;
                let region_end = self.voices[voice_idx].end;
                let fade_start = (region_end - fade_out_samples).max(self.voices[voice_idx].start);
                if self.voices[voice_idx].phase >= fade_start && fade_out_samples > 0.0 {
                    let into_fade = (self.voices[voice_idx].phase - fade_start) as f32;
                    fade_gain = (1.0 - into_fade / fade_out_samples as f32).clamp(0.0, 1.0);
                }

                let voice = &mut self.voices[voice_idx];
                let env_cutoff = (cutoff_hz + filter_env_amount * voice.filter_env.next_value() * 10_000.0)
                    .clamp(20.0, sample_rate * 0.49);
                let filtered = voice.filter.process(raw, env_cutoff, resonance, FilterMode::LowPass);
                mix += filtered * voice.amp_env.next_value() * fade_gain;

                voice.phase += voice.pitch_ratio;
                if voice.phase >= voice.end {
                    if loops {
                        voice.phase = voice.start + (voice.phase - voice.end);
                    } else {
                        voice.amp_env.reset();
                    }
                }
            }
            *frame = mix * 0.7;
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
            // PITCH: continuous, 0.5 == no transpose, +/-24 semitones at the
            // extremes, composed with note-relative pitch tracking (not
            // replacing it).
            param_ids::SAMPLER_START => self.pitch_semitones = (value - 0.5) * 48.0,
            x if x == param_ids::SAMPLER_START + 1 => self.loop_start_frac = value.clamp(0.0, 1.0),
            x if x == param_ids::SAMPLER_START + 2 => self.loop_end_frac = value.clamp(0.0, 1.0),
            x if x == param_ids::SAMPLER_START + 3 => self.fade_out_frac = value.clamp(0.0, 0.5),
            // PLAY MODE: 0.0-0.33 OneShot, 0.33-0.66 Sustain, 0.66-1.0
            // Chops, grounded on `setParameter`'s `case 320`.
            x if x == param_ids::SAMPLER_START + 4 => {
                self.play_mode = match ((value * 3.0) as i32).max(0) {
                    0 => PlayMode::OneShot,
                    1 => PlayMode::Sustain,
                    _ => PlayMode::Chops,
                };
            }
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

    fn is_chops_mode(&self) -> bool {
        self.play_mode == PlayMode::Chops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_sample(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| (i as f32 * 0.05).sin()).collect()
    }

    #[test]
    fn silent_with_no_sample_loaded() {
        let mut engine = SamplerEngine::new(48_000.0);
        engine.trigger(60, 100, HELD_INDEFINITELY);
        let mut buf = [0.0f32; 256];
        engine.render(&mut buf);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn plays_loaded_sample_at_root_note() {
        let mut engine = SamplerEngine::new(48_000.0);
        engine.load_sample(Arc::new(sine_sample(4800)), 48_000, Vec::new());
        engine.trigger(PITCH_ROOT_NOTE, 100, HELD_INDEFINITELY);
        let mut buf = [0.0f32; 512];
        engine.render(&mut buf);
        assert!(buf.iter().any(|&s| s.abs() > 0.001));
    }

    #[test]
    fn sustain_mode_keeps_voice_active_past_sample_end() {
        let mut engine = SamplerEngine::new(48_000.0);
        engine.load_sample(Arc::new(sine_sample(200)), 48_000, Vec::new());
        engine.set_parameter(param_ids::SAMPLER_START + 4, 0.5); // Sustain
        engine.set_parameter(param_ids::AMP_SUSTAIN, 1.0);
        engine.set_parameter(param_ids::AMP_RELEASE, 5.0);
        engine.trigger(60, 100, HELD_INDEFINITELY);
        let mut buf = [0.0f32; 1024];
        for _ in 0..10 {
            engine.render(&mut buf);
        }
        assert!(engine.is_active());
    }

    #[test]
    fn pitch_parameter_at_one_half_leaves_pitch_untransposed() {
        // Spec §8 scenario 6: parameter 300 at 0.5 means "no transpose".
        let mut a = SamplerEngine::new(48_000.0);
        a.load_sample(Arc::new(sine_sample(4800)), 48_000, Vec::new());
        a.trigger(69, 100, HELD_INDEFINITELY);

        let mut b = SamplerEngine::new(48_000.0);
        b.load_sample(Arc::new(sine_sample(4800)), 48_000, Vec::new());
        b.set_parameter(param_ids::SAMPLER_START, 0.5);
        b.trigger(69, 100, HELD_INDEFINITELY);

        assert_eq!(a.voices[0].pitch_ratio, b.voices[0].pitch_ratio);
    }

    #[test]
    fn pitch_parameter_transposes_on_top_of_note_tracking() {
        // +24 semitones (value = 1.0) doubles the resampling rate on top of
        // whatever the triggered note's own ratio already was.
        let mut plain = SamplerEngine::new(48_000.0);
        plain.load_sample(Arc::new(sine_sample(4800)), 48_000, Vec::new());
        plain.trigger(60, 100, HELD_INDEFINITELY);

        let mut shifted = SamplerEngine::new(48_000.0);
        shifted.load_sample(Arc::new(sine_sample(4800)), 48_000, Vec::new());
        shifted.set_parameter(param_ids::SAMPLER_START, 1.0);
        shifted.trigger(60, 100, HELD_INDEFINITELY);

        assert!((shifted.voices[0].pitch_ratio / plain.voices[0].pitch_ratio - 4.0).abs() < 1e-6);
    }

    #[test]
    fn chops_mode_selects_slice_by_note_and_ignores_pitch_tracking() {
        let mut engine = SamplerEngine::new(48_000.0);
        engine.load_sample(Arc::new(sine_sample(4000)), 48_000, vec![0.0, 0.25, 0.5, 0.75]);
        engine.set_parameter(param_ids::SAMPLER_START + 4, 1.0); // Chops

        engine.trigger(61, 100, HELD_INDEFINITELY);
        let voice = engine.voices.iter().find(|v| v.is_active()).unwrap();
        assert_eq!(voice.start, 1000.0);
        assert_eq!(voice.end, 2000.0);
        assert_eq!(voice.pitch_ratio, 1.0);
    }

    #[test]
    fn chops_mode_cycles_slice_index_modulo_slice_count() {
        let mut engine = SamplerEngine::new(48_000.0);
        engine.load_sample(Arc::new(sine_sample(4000)), 48_000, vec![0.0, 0.5]);
        engine.set_parameter(param_ids::SAMPLER_START + 4, 1.0); // Chops

        // note 62 -> raw index 2, cycled modulo 2 slices -> slice 0.
        engine.trigger(62, 100, HELD_INDEFINITELY);
        let voice = engine.voices.iter().find(|v| v.is_active()).unwrap();
        assert_eq!(voice.start, 0.0);
        assert_eq!(voice.end, 2000.0);
    }

    #[test]
    fn is_chops_mode_reflects_play_mode() {
        let mut engine = SamplerEngine::new(48_000.0);
        assert!(!engine.is_chops_mode());
        engine.set_parameter(param_ids::SAMPLER_START + 4, 1.0);
        assert!(engine.is_chops_mode());
    }
}
