// src/track.rs

//! One of the orchestrator's 8 fixed tracks: engine, parameter table,
//! sequencer + 16 drum lanes, arpeggiator, microtiming scheduler, send
//! amounts, and the per-track bookkeeping (active-note timers, envelope
//! follower, silence counter, punch boost) the spec's §3 data model and
//! §4.8 callback steps describe. Grounded on `original_source/AudioEngine.h`'s
//! `Track` struct.

use crate::config::{
    MAX_ACTIVE_NOTES, NUM_FX_SLOTS, NUM_DRUM_LANES, NUM_PARAMETERS, PUNCH_FRAMES, SILENCE_SLEEP_FRAMES,
};
use crate::engine::{Engine, EngineKind, VoiceProducer};
use crate::limiter::soft_clip;
use crate::engine::envelope_follower::EnvelopeFollower;
use crate::sequencer::arpeggiator::Arpeggiator;
use crate::sequencer::scheduler::{FiredNote, Scheduler};
use crate::sequencer::Sequencer;
use std::sync::Arc;

/// A one-pole smoother for volume/send parameters, following the same
/// exponential-coefficient shape used throughout the crate (`limiter.rs`,
/// `engine/envelope_follower.rs`) rather than a linear ramp.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    coeff: f32,
}

impl SmoothedParam {
    pub fn new(initial: f32, time_ms: f32, sample_rate: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff: (-(1.0 / (time_ms.max(0.1) * 0.001 * sample_rate))).exp(),
        }
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn tick(&mut self) -> f32 {
        self.current = self.coeff * (self.current - self.target) + self.target;
        self.current
    }
}

/// Per-voice-slot note-off timer, grounded on spec §3's Active Note model.
/// `remaining_samples` carries `engine::HELD_INDEFINITELY` for live/held
/// notes with no sequencer-driven gate.
#[derive(Debug, Clone, Copy)]
struct ActiveNote {
    pitch: u8,
    remaining_samples: f64,
    active: bool,
}

impl Default for ActiveNote {
    fn default() -> Self {
        Self {
            pitch: 0,
            remaining_samples: 0.0,
            active: false,
        }
    }
}

pub struct Track {
    pub engine_kind: EngineKind,
    engine: Engine,
    pub volume: SmoothedParam,
    pub pan: f32,
    base_params: Box<[f32; NUM_PARAMETERS]>,
    applied_params: Box<[f32; NUM_PARAMETERS]>,
    last_sent_params: Box<[f32; NUM_PARAMETERS]>,
    pub sends: [SmoothedParam; NUM_FX_SLOTS],
    pub sequencer: Sequencer,
    pub drum_lanes: [Sequencer; NUM_DRUM_LANES],
    pub arp: Arpeggiator,
    pub scheduler: Scheduler,
    pub clock_multiplier: f32,
    pub arp_rate: f32,
    pub step_countdown_samples: f64,
    pub arp_countdown_samples: f64,
    active_notes: [ActiveNote; MAX_ACTIVE_NOTES],
    envelope_follower: EnvelopeFollower,
    silence_frames: u32,
    punch_frames_remaining: u32,
    /// Pitches that finished their gate (or were explicitly released) since
    /// the last drain, used by the orchestrator to emit MIDI-out note-offs
    /// for `EngineKind::MidiOut` tracks. Capacity reserved up front so
    /// pushes never allocate on the audio thread.
    released_this_block: Vec<u8>,
}

impl Track {
    pub fn new(engine_kind: EngineKind, sample_rate: f32) -> Self {
        Self {
            engine_kind,
            engine: Engine::new(engine_kind, sample_rate),
            volume: SmoothedParam::new(0.8, 10.0, sample_rate),
            pan: 0.0,
            base_params: Box::new([0.0; NUM_PARAMETERS]),
            applied_params: Box::new([0.0; NUM_PARAMETERS]),
            last_sent_params: Box::new([f32::NAN; NUM_PARAMETERS]),
            sends: std::array::from_fn(|_| SmoothedParam::new(0.0, 10.0, sample_rate)),
            sequencer: Sequencer::new(),
            drum_lanes: std::array::from_fn(|_| Sequencer::new()),
            arp: Arpeggiator::new(),
            scheduler: Scheduler::new(),
            clock_multiplier: 1.0,
            arp_rate: 1.0,
            step_countdown_samples: 0.0,
            arp_countdown_samples: 0.0,
            active_notes: [ActiveNote::default(); MAX_ACTIVE_NOTES],
            envelope_follower: EnvelopeFollower::new(sample_rate),
            silence_frames: 0,
            punch_frames_remaining: 0,
            released_this_block: Vec::with_capacity(MAX_ACTIVE_NOTES),
        }
    }

    pub fn set_engine_kind(&mut self, kind: EngineKind, sample_rate: f32) {
        self.engine_kind = kind;
        self.engine = Engine::new(kind, sample_rate);
        self.last_sent_params.fill(f32::NAN);
    }

    pub fn load_sample(&mut self, audio: Arc<Vec<f32>>, sample_rate: u32, slice_points: Vec<f32>) {
        self.engine.load_sample(audio, sample_rate, slice_points);
    }

    /// Drum lane used for this engine kind, per spec §4.3: drum-shaped
    /// engines, and a sampler engine in chop/slice play mode, route step
    /// edits to their 16 parallel lanes instead of the main sequencer.
    pub fn uses_drum_lanes(&self) -> bool {
        matches!(self.engine_kind, EngineKind::AnalogDrum | EngineKind::FmDrum) || self.engine.is_chops_mode()
    }

    pub fn set_base_parameter(&mut self, param_id: u16, value: f32) {
        if let Some(slot) = self.base_params.get_mut(param_id as usize) {
            *slot = value;
        }
    }

    pub fn base_parameter(&self, param_id: u16) -> f32 {
        self.base_params.get(param_id as usize).copied().unwrap_or(0.0)
    }

    pub fn applied_parameter(&self, param_id: u16) -> f32 {
        self.applied_params.get(param_id as usize).copied().unwrap_or(0.0)
    }

    /// Step 1 of spec §4.3: resets every applied parameter to its base
    /// value. Only forwards to the engine the ones that actually changed
    /// from what the engine was last told (spec §4.6 thrash guard).
    pub fn reset_applied_to_base(&mut self) {
        for i in 0..NUM_PARAMETERS {
            self.applied_params[i] = self.base_params[i];
        }
    }

    /// Step 2: overwrites applied values with a step's parameter locks.
    pub fn apply_parameter_locks(&mut self, locks: &[(u16, f32)]) {
        for &(id, value) in locks {
            if let Some(slot) = self.applied_params.get_mut(id as usize) {
                *slot = value;
            }
        }
    }

    /// Applies a modulation-matrix delta against the *base* value (spec
    /// §4.6: stacked routings to the same destination don't compound
    /// across blocks, since each write starts from base again).
    pub fn apply_modulation_delta(&mut self, param_id: u16, base_plus_delta: f32) {
        if let Some(slot) = self.applied_params.get_mut(param_id as usize) {
            *slot = base_plus_delta;
        }
    }

    /// Pushes every applied parameter in `0..200` (the common + ADSR
    /// ranges the step boundary touches every step) to the engine, but only
    /// when it differs from what the engine was last told by more than
    /// `1e-4` (spec §4.6).
    pub fn push_changed_parameters(&mut self, range: std::ops::Range<usize>) {
        for id in range {
            let value = self.applied_params[id];
            if (value - self.last_sent_params[id]).abs() > 1e-4 || self.last_sent_params[id].is_nan() {
                self.engine.set_parameter(id as u16, value);
                self.last_sent_params[id] = value;
            }
        }
    }

    pub fn push_single_parameter(&mut self, param_id: u16, value: f32) {
        let idx = param_id as usize;
        if idx >= NUM_PARAMETERS {
            return;
        }
        self.applied_params[idx] = value;
        if (value - self.last_sent_params[idx]).abs() > 1e-4 || self.last_sent_params[idx].is_nan() {
            self.engine.set_parameter(param_id, value);
            self.last_sent_params[idx] = value;
        }
    }

    pub fn envelope_follower_value(&self) -> f32 {
        self.envelope_follower.value()
    }

    /// Triggers a note, applying the at-most-one-active-slot-per-pitch
    /// invariant (spec §3 invariant 3 / §4.8 step 6): a short-gate
    /// retrigger steals the slot, a legato (gate > 0.9 steps) retrigger
    /// just extends the existing timer without re-triggering the engine.
    pub fn trigger_note(&mut self, pitch: u8, velocity: u8, duration_samples: f64, legato: bool, accent: bool) {
        if let Some(existing) = self.active_notes.iter_mut().find(|n| n.active && n.pitch == pitch) {
            if legato {
                existing.remaining_samples = existing.remaining_samples.max(duration_samples);
                if accent {
                    self.punch_frames_remaining = PUNCH_FRAMES;
                }
                return;
            }
            existing.active = false;
        }

        if let Some(slot) = self.active_notes.iter_mut().find(|n| !n.active) {
            slot.pitch = pitch;
            slot.remaining_samples = duration_samples;
            slot.active = true;
        }
        self.engine.trigger(pitch, velocity, duration_samples);
        if accent {
            self.punch_frames_remaining = PUNCH_FRAMES;
        }
    }

    pub fn release_note(&mut self, pitch: u8) {
        for note in self.active_notes.iter_mut().filter(|n| n.active && n.pitch == pitch) {
            note.active = false;
        }
        self.engine.release(pitch);
        if self.released_this_block.len() < self.released_this_block.capacity() {
            self.released_this_block.push(pitch);
        }
    }

    /// Drains the pitches released (gate expiry or explicit note-off) since
    /// the last call, for the orchestrator's MIDI-out note-off emission.
    pub fn drain_released(&mut self) -> std::vec::Drain<'_, u8> {
        self.released_this_block.drain(..)
    }

    pub fn all_notes_off(&mut self) {
        for note in self.active_notes.iter_mut() {
            note.active = false;
        }
        self.engine.all_notes_off();
        self.scheduler.clear();
        self.punch_frames_remaining = 0;
    }

    /// Decrements every active note-off timer by `frames` samples and
    /// releases any that reach zero (spec §4.8 step 9).
    pub fn decrement_active_notes(&mut self, frames: f64) {
        for note in self.active_notes.iter_mut() {
            if !note.active {
                continue;
            }
            note.remaining_samples -= frames;
            if note.remaining_samples <= 0.0 {
                note.active = false;
                self.engine.release(note.pitch);
                if self.released_this_block.len() < self.released_this_block.capacity() {
                    self.released_this_block.push(note.pitch);
                }
            }
        }
    }

    pub fn is_engine_active(&self) -> bool {
        self.engine.is_active()
    }

    /// Fires a main-sequencer step boundary: advances the playback cursor,
    /// resets applied parameters to base, applies the new step's parameter
    /// locks, and schedules its notes into the microtiming queue. Returns
    /// notes due to fire immediately this sub-block (spec §4.6 precedence:
    /// locks land before modulation is applied for this step).
    pub fn fire_main_step(&mut self, samples_per_step: f64) -> Vec<FiredNote> {
        let step_index = self.sequencer.advance();
        self.reset_applied_to_base();
        let countdown = self.step_countdown_samples;
        let fired = {
            let step = &self.sequencer.steps()[step_index];
            for &(id, value) in &step.parameter_locks {
                if let Some(slot) = self.applied_params.get_mut(id as usize) {
                    *slot = value;
                }
            }
            self.scheduler.schedule_step(step, countdown, samples_per_step)
        };
        self.push_changed_parameters(0..200);
        fired
    }

    /// Same as [`Track::fire_main_step`] but for one of the 16 parallel
    /// drum lanes a drum-shaped engine's steps are programmed into (spec
    /// §4.3).
    pub fn fire_drum_lane_step(&mut self, lane: usize, samples_per_step: f64) -> Vec<FiredNote> {
        let step_index = self.drum_lanes[lane].advance();
        self.reset_applied_to_base();
        let countdown = self.step_countdown_samples;
        let fired = {
            let step = &self.drum_lanes[lane].steps()[step_index];
            for &(id, value) in &step.parameter_locks {
                if let Some(slot) = self.applied_params.get_mut(id as usize) {
                    *slot = value;
                }
            }
            self.scheduler.schedule_step(step, countdown, samples_per_step)
        };
        self.push_changed_parameters(0..200);
        fired
    }

    /// Advances the arpeggiator by one tick and returns the pitches it
    /// wants to sound this tick (rhythm-lane-gated, inversion-applied).
    pub fn fire_arp_step(&mut self) -> Vec<u8> {
        self.arp.next_notes()
    }

    /// Renders one control-rate sub-block into `output`, applying smoothed
    /// volume and the punch/accent saturation boost (spec §4.8 step 6).
    /// Tracks silent for more than `SILENCE_SLEEP_FRAMES` bypass the
    /// engine's render entirely, feeding the envelope follower zeros
    /// (spec §4.8 step 6 parenthetical).
    pub fn render(&mut self, output: &mut [f32]) {
        if self.silence_frames >= SILENCE_SLEEP_FRAMES && !self.engine.is_active() {
            output.fill(0.0);
            for _ in 0..output.len() {
                self.envelope_follower.process(0.0);
            }
            return;
        }

        self.engine.render(output);

        for sample in output.iter_mut() {
            let mut s = *sample;
            if self.punch_frames_remaining > 0 {
                let t = self.punch_frames_remaining as f32 / PUNCH_FRAMES as f32;
                s = soft_clip(s * (1.0 + 0.5 * t));
                self.punch_frames_remaining -= 1;
            }
            s *= self.volume.tick();
            if !s.is_finite() {
                s = 0.0;
            }
            *sample = s;
            self.envelope_follower.process(s);
        }

        if output.iter().all(|&s| s.abs() < 1e-6) {
            self.silence_frames = self.silence_frames.saturating_add(output.len() as u32);
        } else {
            self.silence_frames = 0;
        }
    }

    /// Stereo-panned dry output for one already-rendered mono block,
    /// equal-power pan law, grounded on `original_source`'s mixer panning.
    pub fn pan_to_stereo(&self, mono: f32) -> (f32, f32) {
        let angle = (self.pan.clamp(-1.0, 1.0) + 1.0) * 0.25 * std::f32::consts::PI;
        (mono * angle.cos(), mono * angle.sin())
    }

    pub fn reset_transport(&mut self) {
        self.engine.all_notes_off();
        for note in self.active_notes.iter_mut() {
            note.active = false;
        }
        self.scheduler.clear();
        self.sequencer.reset();
        for lane in self.drum_lanes.iter_mut() {
            lane.reset();
        }
        self.arp.reset_step();
        self.punch_frames_remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legato_retrigger_extends_without_restealing_slot() {
        let mut track = Track::new(EngineKind::Subtractive, 48_000.0);
        track.trigger_note(60, 100, 1000.0, false, false);
        track.trigger_note(60, 100, 5000.0, true, false);
        // Only one engine trigger call happened (legato path skipped it);
        // decrementing by 1000 samples should not yet release the note.
        track.decrement_active_notes(1000.0);
        assert!(track.active_notes.iter().any(|n| n.active && n.pitch == 60));
    }

    #[test]
    fn short_gate_retrigger_steals_the_slot() {
        let mut track = Track::new(EngineKind::Subtractive, 48_000.0);
        track.trigger_note(60, 100, 100.0, false, false);
        track.trigger_note(60, 100, 5000.0, false, false);
        let count = track.active_notes.iter().filter(|n| n.active && n.pitch == 60).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn parameter_push_only_forwards_changes_past_threshold() {
        let mut track = Track::new(EngineKind::Subtractive, 48_000.0);
        track.set_base_parameter(120, 1000.0);
        track.reset_applied_to_base();
        track.push_changed_parameters(0..200);
        assert_eq!(track.applied_parameter(120), 1000.0);
    }

    #[test]
    fn silence_sleep_feeds_envelope_follower_zeros() {
        let mut track = Track::new(EngineKind::Subtractive, 48_000.0);
        track.silence_frames = SILENCE_SLEEP_FRAMES;
        let mut buf = [0.5f32; 256];
        track.render(&mut buf);
        assert!(buf.iter().all(|&s| s == 0.0));
    }
}
