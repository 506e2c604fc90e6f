// src/sequencer/scheduler.rs

//! The microtiming scheduler: converts a fired step's notes into pending
//! entries with sample-accurate delays, expands ratchets into equally
//! spaced retriggers, and decrements/fires the queue once per audio block.
//! Grounded on `original_source/AudioEngine.cpp`'s step-boundary block (no
//! single header owns this logic in the original; it lives inline in
//! `onAudioReady`), reworked into its own scheduler type per spec §4.5.

use crate::sequencer::{Step, StepNote};

/// Bounded per-track ring capacity (spec §9 memory-ownership note:
/// "pending notes use a small per-track ring, bound recommended = 64").
pub const PENDING_QUEUE_CAPACITY: usize = 64;

/// A note queued to fire once its countdown reaches zero.
#[derive(Debug, Clone, Copy)]
pub struct PendingNote {
    pub pitch: u8,
    pub velocity: u8,
    pub samples_until_fire: f64,
    pub gate_steps: f32,
    pub ratchet_remaining: u8,
    pub accent: bool,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    pending: Vec<PendingNote>,
}

/// A note that has crossed zero and should fire this block.
#[derive(Debug, Clone, Copy)]
pub struct FiredNote {
    pub pitch: u8,
    pub velocity: u8,
    pub gate_steps: f32,
    pub accent: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Schedules a step's notes against the current step countdown,
    /// expanding ratchets into `ratchet - 1` additional pending entries at
    /// `k * samples_per_step / ratchet` offsets (spec §4.5). Notes whose
    /// computed delay is `<= 1` sample are returned to fire immediately
    /// instead of being queued, matching the spec's "fires in the current
    /// block" rule. Entries beyond the ring capacity are dropped silently
    /// (spec §9).
    pub fn schedule_step(
        &mut self,
        step: &Step,
        step_countdown_samples: f64,
        samples_per_step: f64,
    ) -> Vec<FiredNote> {
        let mut immediate = Vec::new();
        if !step.active {
            return immediate;
        }
        if rand::random::<f32>() > step.probability {
            return immediate;
        }

        let ratchet = step.ratchet.max(1);
        for note in &step.notes {
            self.schedule_note(
                note,
                step.gate_steps,
                step.accent,
                ratchet,
                0,
                step_countdown_samples,
                samples_per_step,
                &mut immediate,
            );
            for k in 1..ratchet {
                self.schedule_note(
                    note,
                    step.gate_steps,
                    step.accent,
                    ratchet,
                    k,
                    step_countdown_samples,
                    samples_per_step,
                    &mut immediate,
                );
            }
        }
        immediate
    }

    #[allow(clippy::too_many_arguments)]
    fn schedule_note(
        &mut self,
        note: &StepNote,
        gate_steps: f32,
        accent: bool,
        ratchet: u8,
        ratchet_index: u8,
        step_countdown_samples: f64,
        samples_per_step: f64,
        immediate: &mut Vec<FiredNote>,
    ) {
        let ratchet_offset = ratchet_index as f64 * samples_per_step / ratchet as f64;
        let delay = if ratchet_index == 0 {
            note.sub_step_offset as f64 * samples_per_step + step_countdown_samples
        } else {
            ratchet_offset + step_countdown_samples
        };

        if delay <= 1.0 {
            immediate.push(FiredNote {
                pitch: note.pitch,
                velocity: note.velocity,
                gate_steps,
                accent,
            });
            return;
        }

        if self.pending.len() >= PENDING_QUEUE_CAPACITY {
            return;
        }
        self.pending.push(PendingNote {
            pitch: note.pitch,
            velocity: note.velocity,
            samples_until_fire: delay,
            gate_steps,
            ratchet_remaining: ratchet - ratchet_index,
            accent,
        });
    }

    /// Decrements every pending entry by `frames` and removes + returns
    /// those that crossed zero, preserving FIFO order of `samples_until_fire`
    /// (spec §5 ordering guarantee).
    pub fn advance_and_fire(&mut self, frames: f64) -> Vec<FiredNote> {
        for entry in self.pending.iter_mut() {
            entry.samples_until_fire -= frames;
        }
        self.pending.sort_by(|a, b| a.samples_until_fire.partial_cmp(&b.samples_until_fire).unwrap());
        let split = self.pending.partition_point(|e| e.samples_until_fire <= 0.0);
        self.pending
            .drain(0..split)
            .map(|e| FiredNote {
                pitch: e.pitch,
                velocity: e.velocity,
                gate_steps: e.gate_steps,
                accent: e.accent,
            })
            .collect()
    }
}

/// Computes the per-step sample countdown for a given BPM/clock multiplier,
/// clamped per spec §4.3: BPM < 1 is treated as 1, clock multiplier clamps
/// to >= 0.01, and the result is floored at 2400 samples ("machine gun"
/// guard against audio-rate retriggering).
pub fn step_countdown_samples(sample_rate: f64, bpm: f32, clock_multiplier: f32) -> f64 {
    let bpm = bpm.max(1.0) as f64;
    let clock_multiplier = (clock_multiplier.max(0.01)) as f64;
    let raw = (60.0 * sample_rate) / (bpm * 4.0) / clock_multiplier;
    raw.max(2400.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_with_note(pitch: u8) -> Step {
        let mut step = Step {
            probability: 1.0,
            gate_steps: 1.0,
            ratchet: 1,
            ..Step::default()
        };
        step.add_note(pitch, 100, 0.0);
        step
    }

    #[test]
    fn immediate_fire_when_delay_below_threshold() {
        let mut scheduler = Scheduler::new();
        let step = step_with_note(60);
        let fired = scheduler.schedule_step(&step, 0.0, 1000.0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].pitch, 60);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn ratchet_expands_into_equally_spaced_pending_entries() {
        let mut scheduler = Scheduler::new();
        let mut step = step_with_note(60);
        step.ratchet = 4;
        // Large countdown so nothing fires immediately.
        let fired = scheduler.schedule_step(&step, 5000.0, 1000.0);
        assert!(fired.is_empty());
        assert_eq!(scheduler.len(), 4);
    }

    #[test]
    fn advance_and_fire_returns_only_crossed_entries_in_order() {
        let mut scheduler = Scheduler::new();
        let step = step_with_note(64);
        scheduler.schedule_step(&step, 500.0, 1000.0);
        let fired = scheduler.advance_and_fire(256.0);
        assert!(fired.is_empty());
        let fired = scheduler.advance_and_fire(256.0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].pitch, 64);
    }

    #[test]
    fn machine_gun_guard_floors_countdown_at_2400_samples() {
        let countdown = step_countdown_samples(48_000.0, 400.0, 1.0);
        assert!(countdown >= 2400.0);
    }

    #[test]
    fn bpm_and_clock_multiplier_clamp_to_minimums() {
        let a = step_countdown_samples(48_000.0, 0.0, 1.0);
        let b = step_countdown_samples(48_000.0, 1.0, 1.0);
        assert_eq!(a, b);
    }
}
