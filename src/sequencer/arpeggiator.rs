// src/sequencer/arpeggiator.rs

//! The arpeggiator state machine: held-notes set, octave/inversion
//! expansion, mode-dependent sequence transform, and the three 8-step
//! rhythm lanes. Grounded directly on `original_source/Arpeggiator.h`,
//! including its resolved ambiguities (spec §9 Open Questions / DESIGN.md):
//! STAGGER_DOWN reverses without re-staggering, and lane 0 is the main arp
//! walker rather than a fixed chord root.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArpMode {
    Off,
    Up,
    Down,
    UpDown,
    StaggerUp,
    StaggerDown,
    Random,
}

/// Three 8-step rhythm lanes gating which sequence index fires on a given
/// arp tick, grounded on `Arpeggiator.h`'s `mRhythms` (`Vec<Vec<bool>>`
/// sized 3x8). Lane 0 defaults to all-on; lanes 1/2 default to all-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RhythmLanes {
    pub lanes: [[bool; 8]; 3],
}

impl Default for RhythmLanes {
    fn default() -> Self {
        Self {
            lanes: [[true; 8], [false; 8], [false; 8]],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Arpeggiator {
    mode: ArpMode,
    step: usize,
    octaves: i32,
    inversion: i32,
    latched: bool,
    waiting_for_new_gesture: bool,
    held_notes: Vec<u8>,
    sequence: Vec<u8>,
    rhythms: RhythmLanes,
    random_sequence: Vec<usize>,
}

impl Default for Arpeggiator {
    fn default() -> Self {
        Self {
            mode: ArpMode::Off,
            step: 0,
            octaves: 0,
            inversion: 0,
            latched: false,
            waiting_for_new_gesture: false,
            held_notes: Vec::new(),
            sequence: Vec::new(),
            rhythms: RhythmLanes::default(),
            random_sequence: Vec::new(),
        }
    }
}

impl Arpeggiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ArpMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ArpMode) {
        self.mode = mode;
        self.step = 0;
        self.update_sequence();
    }

    pub fn set_octaves(&mut self, octaves: i32) {
        self.octaves = octaves;
        self.update_sequence();
    }

    pub fn set_inversion(&mut self, inversion: i32) {
        self.inversion = inversion;
        self.update_sequence();
    }

    pub fn set_rhythm_lanes(&mut self, rhythms: RhythmLanes) {
        self.rhythms = rhythms;
    }

    pub fn set_random_sequence(&mut self, sequence: Vec<usize>) {
        self.random_sequence = sequence;
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Unlatching clears all held notes and sequences (spec §4.4).
    pub fn set_latched(&mut self, latched: bool) {
        self.latched = latched;
        if !latched {
            self.held_notes.clear();
            self.sequence.clear();
            self.waiting_for_new_gesture = false;
        }
    }

    pub fn held_notes(&self) -> &[u8] {
        &self.held_notes
    }

    /// On a latched arp waiting for a new gesture, the next `add_note`
    /// clears the previously-held set first (spec §4.4 latch semantics).
    pub fn add_note(&mut self, note: u8) {
        if self.latched && self.waiting_for_new_gesture {
            self.held_notes.clear();
            self.waiting_for_new_gesture = false;
        }
        if !self.held_notes.contains(&note) {
            self.held_notes.push(note);
            self.held_notes.sort_unstable();
            self.update_sequence();
        }
    }

    pub fn remove_note(&mut self, note: u8) {
        if self.latched {
            return;
        }
        if let Some(pos) = self.held_notes.iter().position(|&n| n == note) {
            self.held_notes.remove(pos);
            self.update_sequence();
        }
    }

    /// Called when all physically-held keys are released. Latched arps keep
    /// cycling until the next `add_note` starts a fresh gesture.
    pub fn on_all_physically_released(&mut self) {
        if self.latched {
            self.waiting_for_new_gesture = true;
        } else {
            self.held_notes.clear();
            self.update_sequence();
        }
    }

    pub fn clear(&mut self) {
        self.held_notes.clear();
        self.sequence.clear();
        self.step = 0;
        self.waiting_for_new_gesture = false;
    }

    pub fn reset_step(&mut self) {
        self.step = 0;
    }

    /// Produces the pitches to trigger on this arp tick, applying the
    /// rhythm-lane gating and, on the step-0 of each cycle, the inversion
    /// shift to lane 0's pitch. Grounded on `Arpeggiator::nextNotes`.
    pub fn next_notes(&mut self) -> Vec<u8> {
        if self.sequence.is_empty() || self.mode == ArpMode::Off {
            return Vec::new();
        }
        let len = self.sequence.len();
        let mut notes = Vec::new();
        let step_index = self.step % 8;
        let cycle_index = self.step % len;

        if self.rhythms.lanes[0][step_index] {
            let mut pitch = self.sequence[cycle_index] as i32;
            if self.inversion != 0 && cycle_index == 0 {
                pitch += self.inversion * 12;
            }
            notes.push(pitch.clamp(0, 127) as u8);
        }
        if self.rhythms.lanes[1][step_index] && len > 1 {
            let idx = (self.step + 1) % len;
            notes.push(self.sequence[idx]);
        }
        if self.rhythms.lanes[2][step_index] && len > 2 {
            let idx = (self.step + 2) % len;
            notes.push(self.sequence[idx]);
        }

        self.step += 1;
        notes
    }

    fn update_sequence(&mut self) {
        self.sequence.clear();
        if self.held_notes.is_empty() {
            return;
        }

        let start_octave = self.octaves.min(0);
        let end_octave = self.octaves.max(0);
        let mut expanded: Vec<i32> = Vec::new();
        for octave in start_octave..=end_octave {
            for &note in &self.held_notes {
                expanded.push(note as i32 + octave * 12);
            }
        }
        expanded.sort_unstable();
        expanded.dedup();
        let expanded: Vec<u8> = expanded.into_iter().map(|n| n.clamp(0, 127) as u8).collect();

        self.sequence = match self.mode {
            ArpMode::Off => Vec::new(),
            ArpMode::Up => expanded.clone(),
            ArpMode::Down => {
                let mut seq = expanded.clone();
                seq.reverse();
                seq
            }
            ArpMode::UpDown => {
                let mut seq = expanded.clone();
                if expanded.len() > 2 {
                    for i in (1..expanded.len() - 1).rev() {
                        seq.push(expanded[i]);
                    }
                }
                seq
            }
            ArpMode::StaggerUp => {
                let mut seq = Vec::new();
                for i in 0..expanded.len() {
                    seq.push(expanded[i]);
                    if i + 2 < expanded.len() {
                        seq.push(expanded[i + 2]);
                    }
                }
                seq
            }
            // Resolved per spec §9 Open Question (i): reverse only, no
            // re-stagger, matching the original's literal behavior.
            ArpMode::StaggerDown => {
                let mut seq = expanded.clone();
                seq.reverse();
                seq
            }
            ArpMode::Random => {
                if !self.random_sequence.is_empty() {
                    self.random_sequence
                        .iter()
                        .map(|&idx| expanded[idx % expanded.len()])
                        .collect()
                } else {
                    let mut seq = expanded.clone();
                    fisher_yates_shuffle(&mut seq);
                    seq
                }
            }
        };
    }
}

fn fisher_yates_shuffle(items: &mut [u8]) {
    for i in (1..items.len()).rev() {
        let j = rand::random::<usize>() % (i + 1);
        items.swap(i, j);
    }
}

/// Note-length feel for the arp clock, grounded on `original_source`'s
/// `Arpeggiator::RATE_DIVISION` enum (straight/dotted/triplet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArpDivision {
    Straight,
    Dotted,
    Triplet,
}

/// Computes the sample count between arp ticks from the sequencer's
/// per-step sample count, per spec §4.4:
/// `arp_samples_per_step = samples_per_step * max(0.125, arp_rate)`,
/// further scaled `*1.5` for a dotted feel or `*0.667` for a triplet feel.
pub fn arp_samples_per_step(samples_per_step: f64, arp_rate: f32, division: ArpDivision) -> f64 {
    let base = samples_per_step * arp_rate.max(0.125) as f64;
    match division {
        ArpDivision::Straight => base,
        ArpDivision::Dotted => base * 1.5,
        ArpDivision::Triplet => base * 0.667,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arp_up_with(notes: &[u8], octaves: i32) -> Arpeggiator {
        let mut arp = Arpeggiator::new();
        arp.set_mode(ArpMode::Up);
        arp.set_octaves(octaves);
        for &n in notes {
            arp.add_note(n);
        }
        arp
    }

    #[test]
    fn up_mode_one_octave_cycles_in_ascending_order() {
        let mut arp = arp_up_with(&[60, 64, 67], 1);
        let mut lanes = RhythmLanes::default();
        lanes.lanes[0] = [true; 8];
        arp.set_rhythm_lanes(lanes);
        let mut emitted = Vec::new();
        for _ in 0..7 {
            emitted.extend(arp.next_notes());
        }
        assert_eq!(emitted, vec![60, 64, 67, 72, 76, 79, 60]);
    }

    #[test]
    fn down_mode_is_reverse_of_expanded_sequence() {
        let mut arp = Arpeggiator::new();
        arp.set_mode(ArpMode::Down);
        arp.add_note(60);
        arp.add_note(64);
        arp.add_note(67);
        let notes = arp.next_notes();
        assert_eq!(notes, vec![67]);
    }

    #[test]
    fn latch_keeps_cycling_until_new_gesture_starts() {
        let mut arp = Arpeggiator::new();
        arp.set_mode(ArpMode::Up);
        arp.set_latched(true);
        arp.add_note(60);
        arp.add_note(64);
        arp.on_all_physically_released();
        // Still cycling the old notes while waiting for a new gesture.
        assert_eq!(arp.held_notes(), &[60, 64]);
        arp.add_note(67);
        assert_eq!(arp.held_notes(), &[67]);
    }

    #[test]
    fn unlatching_clears_everything() {
        let mut arp = Arpeggiator::new();
        arp.set_mode(ArpMode::Up);
        arp.set_latched(true);
        arp.add_note(60);
        arp.set_latched(false);
        assert!(arp.held_notes().is_empty());
    }

    #[test]
    fn stagger_down_only_reverses_without_interleave() {
        let mut arp = Arpeggiator::new();
        arp.set_mode(ArpMode::StaggerDown);
        for n in [60, 62, 64, 65] {
            arp.add_note(n);
        }
        // Matches StaggerDown's literal (reverse-only) implementation.
        let mut down = Arpeggiator::new();
        down.set_mode(ArpMode::Down);
        for n in [60, 62, 64, 65] {
            down.add_note(n);
        }
        assert_eq!(arp.sequence, down.sequence);
    }
}
