// src/fx/mod.rs

//! The 15-slot master effects graph: fixed processing order, per-slot
//! chain-destination routing, cycle rejection at configuration time, and
//! the final soft-clip master stage. Grounded on the teacher's `FxRack`
//! two-pass (gather-mods, then-process) design in
//! `audio_engine/fx_rack.rs` and on `original_source/AudioEngine.cpp`'s
//! `renderStereo` FX-chain section (fixed slot order, chain-destination
//! edges, one-sample latency break for cycles).

pub mod components;

use crate::config::NUM_FX_SLOTS;
use serde::{Deserialize, Serialize};

/// The fifteen fixed effect kinds a slot can hold, in the spec's §2/§4.7
/// slot-order list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FxComponentKind {
    Flanger,
    TapeEcho,
    Spread,
    Octaver,
    Overdrive,
    Bitcrusher,
    Chorus,
    Phaser,
    TapeWobble,
    Delay,
    Reverb,
    Slicer,
    Compressor,
    HpLfoFilter,
    LpLfoFilter,
}

pub(crate) enum FxUnit {
    Flanger(components::flanger::Flanger),
    TapeEcho(components::tape_echo::TapeEcho),
    Spread(components::spread::Spread),
    Octaver(components::octaver::Octaver),
    Overdrive(components::overdrive::Overdrive),
    Bitcrusher(components::bitcrusher::Bitcrusher),
    Chorus(components::chorus::Chorus),
    Phaser(components::phaser::Phaser),
    TapeWobble(components::tape_wobble::TapeWobble),
    Delay(components::delay::Delay),
    Reverb(components::reverb::Reverb),
    Slicer(components::slicer::Slicer),
    Compressor(components::compressor::Compressor),
    HpLfoFilter(components::lfo_filter::LfoFilter),
    LpLfoFilter(components::lfo_filter::LfoFilter),
}

impl FxUnit {
    fn new(kind: FxComponentKind, sample_rate: f32) -> Self {
        use components::*;
        match kind {
            FxComponentKind::Flanger => FxUnit::Flanger(flanger::Flanger::new(sample_rate)),
            FxComponentKind::TapeEcho => FxUnit::TapeEcho(tape_echo::TapeEcho::new(sample_rate)),
            FxComponentKind::Spread => FxUnit::Spread(spread::Spread::new(sample_rate)),
            FxComponentKind::Octaver => FxUnit::Octaver(octaver::Octaver::new(sample_rate)),
            FxComponentKind::Overdrive => FxUnit::Overdrive(overdrive::Overdrive::new()),
            FxComponentKind::Bitcrusher => FxUnit::Bitcrusher(bitcrusher::Bitcrusher::new()),
            FxComponentKind::Chorus => FxUnit::Chorus(chorus::Chorus::new(sample_rate)),
            FxComponentKind::Phaser => FxUnit::Phaser(phaser::Phaser::new(sample_rate)),
            FxComponentKind::TapeWobble => FxUnit::TapeWobble(tape_wobble::TapeWobble::new(sample_rate)),
            FxComponentKind::Delay => FxUnit::Delay(delay::Delay::new(sample_rate)),
            FxComponentKind::Reverb => FxUnit::Reverb(reverb::Reverb::new(sample_rate)),
            FxComponentKind::Slicer => FxUnit::Slicer(slicer::Slicer::new(sample_rate)),
            FxComponentKind::Compressor => FxUnit::Compressor(compressor::Compressor::new(sample_rate)),
            FxComponentKind::HpLfoFilter => {
                FxUnit::HpLfoFilter(lfo_filter::LfoFilter::new(sample_rate, lfo_filter::LfoFilterMode::HighPass))
            }
            FxComponentKind::LpLfoFilter => {
                FxUnit::LpLfoFilter(lfo_filter::LfoFilter::new(sample_rate, lfo_filter::LfoFilterMode::LowPass))
            }
        }
    }

    /// True for effects whose internal state (delay buffer, reverb tank)
    /// must keep advancing on silent input to produce a tail; used to
    /// decide whether the bypass threshold actually skips work (spec §4.7).
    fn produces_tail(&self) -> bool {
        matches!(
            self,
            FxUnit::Delay(_) | FxUnit::Reverb(_) | FxUnit::TapeEcho(_) | FxUnit::TapeWobble(_) | FxUnit::Chorus(_)
        )
    }

    fn is_stereo(&self) -> bool {
        matches!(self, FxUnit::Delay(_) | FxUnit::Reverb(_))
    }

    fn process_mono(&mut self, input: f32) -> f32 {
        match self {
            FxUnit::Flanger(u) => u.process(input),
            FxUnit::TapeEcho(u) => u.process(input),
            FxUnit::Spread(u) => u.process(input),
            FxUnit::Octaver(u) => u.process(input),
            FxUnit::Overdrive(u) => u.process(input),
            FxUnit::Bitcrusher(u) => u.process(input),
            FxUnit::Chorus(u) => u.process(input),
            FxUnit::Phaser(u) => u.process(input),
            FxUnit::TapeWobble(u) => u.process(input),
            FxUnit::Slicer(u) => u.process(input),
            FxUnit::Compressor(u) => u.process(input),
            FxUnit::HpLfoFilter(u) => u.process(input),
            FxUnit::LpLfoFilter(u) => u.process(input),
            FxUnit::Delay(_) | FxUnit::Reverb(_) => unreachable!("stereo units use process_stereo"),
        }
    }

    fn process_stereo(&mut self, input: f32) -> (f32, f32) {
        match self {
            FxUnit::Delay(u) => u.process(input),
            FxUnit::Reverb(u) => u.process(input),
            _ => unreachable!("mono units use process_mono"),
        }
    }

    fn set_parameter(&mut self, param_id: u16, value: f32) {
        match self {
            FxUnit::Flanger(u) => u.set_parameter(param_id, value),
            FxUnit::TapeEcho(u) => u.set_parameter(param_id, value),
            FxUnit::Spread(u) => u.set_parameter(param_id, value),
            FxUnit::Octaver(u) => u.set_parameter(param_id, value),
            FxUnit::Overdrive(u) => u.set_parameter(param_id, value),
            FxUnit::Bitcrusher(u) => u.set_parameter(param_id, value),
            FxUnit::Chorus(u) => u.set_parameter(param_id, value),
            FxUnit::Phaser(u) => u.set_parameter(param_id, value),
            FxUnit::TapeWobble(u) => u.set_parameter(param_id, value),
            FxUnit::Delay(u) => u.set_parameter(param_id, value),
            FxUnit::Reverb(u) => u.set_parameter(param_id, value),
            FxUnit::Slicer(u) => u.set_parameter(param_id, value),
            FxUnit::Compressor(u) => u.set_parameter(param_id, value),
            FxUnit::HpLfoFilter(u) => u.set_parameter(param_id, value),
            FxUnit::LpLfoFilter(u) => u.set_parameter(param_id, value),
        }
    }
}

struct FxSlot {
    kind: Option<FxComponentKind>,
    unit: Option<FxUnit>,
    /// `None` = master. Some(idx) = another slot.
    chain_destination: Option<usize>,
    accumulator: f32,
    next_accumulator: f32,
    /// Wet/dry blend for this slot's own output, `[0, 1]`; `1.0` (fully
    /// wet) is the default since a slot's accumulator is already a send
    /// amount, not a parallel dry path.
    wet_dry: f32,
}

impl Default for FxSlot {
    fn default() -> Self {
        Self {
            kind: None,
            unit: None,
            chain_destination: None,
            accumulator: 0.0,
            next_accumulator: 0.0,
            wet_dry: 1.0,
        }
    }
}

const BYPASS_THRESHOLD: f32 = 1e-5;
/// Cycle-detection hop bound, matching spec §8's quantified invariant
/// ("traversal...terminates in <= 16 hops").
const MAX_CHAIN_HOPS: usize = 16;

pub struct FxGraph {
    slots: Vec<FxSlot>,
    sample_rate: f32,
    master_mono_wet: f32,
    master_stereo_wet: (f32, f32),
}

impl FxGraph {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            slots: (0..NUM_FX_SLOTS).map(|_| FxSlot::default()).collect(),
            sample_rate,
            master_mono_wet: 0.0,
            master_stereo_wet: (0.0, 0.0),
        }
    }

    pub fn set_slot(&mut self, slot: usize, kind: Option<FxComponentKind>) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.kind = kind;
            s.unit = kind.map(|k| FxUnit::new(k, self.sample_rate));
            s.accumulator = 0.0;
            s.next_accumulator = 0.0;
            s.wet_dry = 1.0;
        }
    }

    pub fn set_parameter(&mut self, slot: usize, param_id: u16, value: f32) {
        if let Some(unit) = self.slots.get_mut(slot).and_then(|s| s.unit.as_mut()) {
            unit.set_parameter(param_id, value);
        }
    }

    pub fn set_wet_dry(&mut self, slot: usize, wet_dry: f32) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.wet_dry = wet_dry.clamp(0.0, 1.0);
        }
    }

    /// Sets a slot's chain destination, rejecting configurations that would
    /// introduce a cycle (spec §3 invariant 4: cyclic configuration is
    /// rejected with no change applied). Returns `true` if applied.
    pub fn set_chain_destination(&mut self, slot: usize, destination: Option<usize>) -> bool {
        if slot >= self.slots.len() {
            return false;
        }
        if let Some(dest) = destination {
            if dest >= self.slots.len() {
                return false;
            }
            if self.would_cycle(slot, dest) {
                return false;
            }
        }
        self.slots[slot].chain_destination = destination;
        true
    }

    /// Simulates the graph with `slot -> dest` already applied and walks
    /// from `dest` forward; if that walk revisits `slot` within
    /// `MAX_CHAIN_HOPS` hops, the new edge would create a cycle.
    fn would_cycle(&self, slot: usize, dest: usize) -> bool {
        if dest == slot {
            return true;
        }
        let mut current = dest;
        for _ in 0..MAX_CHAIN_HOPS {
            let next = if current == slot {
                Some(dest)
            } else {
                self.slots[current].chain_destination
            };
            match next {
                None => return false,
                Some(n) if n == slot => return true,
                Some(n) => current = n,
            }
        }
        true
    }

    /// Adds a track's send contribution into a slot's input accumulator for
    /// the sample currently being built.
    pub fn accumulate_send(&mut self, slot: usize, track_output: f32, send_amount: f32) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.accumulator += track_output * send_amount;
        }
    }

    /// Processes all 15 slots in fixed order for one sample, routing each
    /// slot's output to its chain destination's accumulator (available next
    /// sample, breaking cycles with one sample of latency) or into the
    /// master wet sum. Returns `(master_mono_wet, stereo_wet_l, stereo_wet_r)`
    /// for the orchestrator to fold into the final mix.
    pub fn process_sample(&mut self) -> (f32, f32, f32) {
        self.master_mono_wet = 0.0;
        self.master_stereo_wet = (0.0, 0.0);

        for idx in 0..self.slots.len() {
            let input = self.slots[idx].accumulator;
            let input = if input.is_finite() { input } else { 0.0 };
            self.slots[idx].accumulator = 0.0;

            let Some(unit) = self.slots[idx].unit.as_mut() else {
                continue;
            };

            if input.abs() < BYPASS_THRESHOLD && !unit.produces_tail() {
                continue;
            }

            let destination = self.slots[idx].chain_destination;
            let wet_dry = self.slots[idx].wet_dry;
            if unit.is_stereo() {
                let (l, r) = unit.process_stereo(input);
                let (l, r) = (sanitize(l), sanitize(r));
                let l = input * (1.0 - wet_dry) + l * wet_dry;
                let r = input * (1.0 - wet_dry) + r * wet_dry;
                match destination {
                    None => {
                        self.master_stereo_wet.0 += l;
                        self.master_stereo_wet.1 += r;
                    }
                    Some(dest) => {
                        self.slots[dest].next_accumulator += (l + r) * 0.5;
                    }
                }
            } else {
                let out = sanitize(unit.process_mono(input));
                let out = input * (1.0 - wet_dry) + out * wet_dry;
                match destination {
                    None => self.master_mono_wet += out,
                    Some(dest) => self.slots[dest].next_accumulator += out,
                }
            }
        }

        for slot in self.slots.iter_mut() {
            slot.accumulator += std::mem::take(&mut slot.next_accumulator);
        }

        (self.master_mono_wet, self.master_stereo_wet.0, self.master_stereo_wet.1)
    }

    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.accumulator = 0.0;
            slot.next_accumulator = 0.0;
            if let (Some(kind), Some(_)) = (slot.kind, slot.unit.as_ref()) {
                slot.unit = Some(FxUnit::new(kind, self.sample_rate));
            }
        }
    }
}

fn sanitize(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_direct_self_cycle() {
        let mut graph = FxGraph::new(48_000.0);
        assert!(!graph.set_chain_destination(0, Some(0)));
        assert!(graph.slots[0].chain_destination.is_none());
    }

    #[test]
    fn rejects_indirect_cycle() {
        let mut graph = FxGraph::new(48_000.0);
        assert!(graph.set_chain_destination(0, Some(1)));
        assert!(!graph.set_chain_destination(1, Some(0)));
    }

    #[test]
    fn chained_overdrive_into_bitcrusher_reaches_master() {
        let mut graph = FxGraph::new(48_000.0);
        graph.set_slot(0, Some(FxComponentKind::Overdrive));
        graph.set_slot(1, Some(FxComponentKind::Bitcrusher));
        graph.set_chain_destination(0, Some(1));
        graph.set_chain_destination(1, None);

        graph.accumulate_send(0, 1.0, 1.0);
        let (_mono, _l, _r) = graph.process_sample();
        // Slot 1's direct accumulator was empty, but the chained output
        // lands there next sample and eventually reaches master.
        let mut mono_total = 0.0;
        for _ in 0..4 {
            let (mono, _, _) = graph.process_sample();
            mono_total += mono.abs();
        }
        assert!(mono_total > 0.0);
    }

    #[test]
    fn output_is_always_finite() {
        let mut graph = FxGraph::new(48_000.0);
        graph.set_slot(0, Some(FxComponentKind::Reverb));
        graph.accumulate_send(0, f32::NAN, 1.0);
        let (mono, l, r) = graph.process_sample();
        assert!(mono.is_finite() && l.is_finite() && r.is_finite());
    }
}
