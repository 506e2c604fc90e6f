// src/modulation.rs

//! The modulation matrix: a small fixed-capacity routing table plus the
//! orchestrator-owned LFOs and macros that feed it. Grounded on
//! `original_source/RoutingMatrix.h` (`RoutingEntry`, `ModSource`,
//! `ModDestination`, `MAX_TRACKS`/`MAX_MODS`) and on the teacher's
//! `synth.rs::Lfo` for the free-running LFO shape.

use crate::config::{MAX_TRACKS, NUM_LFOS, NUM_MACROS};
use std::f32::consts::TAU;

/// Maximum routing entries per track. Mirrors `original_source`'s
/// `RoutingMatrix::MAX_MODS`.
pub const MAX_MODS_PER_TRACK: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingSource {
    None,
    TrackOutput,
    Lfo(usize),
    Envelope,
    SidechainFollower,
    Macro(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDestination {
    None,
    Volume,
    FilterCutoff,
    Pitch,
    WavetablePos,
    /// A raw engine parameter id, bypassing the legacy fixed destinations.
    Parameter(u16),
}

#[derive(Debug, Clone, Copy)]
pub struct RoutingEntry {
    pub source_track: usize,
    pub source: RoutingSource,
    pub destination: RoutingDestination,
    pub amount: f32,
}

impl Default for RoutingEntry {
    fn default() -> Self {
        Self {
            source_track: 0,
            source: RoutingSource::None,
            destination: RoutingDestination::None,
            amount: 0.0,
        }
    }
}

/// A fixed-capacity per-track routing table. Lock-free by construction: the
/// audio thread owns it outright and edits only arrive as whole-entry
/// `AudioCommand`s, never through a shared mutex (spec §5 / teacher's §9
/// single-owner design, in place of `original_source`'s
/// `getFastConnections`-under-mutex scheme).
#[derive(Debug, Clone)]
pub struct RoutingMatrix {
    tracks: [Vec<RoutingEntry>; MAX_TRACKS],
}

impl Default for RoutingMatrix {
    fn default() -> Self {
        Self {
            tracks: Default::default(),
        }
    }
}

impl RoutingMatrix {
    pub fn add(&mut self, track: usize, entry: RoutingEntry) {
        if track >= MAX_TRACKS {
            return;
        }
        let list = &mut self.tracks[track];
        if list.len() < MAX_MODS_PER_TRACK {
            list.push(entry);
        }
    }

    pub fn clear(&mut self, track: usize) {
        if let Some(list) = self.tracks.get_mut(track) {
            list.clear();
        }
    }

    pub fn connections(&self, track: usize) -> &[RoutingEntry] {
        self.tracks.get(track).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LfoWaveform {
    Sine,
    Triangle,
    Saw,
    InvSaw,
    Square,
    Random,
}

/// A free-running LFO advanced once per control-rate sub-block by the
/// orchestrator. Grounded on the teacher's `synth.rs::Lfo` phase accumulator
/// (drops the wavetable-LFO variants, which belong to the per-engine LFOs
/// instead of the orchestrator's shared modulation sources).
#[derive(Debug, Clone)]
pub struct Lfo {
    phase: f32,
    last_random: f32,
    sample_rate: f32,
}

impl Lfo {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            last_random: 0.0,
            sample_rate,
        }
    }

    /// Advances the LFO by `frames` samples and returns its bipolar value
    /// (-1.0..=1.0). Called once per control-rate sub-block, not per-sample.
    pub fn advance(&mut self, frames: usize, rate_hz: f32, waveform: LfoWaveform) -> f32 {
        let phase_inc = rate_hz / self.sample_rate * frames as f32;
        let prev_phase = self.phase;
        self.phase = (self.phase + phase_inc) % 1.0;
        match waveform {
            LfoWaveform::Sine => (self.phase * TAU).sin(),
            LfoWaveform::Triangle => 1.0 - 4.0 * (self.phase - 0.5).abs(),
            LfoWaveform::Saw => 2.0 * self.phase - 1.0,
            LfoWaveform::InvSaw => 1.0 - 2.0 * self.phase,
            LfoWaveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoWaveform::Random => {
                if self.phase < prev_phase {
                    self.last_random = rand::random::<f32>() * 2.0 - 1.0;
                }
                self.last_random
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum MacroSource {
    Manual,
    Lfo(usize),
}

/// A macro knob. Grounded on `original_source/AudioEngine.h`'s
/// `MacroModule` (value + sourceType + sourceIndex); when sourced from an
/// LFO its value is refreshed once per block from that LFO's bipolar output
/// rescaled to `[0, 1]` (§4.6 supplement in SPEC_FULL.md).
#[derive(Debug, Clone, Copy)]
pub struct Macro {
    pub source: MacroSource,
    pub value: f32,
}

impl Default for Macro {
    fn default() -> Self {
        Self {
            source: MacroSource::Manual,
            value: 0.0,
        }
    }
}

/// Owns the orchestrator-wide modulation sources: the fixed LFO bank and
/// macro bank shared by every track's routing table.
#[derive(Debug)]
pub struct ModulationSources {
    pub lfos: [Lfo; NUM_LFOS],
    pub lfo_rates_hz: [f32; NUM_LFOS],
    pub lfo_waveforms: [LfoWaveform; NUM_LFOS],
    pub lfo_values: [f32; NUM_LFOS],
    pub macros: [Macro; NUM_MACROS],
}

impl ModulationSources {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            lfos: std::array::from_fn(|_| Lfo::new(sample_rate)),
            lfo_rates_hz: [1.0; NUM_LFOS],
            lfo_waveforms: [LfoWaveform::Sine; NUM_LFOS],
            lfo_values: [0.0; NUM_LFOS],
            macros: std::array::from_fn(|_| Macro::default()),
        }
    }

    /// Advances every LFO and refreshes LFO-sourced macros. Called once per
    /// control-rate sub-block from the orchestrator.
    pub fn advance_block(&mut self, frames: usize) {
        for i in 0..NUM_LFOS {
            self.lfo_values[i] = self.lfos[i].advance(frames, self.lfo_rates_hz[i], self.lfo_waveforms[i]);
        }
        for m in self.macros.iter_mut() {
            if let MacroSource::Lfo(idx) = m.source {
                if let Some(&lfo_val) = self.lfo_values.get(idx) {
                    m.value = ((lfo_val + 1.0) * 0.5).clamp(0.0, 1.0);
                }
            }
        }
    }

    #[inline]
    fn source_value(&self, source: RoutingSource, envelope: f32, sidechain: f32) -> f32 {
        let v = match source {
            RoutingSource::None => 0.0,
            RoutingSource::TrackOutput => 0.0,
            RoutingSource::Lfo(idx) => self.lfo_values.get(idx).copied().unwrap_or(0.0),
            RoutingSource::Envelope => envelope,
            RoutingSource::SidechainFollower => sidechain,
            RoutingSource::Macro(idx) => self.macros.get(idx).map(|m| m.value).unwrap_or(0.0),
        };
        if v.is_finite() {
            v
        } else {
            0.0
        }
    }

    /// Applies every routing entry for one track against the destination's
    /// *currently applied* value (i.e. post step-boundary-reset,
    /// post-parameter-lock), writing the modulated result back out.
    /// Grounded on `original_source/AudioEngine.cpp`'s `applyModulations`
    /// and on spec §8 scenario 3's worked example, which composes a routing
    /// delta onto the value a same-step parameter lock already wrote
    /// (lock 0.2 + delta 0.3 = 0.5), not onto the raw base array — so a
    /// lock is never silently clobbered by modulation that block.
    /// `current_parameter` looks up a track's current applied value for a
    /// raw parameter id (used by `WavetablePos`/`Parameter` destinations).
    pub fn apply_routings<F: Fn(u16) -> f32>(
        &self,
        routings: &[RoutingEntry],
        base_volume: f32,
        base_pitch: f32,
        base_filter_cutoff: f32,
        envelope: f32,
        sidechain: f32,
        current_parameter: F,
    ) -> (f32, f32, f32, Vec<(u16, f32)>) {
        let mut volume = base_volume;
        let mut pitch = base_pitch;
        let mut filter_cutoff = base_filter_cutoff;
        let mut params = Vec::new();

        for entry in routings {
            let src = self.source_value(entry.source, envelope, sidechain);
            let delta = src * entry.amount;
            match entry.destination {
                RoutingDestination::None => {}
                RoutingDestination::Volume => volume = base_volume + delta,
                RoutingDestination::Pitch => pitch = base_pitch + delta,
                RoutingDestination::FilterCutoff => filter_cutoff = base_filter_cutoff + delta,
                RoutingDestination::WavetablePos => params.push((150, current_parameter(150) + delta)),
                RoutingDestination::Parameter(id) => params.push((id, current_parameter(id) + delta)),
            }
        }
        (volume, pitch, filter_cutoff, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lfo_sine_starts_at_zero_and_stays_bounded() {
        let mut lfo = Lfo::new(48_000.0);
        let first = lfo.advance(1, 2.0, LfoWaveform::Sine);
        assert_relative_eq!(first, (TAU * (2.0 / 48_000.0)).sin(), epsilon = 1e-5);
        for _ in 0..100_000 {
            let v = lfo.advance(256, 5.0, LfoWaveform::Sine);
            assert!(v >= -1.0 && v <= 1.0);
        }
    }

    #[test]
    fn parameter_routing_composes_onto_current_applied_value() {
        // A routing to an arbitrary `Parameter(id)` destination must add its
        // delta onto whatever `current_parameter` reports right now (e.g. a
        // value a same-step lock already wrote), not onto a separate base.
        let mut sources = ModulationSources::new(48_000.0);
        sources.lfo_values[0] = 1.0;
        let routings = vec![RoutingEntry {
            source_track: 0,
            source: RoutingSource::Lfo(0),
            destination: RoutingDestination::Parameter(50),
            amount: 0.3,
        }];
        let already_applied = 0.2;
        let (_, _, _, params) =
            sources.apply_routings(&routings, 0.8, 0.0, 0.5, 0.0, 0.0, |id| if id == 50 { already_applied } else { 0.0 });
        assert_eq!(params.len(), 1);
        assert_relative_eq!(params[0].1, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn routing_applies_against_base_not_accumulated() {
        let mut sources = ModulationSources::new(48_000.0);
        sources.lfo_values[0] = 1.0;
        let routings = vec![
            RoutingEntry {
                source_track: 0,
                source: RoutingSource::Lfo(0),
                destination: RoutingDestination::Volume,
                amount: 0.1,
            },
            RoutingEntry {
                source_track: 0,
                source: RoutingSource::Lfo(0),
                destination: RoutingDestination::Volume,
                amount: 0.2,
            },
        ];
        let (volume, _, _, _) = sources.apply_routings(&routings, 0.8, 0.0, 1000.0, 0.0, 0.0, |_| 0.0);
        // Last matching routing wins since both write against the same base.
        assert_relative_eq!(volume, 0.8 + 0.2, epsilon = 1e-6);
    }
}
