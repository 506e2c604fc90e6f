// src/fx/components/lfo_filter.rs

//! An LFO-swept state-variable filter, fixed to either its low-pass or
//! high-pass tap (the spec's slot catalogue exposes them as two distinct
//! fixed-mode slots rather than one mode-switchable unit). Grounded on
//! `engine/filter.rs::StateVariableFilter`, driven here by the shared
//! `UnitLfo` instead of the modulation matrix, matching the teacher's
//! `fx_components` units owning their own LFOs rather than reading the
//! orchestrator's shared ones.

use super::UnitLfo;
use crate::engine::filter::{FilterMode, StateVariableFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfoFilterMode {
    LowPass,
    HighPass,
}

pub struct LfoFilter {
    filter: StateVariableFilter,
    lfo: UnitLfo,
    mode: LfoFilterMode,
    base_cutoff_hz: f32,
    depth_hz: f32,
    rate_hz: f32,
    resonance: f32,
}

impl LfoFilter {
    pub fn new(sample_rate: f32, mode: LfoFilterMode) -> Self {
        Self {
            filter: StateVariableFilter::new(sample_rate),
            lfo: UnitLfo::new(sample_rate),
            mode,
            base_cutoff_hz: 800.0,
            depth_hz: 600.0,
            rate_hz: 2.0,
            resonance: 0.3,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let sweep = self.lfo.next_sine(self.rate_hz);
        let cutoff = (self.base_cutoff_hz + sweep * self.depth_hz).max(20.0);
        let mode = match self.mode {
            LfoFilterMode::LowPass => FilterMode::LowPass,
            LfoFilterMode::HighPass => FilterMode::HighPass,
        };
        self.filter.process(input, cutoff, self.resonance, mode)
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.base_cutoff_hz = value.clamp(20.0, 18_000.0),
            1 => self.depth_hz = value.clamp(0.0, 10_000.0),
            2 => self.rate_hz = value.clamp(0.01, 20.0),
            3 => self.resonance = value.clamp(0.0, 0.99),
            _ => {}
        }
    }
}
