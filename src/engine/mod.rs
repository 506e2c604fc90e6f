// src/engine/mod.rs

//! The voice-producer abstraction and the sum-type engine dispatch that
//! replaces `original_source/AudioEngine.h`'s concrete-member-plus-switch
//! design (spec §9 redesign note). Each `EngineKind` variant owns its own
//! fixed-size voice table; there is no dynamic dispatch (`dyn Trait`) on the
//! audio thread, only a `match`.

pub mod adsr;
pub mod analog_drum;
pub mod envelope_follower;
pub mod filter;
pub mod fm;
pub mod granular;
pub mod sampler;
pub mod subtractive;
pub mod wavetable;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Common parameter-id ranges, grounded on `original_source/AudioEngine.h`'s
/// flat `parameters[2500]` array layout.
pub mod param_ids {
    pub const COMMON_START: u16 = 0;
    pub const COMMON_END: u16 = 99;
    pub const AMP_FILTER_ADSR_START: u16 = 100;
    pub const AMP_FILTER_ADSR_END: u16 = 149;
    pub const ENGINE_SPECIFIC_START: u16 = 150;
    pub const ENGINE_SPECIFIC_END: u16 = 199;
    pub const SAMPLER_START: u16 = 300;
    pub const SAMPLER_END: u16 = 349;
    pub const GRANULAR_START: u16 = 400;
    pub const GRANULAR_END: u16 = 469;
    pub const WAVETABLE_START: u16 = 450;
    pub const WAVETABLE_END: u16 = 469;
    pub const ARP_START: u16 = 500;
    pub const ARP_END: u16 = 509;
    pub const ANALOG_DRUM_START: u16 = 600;
    pub const ANALOG_DRUM_END: u16 = 699;

    // Common amp/filter ADSR offsets within AMP_FILTER_ADSR range.
    pub const AMP_ATTACK: u16 = 100;
    pub const AMP_DECAY: u16 = 101;
    pub const AMP_SUSTAIN: u16 = 102;
    pub const AMP_RELEASE: u16 = 103;
    pub const FILTER_ATTACK: u16 = 110;
    pub const FILTER_DECAY: u16 = 111;
    /// Placed at 112 (not the 120 a flat ADSR-then-filter layout would
    /// suggest) to match spec §8 scenario 3's literal worked example, which
    /// locks and routes modulation to `parameters[112]` and calls it cutoff.
    pub const FILTER_CUTOFF: u16 = 112;
    pub const FILTER_RELEASE: u16 = 113;
    pub const FILTER_SUSTAIN: u16 = 120;
    pub const FILTER_RESONANCE: u16 = 121;
    pub const FILTER_ENV_AMOUNT: u16 = 122;
}

/// The eight engine-type tags `original_source/AudioEngine.h` dispatches on,
/// now a proper sum type instead of `engineType: int` plus concrete members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineKind {
    Subtractive,
    Fm,
    Sampler,
    Granular,
    Wavetable,
    FmDrum,
    AnalogDrum,
    MidiOut,
}

/// The interface every concrete synthesis engine implements. A track holds
/// exactly one `VoiceProducer`; polyphony is the engine's own concern
/// (each concrete engine keeps its own fixed-size voice table).
pub trait VoiceProducer: Send {
    /// Triggers a new note. `duration_samples` is the sentinel-bearing
    /// "hold until explicitly released" value (~9.9e6, matching
    /// `original_source`) for live/held notes, or a finite step-gated
    /// duration for sequencer-fired notes.
    fn trigger(&mut self, note: u8, velocity: u8, duration_samples: f64);
    fn release(&mut self, note: u8);
    fn render(&mut self, output: &mut [f32]);
    fn set_parameter(&mut self, param_id: u16, value: f32);
    fn set_sample_rate(&mut self, sample_rate: f32);
    fn all_notes_off(&mut self);
    fn is_active(&self) -> bool;
    /// True while the engine is a sampler in chop/slice mode, the third
    /// drum-lane-triggering condition alongside the two drum engine kinds
    /// (spec §4.3). Every other engine keeps the default.
    fn is_chops_mode(&self) -> bool {
        false
    }
}

pub enum Engine {
    Subtractive(subtractive::SubtractiveEngine),
    Fm(fm::FmEngine),
    Sampler(sampler::SamplerEngine),
    Granular(granular::GranularEngine),
    Wavetable(wavetable::WavetableEngine),
    FmDrum(fm::FmEngine),
    AnalogDrum(analog_drum::AnalogDrumEngine),
}

impl Engine {
    pub fn new(kind: EngineKind, sample_rate: f32) -> Self {
        match kind {
            EngineKind::Subtractive => Engine::Subtractive(subtractive::SubtractiveEngine::new(sample_rate)),
            EngineKind::Fm => Engine::Fm(fm::FmEngine::new(sample_rate)),
            EngineKind::Sampler => Engine::Sampler(sampler::SamplerEngine::new(sample_rate)),
            EngineKind::Granular => Engine::Granular(granular::GranularEngine::new(sample_rate)),
            EngineKind::Wavetable => Engine::Wavetable(wavetable::WavetableEngine::new(sample_rate)),
            EngineKind::FmDrum => Engine::FmDrum(fm::FmEngine::new(sample_rate)),
            EngineKind::AnalogDrum => Engine::AnalogDrum(analog_drum::AnalogDrumEngine::new(sample_rate)),
            EngineKind::MidiOut => Engine::Subtractive(subtractive::SubtractiveEngine::new(sample_rate)),
        }
    }

    pub fn load_sample(&mut self, audio: Arc<Vec<f32>>, sample_rate: u32, slice_points: Vec<f32>) {
        match self {
            Engine::Sampler(e) => e.load_sample(audio, sample_rate, slice_points),
            Engine::Granular(e) => e.load_sample(audio),
            _ => {}
        }
    }
}

impl VoiceProducer for Engine {
    fn trigger(&mut self, note: u8, velocity: u8, duration_samples: f64) {
        match self {
            Engine::Subtractive(e) => e.trigger(note, velocity, duration_samples),
            Engine::Fm(e) => e.trigger(note, velocity, duration_samples),
            Engine::Sampler(e) => e.trigger(note, velocity, duration_samples),
            Engine::Granular(e) => e.trigger(note, velocity, duration_samples),
            Engine::Wavetable(e) => e.trigger(note, velocity, duration_samples),
            Engine::FmDrum(e) => e.trigger(note, velocity, duration_samples),
            Engine::AnalogDrum(e) => e.trigger(note, velocity, duration_samples),
        }
    }

    fn release(&mut self, note: u8) {
        match self {
            Engine::Subtractive(e) => e.release(note),
            Engine::Fm(e) => e.release(note),
            Engine::Sampler(e) => e.release(note),
            Engine::Granular(e) => e.release(note),
            Engine::Wavetable(e) => e.release(note),
            Engine::FmDrum(e) => e.release(note),
            Engine::AnalogDrum(e) => e.release(note),
        }
    }

    fn render(&mut self, output: &mut [f32]) {
        match self {
            Engine::Subtractive(e) => e.render(output),
            Engine::Fm(e) => e.render(output),
            Engine::Sampler(e) => e.render(output),
            Engine::Granular(e) => e.render(output),
            Engine::Wavetable(e) => e.render(output),
            Engine::FmDrum(e) => e.render(output),
            Engine::AnalogDrum(e) => e.render(output),
        }
    }

    fn set_parameter(&mut self, param_id: u16, value: f32) {
        match self {
            Engine::Subtractive(e) => e.set_parameter(param_id, value),
            Engine::Fm(e) => e.set_parameter(param_id, value),
            Engine::Sampler(e) => e.set_parameter(param_id, value),
            Engine::Granular(e) => e.set_parameter(param_id, value),
            Engine::Wavetable(e) => e.set_parameter(param_id, value),
            Engine::FmDrum(e) => e.set_parameter(param_id, value),
            Engine::AnalogDrum(e) => e.set_parameter(param_id, value),
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        match self {
            Engine::Subtractive(e) => e.set_sample_rate(sample_rate),
            Engine::Fm(e) => e.set_sample_rate(sample_rate),
            Engine::Sampler(e) => e.set_sample_rate(sample_rate),
            Engine::Granular(e) => e.set_sample_rate(sample_rate),
            Engine::Wavetable(e) => e.set_sample_rate(sample_rate),
            Engine::FmDrum(e) => e.set_sample_rate(sample_rate),
            Engine::AnalogDrum(e) => e.set_sample_rate(sample_rate),
        }
    }

    fn all_notes_off(&mut self) {
        match self {
            Engine::Subtractive(e) => e.all_notes_off(),
            Engine::Fm(e) => e.all_notes_off(),
            Engine::Sampler(e) => e.all_notes_off(),
            Engine::Granular(e) => e.all_notes_off(),
            Engine::Wavetable(e) => e.all_notes_off(),
            Engine::FmDrum(e) => e.all_notes_off(),
            Engine::AnalogDrum(e) => e.all_notes_off(),
        }
    }

    fn is_active(&self) -> bool {
        match self {
            Engine::Subtractive(e) => e.is_active(),
            Engine::Fm(e) => e.is_active(),
            Engine::Sampler(e) => e.is_active(),
            Engine::Granular(e) => e.is_active(),
            Engine::Wavetable(e) => e.is_active(),
            Engine::FmDrum(e) => e.is_active(),
            Engine::AnalogDrum(e) => e.is_active(),
        }
    }

    fn is_chops_mode(&self) -> bool {
        match self {
            Engine::Sampler(e) => e.is_chops_mode(),
            _ => false,
        }
    }
}

/// `440 * 2^((note-69)/12)`, grounded on `original_source/AudioEngine.cpp`'s
/// `triggerNoteLocked` frequency calculation.
pub fn note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0f32.powf((note as f32 - 69.0) / 12.0)
}

/// Sentinel duration (~9.9e6 samples) meaning "held indefinitely until an
/// explicit release", matching `original_source`'s live-trigger duration.
pub const HELD_INDEFINITELY: f64 = 9_999_998.0;
