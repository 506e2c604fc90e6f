// src/config.rs

use serde::{Deserialize, Serialize};

/// Number of tracks the orchestrator carries. Matches `original_source`'s
/// `MAX_TRACKS` used throughout the routing matrix and track array.
pub const MAX_TRACKS: usize = 8;

/// Maximum simultaneously-sounding voices per track.
pub const MAX_POLYPHONY: usize = 16;

/// Number of fixed FX bus slots in the master effects graph.
pub const NUM_FX_SLOTS: usize = 15;

/// Number of independent orchestrator-owned LFOs available as modulation
/// sources (`RoutingSource::Lfo(0..5)`).
pub const NUM_LFOS: usize = 5;

/// Number of macro knobs available as modulation sources.
pub const NUM_MACROS: usize = 6;

/// Frames processed per control-rate sub-block. Modulation, LFO advance,
/// and the sequencer/arp clocks are only evaluated once per sub-block;
/// grounded on `original_source/AudioEngine.cpp`'s `kBlockSize`.
pub const SUB_BLOCK_SIZE: usize = 256;

/// Steps in the main/drum-lane sequencer pattern store.
pub const MAX_PATTERN_STEPS: usize = 128;

/// Parallel per-drum-voice lanes (one per General-MIDI-style drum slot).
pub const NUM_DRUM_LANES: usize = 16;

/// Size of a track's flat parameter table (base and applied), matching
/// `original_source/AudioEngine.h`'s `parameters[2500]` per-track array.
pub const NUM_PARAMETERS: usize = 2500;

/// Bound on simultaneously-tracked note-off timers per track (one per
/// `MAX_POLYPHONY` voice slot), grounded on spec §3's Active Note model.
pub const MAX_ACTIVE_NOTES: usize = MAX_POLYPHONY;

/// Number of audio frames of silence after which a track's render is
/// skipped as a sleep optimisation (spec §4.8 step 6).
pub const SILENCE_SLEEP_FRAMES: u32 = 48_000;

/// Frame count for the punch/accent saturation boost counter, kept as a
/// flat constant regardless of sample rate per spec §9 Open Question (iii).
pub const PUNCH_FRAMES: u32 = 4_000;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            buffer_size: 256,
            input_device: None,
            output_device: None,
        }
    }
}
