// src/command.rs

//! The lock-free command surface between a UI/control thread and the audio
//! thread. Grounded on the teacher's `audio_engine/command.rs` (one big enum
//! pushed through a `ringbuf` producer/consumer pair) and on
//! `original_source/AudioEngine.h`'s own `AudioCommand`/MIDI-out-queue split
//! between a structured command channel and a flat MIDI event array.

use crate::engine::EngineKind;
use crate::fx::FxComponentKind;
use crate::modulation::{Macro, RoutingEntry};
use crate::sequencer::arpeggiator::{ArpMode, RhythmLanes};
use crate::sequencer::Step;
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::Arc;

/// Default command queue capacity. Sized generously: the UI thread can burst
/// many edits (e.g. pasting a pattern) between audio callbacks.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

pub fn command_channel() -> (HeapProducer<AudioCommand>, HeapConsumer<AudioCommand>) {
    HeapRb::<AudioCommand>::new(COMMAND_QUEUE_CAPACITY).split()
}

/// A MIDI-out event produced by the audio thread (e.g. a MIDI-passthrough
/// track) and drained by a UI/control thread that owns the actual MIDI port.
/// This crate never opens a MIDI port itself; grounded on
/// `original_source/AudioEngine.h`'s `fetchMidiEvents` flat-array API.
#[derive(Debug, Clone, Copy)]
pub struct MidiOutMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

#[derive(Debug)]
pub enum AudioCommand {
    // --- Transport ---
    Play,
    Stop,
    SetTempoBpm(f32),
    SetSwing(f32),

    // --- Track-level note input (live playing, recording into a step) ---
    NoteOn { track: usize, note: u8, velocity: u8 },
    NoteOff { track: usize, note: u8 },
    AllNotesOff { track: usize },

    // --- Track configuration ---
    SetEngineKind { track: usize, kind: EngineKind },
    SetEngineParameter { track: usize, param_id: u16, value: f32 },
    SetTrackVolume { track: usize, volume: f32 },
    SetTrackPan { track: usize, pan: f32 },
    SetTrackSend { track: usize, slot: usize, amount: f32 },
    LoadSample { track: usize, audio: Arc<Vec<f32>>, sample_rate: u32, slice_points: Vec<f32> },

    // --- Sequencer editing ---
    SetStep { track: usize, step_index: usize, step: Box<Step> },
    ClearStep { track: usize, step_index: usize },
    SetPatternLength { track: usize, length: usize },
    SetPlaybackDirection { track: usize, direction: crate::sequencer::PlaybackDirection },
    SetRandomOrder { track: usize, enabled: bool },
    SetDrumLaneStep { track: usize, lane: usize, step_index: usize, step: Box<Step> },
    ClearPattern { track: usize },

    // --- Arpeggiator ---
    SetArpMode { track: usize, mode: ArpMode },
    SetArpOctaves { track: usize, octaves: i32 },
    SetArpInversion { track: usize, inversion: i32 },
    SetArpRate { track: usize, rate: f32 },
    SetArpLatched { track: usize, latched: bool },
    SetArpRhythmLanes { track: usize, lanes: Box<RhythmLanes> },

    // --- Modulation matrix ---
    AddRouting { track: usize, entry: RoutingEntry },
    ClearRoutings { track: usize },
    SetMacro { index: usize, macro_def: Macro },

    // --- FX graph ---
    SetFxSlot { slot: usize, kind: Option<FxComponentKind> },
    SetFxChainDestination { slot: usize, destination: Option<usize> },
    SetFxParameter { slot: usize, param_id: u16, value: f32 },
    SetFxMix { slot: usize, wet_dry: f32 },

    SetMasterVolume(f32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_channel_round_trips() {
        let (mut producer, mut consumer) = command_channel();
        producer.push(AudioCommand::Play).unwrap();
        producer
            .push(AudioCommand::SetTempoBpm(128.0))
            .unwrap();
        match consumer.pop().unwrap() {
            AudioCommand::Play => {}
            other => panic!("unexpected command: {other:?}"),
        }
        match consumer.pop().unwrap() {
            AudioCommand::SetTempoBpm(bpm) => assert_eq!(bpm, 128.0),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
