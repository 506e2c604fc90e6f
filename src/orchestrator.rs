// src/orchestrator.rs

//! The audio orchestrator: owns the eight tracks, the shared modulation and
//! FX graphs, and the master limiter, and runs the per-callback pipeline in
//! fixed 256-frame control-rate sub-blocks. Grounded on the teacher's
//! `audio_engine.rs` two-pass (gather-mods, then-render) `process_buffer`
//! design and on `original_source/AudioEngine.cpp`'s `onAudioReady`, which
//! this module's `process_subblock` follows step-for-step.

use crate::command::{AudioCommand, MidiOutMessage};
use crate::config::{
    MAX_ACTIVE_NOTES, MAX_TRACKS, NUM_DRUM_LANES, NUM_FX_SLOTS, SUB_BLOCK_SIZE,
};
use crate::engine::{param_ids, EngineKind, HELD_INDEFINITELY};
use crate::fx::FxGraph;
use crate::limiter::{release_ms_to_coeff, soft_clip, Limiter};
use crate::modulation::{ModulationSources, RoutingMatrix};
use crate::sequencer::arpeggiator::{arp_samples_per_step, ArpDivision, ArpMode};
use crate::sequencer::scheduler::{step_countdown_samples, FiredNote};
use crate::sequencer::{drum_lane_for_pitch, Sequencer, Step};
use crate::track::{SmoothedParam, Track};
use ringbuf::{HeapConsumer, HeapProducer};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Step firings drained per track per sub-block, spec §4.8 step 3.
const MAX_STEP_FIRES_PER_SUBBLOCK: usize = 4;
/// Arp firings drained per track per sub-block, spec §4.8 step 3.
const MAX_ARP_FIRES_PER_SUBBLOCK: usize = 8;

/// Lock-free status snapshot a UI/control thread polls (spec §5: "read
/// status atomics (CPU load, current step)"). CPU load is kept as a
/// fixed-point permille in an `AtomicU32` rather than an atomic float, since
/// stable Rust has no lock-free atomic `f32`.
pub struct OrchestratorStatus {
    pub playing: AtomicBool,
    pub current_step: [AtomicUsize; MAX_TRACKS],
    pub cpu_load_permille: AtomicU32,
}

impl Default for OrchestratorStatus {
    fn default() -> Self {
        Self {
            playing: AtomicBool::new(false),
            current_step: std::array::from_fn(|_| AtomicUsize::new(0)),
            cpu_load_permille: AtomicU32::new(0),
        }
    }
}

/// One externally-held (recording-armed) note, tracking where it started so
/// the matching note-off can compute a gate length in fractional steps
/// (spec §4.9).
#[derive(Debug, Clone, Copy, Default)]
struct RecordedNoteStart {
    pitch: u8,
    step_index: usize,
    global_step_at_press: u64,
    active: bool,
}

/// Per-track recording-arm state. Fixed-capacity: at most `MAX_ACTIVE_NOTES`
/// notes can be concurrently held and awaiting their note-off, matching the
/// track's own polyphony bound, so no allocation is needed on the audio
/// thread to track them.
#[derive(Debug, Default)]
struct RecordingState {
    armed: bool,
    global_step_count: u64,
    pressed: [RecordedNoteStart; MAX_ACTIVE_NOTES],
}

/// Sets the CPU's denormal flush-to-zero mode so that decaying envelopes,
/// filters, and delay taps collapsing toward (but never reaching) zero
/// don't fall into the denormal slow path. No crate in the example corpus
/// reaches for this; it is ordinary real-time-audio practice grounded on
/// the raw MXCSR flush-to-zero (bit 15) and denormals-are-zero (bit 6) bits.
#[inline]
fn flush_denormals_to_zero() {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use std::arch::x86_64::{_mm_getcsr, _mm_setcsr};
        let csr = _mm_getcsr();
        _mm_setcsr(csr | 0x8040);
    }
}

/// Owns every track plus the shared modulation/FX/limiter state and runs
/// the real-time callback. Grounded on `original_source/AudioEngine.h`'s
/// top-level `AudioEngine` class (tracks array, routing matrix, FX rack,
/// command queue, MIDI-out queue).
pub struct AudioOrchestrator {
    sample_rate: f32,
    tracks: Vec<Track>,
    tempo_bpm: f32,
    playing: bool,
    routing: RoutingMatrix,
    modulation: ModulationSources,
    fx: FxGraph,
    limiter: Limiter,
    limiter_threshold: f32,
    limiter_release_coeff: f32,
    master_volume: SmoothedParam,
    commands: HeapConsumer<AudioCommand>,
    midi_out: Option<HeapProducer<MidiOutMessage>>,
    recording: Vec<RecordingState>,
    /// Pitches currently physically held per track, tracked independently
    /// of the arpeggiator's own `held_notes` (which, once latched, survives
    /// a physical release). Used only to detect the "all physical keys are
    /// up" edge that drives [`Arpeggiator::on_all_physically_released`]
    /// (spec §4.4 latch semantics / §8 scenario 5).
    arp_physical_notes: Vec<Vec<u8>>,
    // Per-sub-block scratch buffers, sized once up front so the render/mix
    // pass never allocates.
    track_outputs: Box<[[f32; SUB_BLOCK_SIZE]; MAX_TRACKS]>,
    status: Arc<OrchestratorStatus>,
}

impl AudioOrchestrator {
    pub fn new(
        sample_rate: f32,
        commands: HeapConsumer<AudioCommand>,
        midi_out: Option<HeapProducer<MidiOutMessage>>,
    ) -> Self {
        Self {
            sample_rate,
            tracks: (0..MAX_TRACKS).map(|_| Track::new(EngineKind::Subtractive, sample_rate)).collect(),
            tempo_bpm: 120.0,
            playing: false,
            routing: RoutingMatrix::default(),
            modulation: ModulationSources::new(sample_rate),
            fx: FxGraph::new(sample_rate),
            limiter: Limiter::new(sample_rate),
            limiter_threshold: 0.95,
            limiter_release_coeff: release_ms_to_coeff(300.0, sample_rate),
            master_volume: SmoothedParam::new(0.9, 10.0, sample_rate),
            commands,
            midi_out,
            recording: (0..MAX_TRACKS).map(|_| RecordingState::default()).collect(),
            arp_physical_notes: (0..MAX_TRACKS).map(|_| Vec::with_capacity(MAX_ACTIVE_NOTES)).collect(),
            track_outputs: Box::new([[0.0; SUB_BLOCK_SIZE]; MAX_TRACKS]),
            status: Arc::new(OrchestratorStatus::default()),
        }
    }

    /// A cloneable handle to the lock-free status snapshot, for a UI/control
    /// thread to poll (spec §5).
    pub fn status(&self) -> Arc<OrchestratorStatus> {
        self.status.clone()
    }

    /// A track's currently applied value for a parameter id, post
    /// lock-then-modulation (spec §4.6). Grounded on
    /// `original_source/AudioEngine.h`'s `getAllTrackParameters` UI-sync
    /// getter; exposed per-id rather than as a whole-array snapshot since
    /// most callers want one knob's current position, not all 2500 slots.
    pub fn track_applied_parameter(&self, track: usize, param_id: u16) -> f32 {
        self.tracks.get(track).map(|t| t.applied_parameter(param_id)).unwrap_or(0.0)
    }

    /// Arms or disarms step-recording for a track (spec §4.9). Not routed
    /// through the command queue: unlike note/parameter events this is a
    /// coarse, infrequent UI gesture, so a direct call from the owning
    /// thread (which already serializes with the audio thread via the
    /// command queue for everything else) is simpler than adding a command
    /// variant for it.
    pub fn set_armed(&mut self, track: usize, armed: bool) {
        if let Some(state) = self.recording.get_mut(track) {
            state.armed = armed;
        }
    }

    /// Processes one driver-delivered output buffer (stereo interleaved
    /// float32) in fixed `SUB_BLOCK_SIZE` control-rate sub-blocks (spec
    /// §4.8).
    pub fn process_buffer(&mut self, output: &mut [f32]) {
        flush_denormals_to_zero();

        let total_frames = output.len() / 2;
        let mut offset = 0;
        while offset < total_frames {
            let chunk_frames = (total_frames - offset).min(SUB_BLOCK_SIZE);
            let chunk = &mut output[offset * 2..(offset + chunk_frames) * 2];
            self.process_subblock(chunk);
            offset += chunk_frames;
        }
    }

    fn process_subblock(&mut self, output: &mut [f32]) {
        let frames = output.len() / 2;
        let frames_f64 = frames as f64;

        // Step 2: drain UI -> audio commands.
        self.drain_commands();

        self.modulation.advance_block(frames);

        // Step 3: per-track step/arp clocks, bounded firing.
        for idx in 0..self.tracks.len() {
            self.advance_track_clock(idx, frames_f64);
        }

        // Step 5: decrement + fire the microtiming queue.
        if self.playing {
            for idx in 0..self.tracks.len() {
                let fired = self.tracks[idx].scheduler.advance_and_fire(frames_f64);
                for note in fired {
                    self.dispatch_fired_note(idx, note, frames_f64);
                }
            }
        }

        // Step 4 (applied after locks/firing per spec §4.6 precedence).
        for idx in 0..self.tracks.len() {
            self.apply_modulation_for_track(idx);
        }

        // Steps 6-9: render, FX, master mix + limiter, active-note decay.
        self.render_and_mix(output);
    }

    fn drain_commands(&mut self) {
        while let Some(command) = self.commands.pop() {
            self.handle_command(command);
        }
    }

    fn handle_command(&mut self, command: AudioCommand) {
        match command {
            AudioCommand::Play => {
                self.playing = true;
                self.status.playing.store(true, Ordering::Relaxed);
                self.fx.reset();
                for track in self.tracks.iter_mut() {
                    track.step_countdown_samples = 0.0;
                    track.arp_countdown_samples = 0.0;
                }
            }
            AudioCommand::Stop => {
                self.playing = false;
                self.status.playing.store(false, Ordering::Relaxed);
                for (idx, track) in self.tracks.iter_mut().enumerate() {
                    track.reset_transport();
                    self.status.current_step[idx].store(0, Ordering::Relaxed);
                }
            }
            AudioCommand::SetTempoBpm(bpm) => self.tempo_bpm = bpm.max(1.0),
            AudioCommand::SetSwing(amount) => {
                for track in self.tracks.iter_mut() {
                    track.sequencer.set_swing(amount);
                }
            }
            AudioCommand::NoteOn { track, note, velocity } => {
                if track < self.tracks.len() {
                    self.handle_note_on(track, note, velocity);
                }
            }
            AudioCommand::NoteOff { track, note } => {
                if track < self.tracks.len() {
                    self.handle_note_off(track, note);
                }
            }
            AudioCommand::AllNotesOff { track } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.all_notes_off();
                }
            }
            AudioCommand::SetEngineKind { track, kind } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.set_engine_kind(kind, self.sample_rate);
                }
            }
            AudioCommand::SetEngineParameter { track, param_id, value } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.set_base_parameter(param_id, value);
                    // Engine-specific ranges (150+) fall outside the common
                    // 0..200 block every step re-pushes, so a direct set must
                    // reach the engine immediately too, matching
                    // `original_source/AudioEngine.cpp::setParameter`'s
                    // straight-through write.
                    t.push_single_parameter(param_id, value);
                }
            }
            AudioCommand::SetTrackVolume { track, volume } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.volume.set_target(volume.clamp(0.0, 2.0));
                }
            }
            AudioCommand::SetTrackPan { track, pan } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.pan = pan.clamp(-1.0, 1.0);
                }
            }
            AudioCommand::SetTrackSend { track, slot, amount } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    if let Some(send) = t.sends.get_mut(slot) {
                        send.set_target(amount.clamp(0.0, 1.0));
                    }
                }
            }
            AudioCommand::LoadSample { track, audio, sample_rate, slice_points } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.load_sample(audio, sample_rate, slice_points);
                }
            }
            AudioCommand::SetStep { track, step_index, step } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.sequencer.set_step(step_index, *step);
                }
            }
            AudioCommand::ClearStep { track, step_index } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.sequencer.clear_step(step_index);
                }
            }
            AudioCommand::SetPatternLength { track, length } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.sequencer.set_configuration(1, length);
                    for lane in t.drum_lanes.iter_mut() {
                        lane.set_configuration(1, length);
                    }
                }
            }
            AudioCommand::SetPlaybackDirection { track, direction } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.sequencer.set_direction(direction);
                }
            }
            AudioCommand::SetRandomOrder { track, enabled } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.sequencer.set_random_order(enabled);
                }
            }
            AudioCommand::SetDrumLaneStep { track, lane, step_index, step } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    if let Some(l) = t.drum_lanes.get_mut(lane) {
                        l.set_step(step_index, *step);
                    }
                }
            }
            AudioCommand::ClearPattern { track } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.sequencer.clear();
                    for lane in t.drum_lanes.iter_mut() {
                        lane.clear();
                    }
                }
            }
            AudioCommand::SetArpMode { track, mode } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.arp.set_mode(mode);
                }
            }
            AudioCommand::SetArpOctaves { track, octaves } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.arp.set_octaves(octaves);
                }
            }
            AudioCommand::SetArpInversion { track, inversion } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.arp.set_inversion(inversion);
                }
            }
            AudioCommand::SetArpRate { track, rate } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.arp_rate = rate.max(0.125);
                }
            }
            AudioCommand::SetArpLatched { track, latched } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.arp.set_latched(latched);
                }
            }
            AudioCommand::SetArpRhythmLanes { track, lanes } => {
                if let Some(t) = self.tracks.get_mut(track) {
                    t.arp.set_rhythm_lanes(*lanes);
                }
            }
            AudioCommand::AddRouting { track, entry } => self.routing.add(track, entry),
            AudioCommand::ClearRoutings { track } => self.routing.clear(track),
            AudioCommand::SetMacro { index, macro_def } => {
                if let Some(m) = self.modulation.macros.get_mut(index) {
                    *m = macro_def;
                }
            }
            AudioCommand::SetFxSlot { slot, kind } => self.fx.set_slot(slot, kind),
            AudioCommand::SetFxChainDestination { slot, destination } => {
                self.fx.set_chain_destination(slot, destination);
            }
            AudioCommand::SetFxParameter { slot, param_id, value } => {
                self.fx.set_parameter(slot, param_id, value);
            }
            AudioCommand::SetFxMix { slot, wet_dry } => self.fx.set_wet_dry(slot, wet_dry),
            AudioCommand::SetMasterVolume(volume) => self.master_volume.set_target(volume.clamp(0.0, 2.0)),
        }
    }

    fn handle_note_on(&mut self, track: usize, note: u8, velocity: u8) {
        if self.tracks[track].engine_kind == EngineKind::MidiOut {
            self.push_midi_note_on(note, velocity);
        } else if self.tracks[track].arp.mode() != ArpMode::Off {
            if !self.arp_physical_notes[track].contains(&note) {
                self.arp_physical_notes[track].push(note);
            }
            self.tracks[track].arp.add_note(note);
        } else {
            let accent = velocity >= 100;
            self.tracks[track].trigger_note(note, velocity, HELD_INDEFINITELY, false, accent);
        }
        self.maybe_record_note_on(track, note, velocity);
    }

    fn handle_note_off(&mut self, track: usize, note: u8) {
        if self.tracks[track].engine_kind == EngineKind::MidiOut {
            self.push_midi_note_off(note);
        } else if self.tracks[track].arp.mode() != ArpMode::Off {
            self.tracks[track].arp.remove_note(note);
            if let Some(pos) = self.arp_physical_notes[track].iter().position(|&n| n == note) {
                self.arp_physical_notes[track].remove(pos);
            }
            if self.arp_physical_notes[track].is_empty() {
                self.tracks[track].arp.on_all_physically_released();
            }
        } else {
            self.tracks[track].release_note(note);
        }
        self.maybe_record_note_off(track, note);
    }

    /// The sequencer a recorded note-on/off should be written into: one of
    /// the 16 drum lanes if the track is drum-shaped and the pitch maps to
    /// one, otherwise the main sequencer (spec §4.3's step-edit routing
    /// rule, applied to §4.9's recording-armed note writes).
    fn recording_sequencer_mut(&mut self, track: usize, pitch: u8) -> &mut Sequencer {
        if self.tracks[track].uses_drum_lanes() {
            if let Some(lane) = drum_lane_for_pitch(pitch) {
                return &mut self.tracks[track].drum_lanes[lane];
            }
        }
        &mut self.tracks[track].sequencer
    }

    /// Spec §4.9: a note-on while armed and playing writes a new note onto
    /// the step under the playback cursor, with a sub-step offset derived
    /// from how far into that step the countdown has progressed.
    fn maybe_record_note_on(&mut self, track: usize, note: u8, velocity: u8) {
        if !self.playing || !self.recording[track].armed {
            return;
        }
        let step_index = self.recording_sequencer_mut(track, note).current_step_index();
        let global_step = self.recording[track].global_step_count;
        if let Some(slot) = self.recording[track].pressed.iter_mut().find(|p| !p.active) {
            *slot = RecordedNoteStart {
                pitch: note,
                step_index,
                global_step_at_press: global_step,
                active: true,
            };
        }
        let step_len = step_countdown_samples(self.sample_rate as f64, self.tempo_bpm, self.tracks[track].clock_multiplier);
        let elapsed = (step_len - self.tracks[track].step_countdown_samples).max(0.0);
        let offset = (elapsed / step_len).clamp(0.0, 0.999) as f32;
        if let Some(step) = self.recording_sequencer_mut(track, note).step_mut(step_index) {
            step.add_note(note, velocity, offset);
        }
    }

    /// Spec §4.9: on the matching note-off, the gate length in fractional
    /// steps is computed from the elapsed global step count (plus the
    /// fractional progress into the current step) and clamped to `[0.1,16]`.
    fn maybe_record_note_off(&mut self, track: usize, note: u8) {
        if !self.playing || !self.recording[track].armed {
            return;
        }
        let global_step_now = self.recording[track].global_step_count;
        let step_len = step_countdown_samples(self.sample_rate as f64, self.tempo_bpm, self.tracks[track].clock_multiplier);
        let frac = ((step_len - self.tracks[track].step_countdown_samples) / step_len).clamp(0.0, 1.0) as f32;

        let found = self.recording[track]
            .pressed
            .iter_mut()
            .find(|p| p.active && p.pitch == note);
        let Some(slot) = found else { return };
        let elapsed_steps = global_step_now.saturating_sub(slot.global_step_at_press) as f32;
        let gate_steps = Step::clamp_gate(elapsed_steps + frac);
        let step_index = slot.step_index;
        slot.active = false;

        if let Some(step) = self.recording_sequencer_mut(track, note).step_mut(step_index) {
            step.gate_steps = gate_steps;
        }
    }

    fn push_midi_note_on(&mut self, pitch: u8, velocity: u8) {
        if let Some(producer) = self.midi_out.as_mut() {
            let _ = producer.push(MidiOutMessage { status: 0x90, data1: pitch, data2: velocity });
        }
    }

    fn push_midi_note_off(&mut self, pitch: u8) {
        if let Some(producer) = self.midi_out.as_mut() {
            let _ = producer.push(MidiOutMessage { status: 0x80, data1: pitch, data2: 0 });
        }
    }

    /// Advances one track's step and arp countdowns by `frames`, firing
    /// step boundaries (main sequencer or, for drum-shaped engines, all 16
    /// lanes in lockstep) and arp ticks, each bounded per spec §4.8 step 3.
    fn advance_track_clock(&mut self, idx: usize, frames: f64) {
        if !self.playing {
            return;
        }
        let sample_rate = self.sample_rate as f64;

        self.tracks[idx].step_countdown_samples -= frames;
        let mut immediate: Vec<FiredNote> = Vec::new();
        let mut fires = 0;
        while self.tracks[idx].step_countdown_samples <= 0.0 && fires < MAX_STEP_FIRES_PER_SUBBLOCK {
            let samples_per_step = step_countdown_samples(sample_rate, self.tempo_bpm, self.tracks[idx].clock_multiplier);
            if self.tracks[idx].uses_drum_lanes() {
                for lane in 0..NUM_DRUM_LANES {
                    let fired = self.tracks[idx].fire_drum_lane_step(lane, samples_per_step);
                    immediate.extend(fired);
                }
            } else {
                let fired = self.tracks[idx].fire_main_step(samples_per_step);
                immediate.extend(fired);
            }
            self.tracks[idx].step_countdown_samples += samples_per_step;
            self.recording[idx].global_step_count += 1;
            self.status.current_step[idx].store(self.tracks[idx].sequencer.current_step_index(), Ordering::Relaxed);
            fires += 1;
        }
        for note in immediate {
            self.dispatch_fired_note(idx, note, frames);
        }

        self.tracks[idx].arp_countdown_samples -= frames;
        let mut arp_fires = 0;
        while self.tracks[idx].arp.mode() != ArpMode::Off
            && self.tracks[idx].arp_countdown_samples <= 0.0
            && arp_fires < MAX_ARP_FIRES_PER_SUBBLOCK
        {
            let samples_per_step = step_countdown_samples(sample_rate, self.tempo_bpm, self.tracks[idx].clock_multiplier);
            let arp_step_samples = arp_samples_per_step(samples_per_step, self.tracks[idx].arp_rate, ArpDivision::Straight);
            let pitches = self.tracks[idx].fire_arp_step();
            for pitch in pitches {
                self.dispatch_arp_note(idx, pitch, arp_step_samples);
            }
            self.tracks[idx].arp_countdown_samples += arp_step_samples;
            arp_fires += 1;
        }
    }

    fn dispatch_fired_note(&mut self, idx: usize, note: FiredNote, frames: f64) {
        if self.tracks[idx].engine_kind == EngineKind::MidiOut {
            self.push_midi_note_on(note.pitch, note.velocity);
            return;
        }
        let samples_per_step = step_countdown_samples(self.sample_rate as f64, self.tempo_bpm, self.tracks[idx].clock_multiplier);
        let duration = ((note.gate_steps as f64) * samples_per_step).max(frames);
        let legato = note.gate_steps > 0.9;
        self.tracks[idx].trigger_note(note.pitch, note.velocity, duration, legato, note.accent);
    }

    fn dispatch_arp_note(&mut self, idx: usize, pitch: u8, arp_step_samples: f64) {
        if self.tracks[idx].engine_kind == EngineKind::MidiOut {
            self.push_midi_note_on(pitch, 100);
            return;
        }
        let duration = (arp_step_samples * 0.9).max(1.0);
        self.tracks[idx].trigger_note(pitch, 100, duration, false, false);
    }

    /// Spec §4.6 / §8 scenario 3: modulation composes onto each
    /// destination's *currently applied* value — i.e. after that step's
    /// parameter locks have already landed — not the raw base array, so a
    /// lock isn't silently clobbered by modulation within the same step.
    /// Track 0's envelope follower doubles as the global sidechain source —
    /// the spec names a `SidechainFollower` modulation source but never
    /// specifies which track feeds it, so the first track is the
    /// documented choice (see DESIGN.md).
    fn apply_modulation_for_track(&mut self, idx: usize) {
        let envelope = self.tracks[idx].envelope_follower_value();
        let sidechain = self.tracks[0].envelope_follower_value();
        let base_volume = self.tracks[idx].volume.current();
        let base_pitch = 0.0f32;
        let base_filter_cutoff = self.tracks[idx].applied_parameter(param_ids::FILTER_CUTOFF);

        let (volume, _pitch, filter_cutoff, params) = self.modulation.apply_routings(
            self.routing.connections(idx),
            base_volume,
            base_pitch,
            base_filter_cutoff,
            envelope,
            sidechain,
            |id| self.tracks[idx].applied_parameter(id),
        );

        self.tracks[idx].volume.set_target(volume);
        self.tracks[idx].push_single_parameter(param_ids::FILTER_CUTOFF, filter_cutoff);
        for (id, value) in params {
            self.tracks[idx].push_single_parameter(id, value);
        }
    }

    /// Spec §4.8 steps 6-9: renders every track, accumulates the panned dry
    /// mix and FX sends per sample, processes the FX graph, sums the final
    /// mix through the stereo-linked limiter and soft-clip, then decrements
    /// active-note timers for the samples just produced.
    fn render_and_mix(&mut self, output: &mut [f32]) {
        let frames = output.len() / 2;

        for idx in 0..self.tracks.len() {
            let buf = &mut self.track_outputs[idx][..frames];
            self.tracks[idx].render(buf);
        }

        for i in 0..frames {
            let mut dry_l = 0.0f32;
            let mut dry_r = 0.0f32;
            for idx in 0..self.tracks.len() {
                let mono = self.track_outputs[idx][i];
                let (l, r) = self.tracks[idx].pan_to_stereo(mono);
                dry_l += l;
                dry_r += r;
                for slot in 0..NUM_FX_SLOTS {
                    let send = self.tracks[idx].sends[slot].tick();
                    if send.abs() > 1e-6 {
                        self.fx.accumulate_send(slot, mono, send);
                    }
                }
            }

            let (master_wet, stereo_wet_l, stereo_wet_r) = self.fx.process_sample();
            let master_vol = self.master_volume.tick();
            let mixed_l = (dry_l + master_wet + stereo_wet_l) * master_vol * 2.0;
            let mixed_r = (dry_r + master_wet + stereo_wet_r) * master_vol * 2.0;

            let link = mixed_l.abs().max(mixed_r.abs());
            let gain = self.limiter.gain_for(link, self.limiter_threshold, self.limiter_release_coeff);

            output[i * 2] = soft_clip(mixed_l * gain);
            output[i * 2 + 1] = soft_clip(mixed_r * gain);
        }

        let mut released_buf = [0u8; MAX_ACTIVE_NOTES];
        for idx in 0..self.tracks.len() {
            self.tracks[idx].decrement_active_notes(frames as f64);

            let mut released_len = 0usize;
            for pitch in self.tracks[idx].drain_released() {
                if released_len < released_buf.len() {
                    released_buf[released_len] = pitch;
                    released_len += 1;
                }
            }
            if self.tracks[idx].engine_kind == EngineKind::MidiOut {
                for &pitch in &released_buf[..released_len] {
                    self.push_midi_note_off(pitch);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::command_channel;
    use crate::sequencer::PlaybackDirection;

    fn silent_orchestrator() -> (AudioOrchestrator, ringbuf::HeapProducer<AudioCommand>) {
        let (producer, consumer) = command_channel();
        (AudioOrchestrator::new(48_000.0, consumer, None), producer)
    }

    #[test]
    fn idle_orchestrator_produces_silence() {
        let (mut orch, _producer) = silent_orchestrator();
        let mut buf = [1.0f32; 512];
        orch.process_buffer(&mut buf);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn live_note_on_produces_audible_output() {
        let (mut orch, mut producer) = silent_orchestrator();
        producer.push(AudioCommand::NoteOn { track: 0, note: 60, velocity: 110 }).unwrap();
        let mut buf = [0.0f32; 1024];
        orch.process_buffer(&mut buf);
        assert!(buf.iter().any(|&s| s.abs() > 1e-4));
    }

    #[test]
    fn programmed_step_fires_while_playing() {
        let (mut orch, mut producer) = silent_orchestrator();
        let mut step = Step {
            probability: 1.0,
            gate_steps: 2.0,
            ratchet: 1,
            ..Step::default()
        };
        step.add_note(64, 120, 0.0);
        producer.push(AudioCommand::SetStep { track: 0, step_index: 0, step: Box::new(step) }).unwrap();
        producer.push(AudioCommand::SetTempoBpm(300.0)).unwrap();
        producer.push(AudioCommand::Play).unwrap();

        let mut heard = false;
        let mut buf = [0.0f32; 2048];
        for _ in 0..20 {
            orch.process_buffer(&mut buf);
            if buf.iter().any(|&s| s.abs() > 1e-4) {
                heard = true;
                break;
            }
        }
        assert!(heard);
    }

    #[test]
    fn transport_stop_clears_status_and_stays_finite() {
        let (mut orch, mut producer) = silent_orchestrator();
        producer.push(AudioCommand::NoteOn { track: 0, note: 60, velocity: 110 }).unwrap();
        let mut warmup = [0.0f32; 256];
        orch.process_buffer(&mut warmup);

        producer.push(AudioCommand::Stop).unwrap();
        let mut buf = [0.0f32; 1024];
        orch.process_buffer(&mut buf);
        assert!(buf.iter().all(|s| s.is_finite()));
        assert!(!orch.status().playing.load(Ordering::Relaxed));
    }

    #[test]
    fn master_output_stays_finite_with_saturated_sends() {
        let (mut orch, mut producer) = silent_orchestrator();
        producer.push(AudioCommand::SetMasterVolume(5.0)).unwrap();
        producer.push(AudioCommand::NoteOn { track: 0, note: 36, velocity: 127 }).unwrap();
        producer
            .push(AudioCommand::SetFxSlot { slot: 0, kind: Some(crate::fx::FxComponentKind::Overdrive) })
            .unwrap();
        let mut buf = [0.0f32; 2048];
        orch.process_buffer(&mut buf);
        assert!(buf.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn latched_arp_clears_old_gesture_only_once_all_physical_notes_are_up() {
        use crate::sequencer::arpeggiator::ArpMode;

        let (mut orch, mut producer) = silent_orchestrator();
        producer.push(AudioCommand::SetArpMode { track: 0, mode: ArpMode::Up }).unwrap();
        producer.push(AudioCommand::SetArpLatched { track: 0, latched: true }).unwrap();
        producer.push(AudioCommand::NoteOn { track: 0, note: 60, velocity: 100 }).unwrap();
        producer.push(AudioCommand::NoteOn { track: 0, note: 64, velocity: 100 }).unwrap();
        let mut buf = [0.0f32; 64];
        orch.process_buffer(&mut buf);

        // Releasing only one of two held notes must not start a new gesture.
        producer.push(AudioCommand::NoteOff { track: 0, note: 60 }).unwrap();
        orch.process_buffer(&mut buf);
        assert_eq!(orch.tracks[0].arp.held_notes(), &[60, 64]);

        // Releasing the last physically-held note arms the next add_note to
        // replace the gesture instead of extending it.
        producer.push(AudioCommand::NoteOff { track: 0, note: 64 }).unwrap();
        orch.process_buffer(&mut buf);
        producer.push(AudioCommand::NoteOn { track: 0, note: 67, velocity: 100 }).unwrap();
        orch.process_buffer(&mut buf);
        assert_eq!(orch.tracks[0].arp.held_notes(), &[67]);
    }

    #[test]
    fn recording_drum_engine_note_writes_to_its_drum_lane_not_the_main_sequencer() {
        let (mut orch, mut producer) = silent_orchestrator();
        producer
            .push(AudioCommand::SetEngineKind { track: 0, kind: EngineKind::AnalogDrum })
            .unwrap();
        producer.push(AudioCommand::Play).unwrap();
        orch.set_armed(0, true);

        // Pitch 61 maps to drum lane 1 (spec §4.3: 60..75 -> lane 0..15).
        producer.push(AudioCommand::NoteOn { track: 0, note: 61, velocity: 100 }).unwrap();
        producer.push(AudioCommand::NoteOff { track: 0, note: 61 }).unwrap();
        let mut buf = [0.0f32; 64];
        orch.process_buffer(&mut buf);

        assert!(orch.tracks[0].drum_lanes[1].steps()[0].active);
        assert!(!orch.tracks[0].sequencer.steps()[0].active);
    }

    #[test]
    fn pattern_length_command_clamps_through_to_sequencer() {
        let (mut orch, mut producer) = silent_orchestrator();
        producer.push(AudioCommand::SetPatternLength { track: 0, length: 4 }).unwrap();
        producer
            .push(AudioCommand::SetPlaybackDirection { track: 0, direction: PlaybackDirection::Backward })
            .unwrap();
        let mut buf = [0.0f32; 256];
        orch.process_buffer(&mut buf);
        assert_eq!(orch.tracks[0].sequencer.total_steps(), 4);
    }
}
