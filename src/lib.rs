// src/lib.rs

//! A real-time multi-track groovebox audio core: per-track step sequencer +
//! arpeggiator, eight synthesis/sampler voice engines behind a uniform
//! [`engine::VoiceProducer`] trait, a modulation matrix, a 15-slot effects
//! graph, a microtiming scheduler, and a master limiter, driven by
//! [`orchestrator::AudioOrchestrator`] from a `cpal` (or any other) audio
//! callback. Grounded on the teacher's crate-root module layout
//! (`audio_engine` + supporting modules re-exported from `lib.rs`).

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod fx;
pub mod limiter;
pub mod modulation;
pub mod orchestrator;
pub mod persistence;
pub mod sequencer;
pub mod track;
pub mod wav;

pub use command::{command_channel, AudioCommand, MidiOutMessage, COMMAND_QUEUE_CAPACITY};
pub use config::EngineConfig;
pub use engine::EngineKind;
pub use orchestrator::{AudioOrchestrator, OrchestratorStatus};
