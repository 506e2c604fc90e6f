// src/main.rs

//! A thin `cpal` demo host: opens the default output device, spins up an
//! [`AudioOrchestrator`], programs a short pattern on track 0, and lets it
//! play for a few seconds. Adapted from the teacher's `audio_io.rs`-driven
//! `main.rs`; there is no GUI here (the library is the deliverable), just
//! enough wiring to manually smoke-test a real sound card.

mod audio_io;

use cpal::traits::HostTrait;
use groovebox_core::command::{command_channel, AudioCommand};
use groovebox_core::engine::EngineKind;
use groovebox_core::error::{self, Result};
use groovebox_core::orchestrator::AudioOrchestrator;
use groovebox_core::sequencer::Step;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    error::init_logging();

    let (mut producer, consumer) = command_channel();
    let orchestrator = AudioOrchestrator::new(48_000.0, consumer, None);

    let (stream, sample_rate, buffer_size) =
        audio_io::start_output_stream(cpal::default_host().id(), None, Some(48_000), None, orchestrator)?;
    log::info!("audio running at {sample_rate} Hz, {buffer_size}-frame buffer");

    producer.push(AudioCommand::SetEngineKind { track: 0, kind: EngineKind::Subtractive }).unwrap();
    producer.push(AudioCommand::SetTrackVolume { track: 0, volume: 0.9 }).unwrap();
    producer.push(AudioCommand::SetTempoBpm(120.0)).unwrap();

    for (index, pitch) in [60u8, 63, 67, 70].into_iter().enumerate() {
        let mut step = Step { active: true, probability: 1.0, gate_steps: 0.9, ratchet: 1, ..Step::default() };
        step.add_note(pitch, 110, 0.0);
        producer
            .push(AudioCommand::SetStep { track: 0, step_index: index * 4, step: Box::new(step) })
            .unwrap();
    }
    producer.push(AudioCommand::Play).unwrap();

    thread::sleep(Duration::from_secs(4));

    producer.push(AudioCommand::Stop).unwrap();
    thread::sleep(Duration::from_millis(200));
    drop(stream);

    Ok(())
}
