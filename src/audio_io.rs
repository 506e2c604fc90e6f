// src/audio_io.rs

//! Builds and drives the `cpal` output stream that calls into
//! [`groovebox_core::orchestrator::AudioOrchestrator`] every callback. Adapted from
//! the teacher's `audio_io.rs`/`audio_device.rs`: this crate has no looper
//! input path, so only the output half survives, generalized over sample
//! format the same way the teacher's `build_output_stream` was.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use groovebox_core::error::Result;
use groovebox_core::orchestrator::AudioOrchestrator;
use cpal::{BufferSize, Device, FromSample, HostId, Sample, SampleFormat, Stream, StreamConfig};

pub fn get_output_devices(host_id: HostId) -> Result<Vec<(String, Device)>> {
    let host = cpal::host_from_id(host_id)?;
    let mut result = Vec::new();
    for device in host.output_devices()? {
        if let Ok(name) = device.name() {
            result.push((name, device));
        }
    }
    Ok(result)
}

/// Opens the named (or default) output device and starts a stream that
/// drains `orchestrator`'s stereo mix into it every callback. Returns the
/// live `Stream` (dropping it stops audio) plus the negotiated sample rate
/// and buffer size.
pub fn start_output_stream(
    host_id: HostId,
    output_device_name: Option<String>,
    requested_sample_rate: Option<u32>,
    requested_buffer_size: Option<u32>,
    orchestrator: AudioOrchestrator,
) -> Result<(Stream, u32, u32)> {
    let host = cpal::host_from_id(host_id)?;
    let output_device = if let Some(name) = &output_device_name {
        host.output_devices()?
            .find(|d| d.name().ok().as_ref() == Some(name))
            .ok_or_else(|| anyhow::anyhow!("output device not found: {name}"))?
    } else {
        host.default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no default output device"))?
    };
    log::info!("using output device: {}", output_device.name()?);

    let default_config = output_device.default_output_config()?;
    let sample_format = default_config.sample_format();

    let mut config: StreamConfig = default_config.into();
    config.channels = 2;
    if let Some(sr) = requested_sample_rate {
        config.sample_rate = cpal::SampleRate(sr);
    }
    if let Some(bs) = requested_buffer_size {
        config.buffer_size = BufferSize::Fixed(bs);
    }

    let stream = match sample_format {
        SampleFormat::F32 => build_output_stream::<f32>(&output_device, &config, orchestrator)?,
        SampleFormat::I16 => build_output_stream::<i16>(&output_device, &config, orchestrator)?,
        SampleFormat::U16 => build_output_stream::<u16>(&output_device, &config, orchestrator)?,
        format => return Err(anyhow::anyhow!("unsupported sample format {format}")),
    };
    stream.play()?;

    let active_sr = config.sample_rate.0;
    let active_bs = match config.buffer_size {
        BufferSize::Fixed(size) => size,
        BufferSize::Default => 512,
    };
    log::info!("started output stream at {active_sr} Hz, buffer {active_bs} frames");

    Ok((stream, active_sr, active_bs))
}

fn build_output_stream<T>(device: &Device, config: &StreamConfig, mut orchestrator: AudioOrchestrator) -> Result<Stream>
where
    T: Sample + cpal::SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut stereo_buffer: Vec<f32> = Vec::new();

    let err_fn = |err| log::error!("output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            stereo_buffer.resize(frames * 2, 0.0);
            orchestrator.process_buffer(&mut stereo_buffer);

            for (i, frame) in data.chunks_mut(channels).enumerate() {
                let (l, r) = (stereo_buffer[i * 2], stereo_buffer[i * 2 + 1]);
                for (ch, sample) in frame.iter_mut().enumerate() {
                    let value = if ch % 2 == 0 { l } else { r };
                    *sample = T::from_sample(value);
                }
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
