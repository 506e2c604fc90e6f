// src/wav.rs

//! RIFF/WAVE codec with the custom `slce` slice-position chunk, grounded on
//! `original_source/WavFileUtils.h`. Sample data itself is written through
//! `hound` (the teacher's own choice in `audio_engine/helpers.rs`), since
//! `hound` does not expose arbitrary chunk I/O; the `slce` chunk is
//! appended/read by this module directly, matching the original's own
//! hand-rolled chunk loop.

use crate::error::Result;
use anyhow::anyhow;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A loaded WAV file: mono-summed or per-channel interleaved samples
/// normalized to `[-1.0, 1.0]`, plus any slice markers (in samples).
#[derive(Debug, Clone, Default)]
pub struct WavData {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub slice_points: Vec<f32>,
}

pub fn load_wav(path: &Path) -> Result<WavData> {
    let mut file = File::open(path)?;
    let mut riff_header = [0u8; 12];
    file.read_exact(&mut riff_header)?;
    if &riff_header[0..4] != b"RIFF" || &riff_header[8..12] != b"WAVE" {
        log::warn!("{}: not a RIFF/WAVE file", path.display());
        return Err(anyhow!("not a RIFF/WAVE file: {}", path.display()));
    }

    let mut channels: u16 = 1;
    let mut sample_rate: u32 = 44_100;
    let mut bits_per_sample: u16 = 16;
    let mut audio_format: u16 = 1;
    let mut samples = Vec::new();
    let mut slice_points = Vec::new();
    let mut found_data = false;

    loop {
        let mut chunk_id = [0u8; 4];
        if file.read_exact(&mut chunk_id).is_err() {
            break; // end of file
        }
        let mut size_bytes = [0u8; 4];
        file.read_exact(&mut size_bytes)?;
        let chunk_size = u32::from_le_bytes(size_bytes) as usize;

        match &chunk_id {
            b"fmt " => {
                let mut buf = vec![0u8; chunk_size];
                file.read_exact(&mut buf)?;
                audio_format = u16::from_le_bytes([buf[0], buf[1]]);
                channels = u16::from_le_bytes([buf[2], buf[3]]);
                sample_rate = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
                bits_per_sample = u16::from_le_bytes([buf[14], buf[15]]);
                if audio_format != 1 && audio_format != 3 {
                    log::warn!(
                        "{}: unsupported WAV format tag {}, expected PCM(1) or IEEE float(3)",
                        path.display(),
                        audio_format
                    );
                    return Err(anyhow!("unsupported WAV format tag {}", audio_format));
                }
            }
            b"data" => {
                found_data = true;
                let mut buf = vec![0u8; chunk_size];
                file.read_exact(&mut buf)?;
                samples = decode_samples(&buf, audio_format, bits_per_sample);
            }
            b"slce" => {
                let mut count_bytes = [0u8; 4];
                file.read_exact(&mut count_bytes)?;
                let num_slices = u32::from_le_bytes(count_bytes) as usize;
                slice_points.reserve(num_slices);
                for _ in 0..num_slices {
                    let mut f_bytes = [0u8; 4];
                    file.read_exact(&mut f_bytes)?;
                    slice_points.push(f32::from_le_bytes(f_bytes));
                }
            }
            _ => {
                // Skip chunks we don't understand, matching the original's
                // `file.ignore(chunkSize)` unknown-chunk behavior.
                file.seek(SeekFrom::Current(chunk_size as i64))?;
            }
        }
        // RIFF chunks are word-aligned; skip the pad byte if size is odd.
        if chunk_size % 2 == 1 {
            file.seek(SeekFrom::Current(1))?;
        }
    }

    if !found_data {
        log::warn!("{}: no data chunk found", path.display());
        return Err(anyhow!("no data chunk found in {}", path.display()));
    }

    Ok(WavData {
        samples,
        channels,
        sample_rate,
        slice_points,
    })
}

/// Resamples interleaved audio from `source_rate` to `target_rate`, grounded
/// on the teacher's `load_and_resample_wav_for_session` (`audio_engine.rs`),
/// which reaches for the same sinc-windowed `rubato` resampler. Intended to
/// be called once at load time, off the audio thread, before a loaded
/// sample is handed to a track via `LoadSample` — the sampler engine itself
/// still corrects residual rate drift per-voice through its pitch ratio.
pub fn resample_to_rate(samples: &[f32], channels: u16, source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let channels = (channels as usize).max(1);
    let frames = samples.len() / channels;
    let mut deinterleaved: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (channel, &sample) in frame.iter().enumerate() {
            deinterleaved[channel].push(sample);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        target_rate as f64 / source_rate as f64,
        2.0,
        params,
        frames,
        channels,
    )?;
    let waves_out = resampler.process(&deinterleaved, None)?;

    let out_frames = waves_out.first().map(Vec::len).unwrap_or(0);
    let mut interleaved = Vec::with_capacity(out_frames * channels);
    for frame_idx in 0..out_frames {
        for channel in waves_out.iter() {
            interleaved.push(channel[frame_idx]);
        }
    }
    Ok(interleaved)
}

fn decode_samples(buf: &[u8], audio_format: u16, bits_per_sample: u16) -> Vec<f32> {
    match (audio_format, bits_per_sample) {
        (1, 16) => buf
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32767.0)
            .collect(),
        (3, 32) => buf
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        _ => {
            log::warn!(
                "unsupported sample layout (format {audio_format}, {bits_per_sample} bits); returning silence"
            );
            Vec::new()
        }
    }
}

/// Writes 16-bit PCM mono audio plus an optional `slce` chunk, grounded on
/// the teacher's `write_wav_file` (via `hound`) with the custom chunk
/// appended afterwards, mirroring `original_source/WavFileUtils.h::writeWav`.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, slice_points: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    {
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in samples {
            let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(sample_i16)?;
        }
        writer.finalize()?;
    }

    if slice_points.is_empty() {
        return Ok(());
    }

    append_slice_chunk(path, slice_points)?;
    Ok(())
}

fn append_slice_chunk(path: &Path, slice_points: &[f32]) -> Result<()> {
    let mut chunk_body = Vec::with_capacity(4 + slice_points.len() * 4);
    chunk_body.extend_from_slice(&(slice_points.len() as u32).to_le_bytes());
    for &s in slice_points {
        chunk_body.extend_from_slice(&s.to_le_bytes());
    }
    let chunk_size = chunk_body.len() as u32;

    let mut file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::End(0))?;
    file.write_all(b"slce")?;
    file.write_all(&chunk_size.to_le_bytes())?;
    file.write_all(&chunk_body)?;
    if chunk_size % 2 == 1 {
        file.write_all(&[0u8])?;
    }

    // Patch the RIFF container size to include the new chunk.
    let total_len = file.stream_position()?;
    file.seek(SeekFrom::Start(4))?;
    file.write_all(&((total_len as u32).saturating_sub(8)).to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn round_trips_samples_and_slice_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wav");
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let slices = vec![0.0, 250.0, 500.0, 750.0];

        write_wav(&path, &samples, 48_000, &slices).unwrap();
        let loaded = load_wav(&path).unwrap();

        assert_eq!(loaded.sample_rate, 48_000);
        assert_eq!(loaded.samples.len(), samples.len());
        for (a, b) in loaded.samples.iter().zip(samples.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-3);
        }
        assert_eq!(loaded.slice_points, slices);
    }

    #[test]
    fn resample_to_rate_changes_frame_count_and_preserves_silence() {
        let samples = vec![0.0f32; 4800];
        let resampled = resample_to_rate(&samples, 1, 48_000, 44_100).unwrap();
        assert!(!resampled.is_empty());
        assert!(resampled.iter().all(|&s| s.abs() < 1e-6));
    }

    #[test]
    fn resample_to_rate_is_a_no_op_when_rates_match() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32 * 0.01).collect();
        let resampled = resample_to_rate(&samples, 1, 48_000, 48_000).unwrap();
        assert_eq!(resampled, samples);
    }

    #[test]
    fn rejects_non_riff_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        std::fs::write(&path, b"not a wav file at all").unwrap();
        assert!(load_wav(&path).is_err());
    }
}
