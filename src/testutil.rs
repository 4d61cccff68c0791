// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::{error::Error, fs::File, path::Path};

use hound::{SampleFormat, WavSpec, WavWriter};

/// Audio test utilities for generating test signals
pub mod audio_test_utils {
    use std::f64::consts::PI;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Generate a sine wave of the given frequency.
    pub fn generate_sine(
        frequency: f32,
        amplitude: f32,
        sample_rate: u32,
        sample_count: usize,
    ) -> Vec<f32> {
        generate_periodic_sine(sample_rate as f32 / frequency, amplitude, sample_count)
    }

    /// Generate a sine wave with a period of exactly `period` samples.
    pub fn generate_periodic_sine(period: f32, amplitude: f32, sample_count: usize) -> Vec<f32> {
        let theta = 2.0 * PI / period as f64;
        (0..sample_count)
            .map(|n| amplitude * (theta * n as f64).sin() as f32)
            .collect()
    }

    /// Generate low-level uniform noise, seeded so failures are reproducible.
    pub fn generate_noise(amplitude: f32, sample_count: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..sample_count)
            .map(|_| rng.gen_range(-amplitude..=amplitude))
            .collect()
    }

    /// A block that reads as speech: a full-scale-ish tone.
    pub fn speech_block(block: usize) -> Vec<f32> {
        generate_periodic_sine(48.0, 0.5, block)
    }

    /// A block that reads as silence: room noise well under the threshold.
    pub fn quiet_block(block: usize, seed: u64) -> Vec<f32> {
        generate_noise(0.001, block, seed)
    }
}

/// Writes planar samples to a WAV file.
pub fn write_wav<S: hound::Sample + Copy + 'static>(
    path: &Path,
    samples: &[Vec<S>],
    sample_rate: u32,
    bits_per_sample: u16,
) -> Result<(), Box<dyn Error>> {
    let tempwav = File::create(path)?;

    // Determine sample format based on the type
    let sample_format = if std::any::TypeId::of::<S>() == std::any::TypeId::of::<f32>() {
        SampleFormat::Float
    } else if std::any::TypeId::of::<S>() == std::any::TypeId::of::<i32>()
        || std::any::TypeId::of::<S>() == std::any::TypeId::of::<i16>()
    {
        SampleFormat::Int
    } else {
        return Err("Unsupported sample format".into());
    };

    let num_channels = samples.len();
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let mut writer = WavWriter::new(
        tempwav,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample,
            sample_format,
        },
    )?;

    let frames = samples.first().map(|c| c.len()).unwrap_or(0);
    for frame in 0..frames {
        for channel in samples {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;

    Ok(())
}
