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

//! Offline rendering: runs a stream session over a WAV file block by block,
//! exactly as a live host would, and writes the result as 32-bit float WAV.

use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{info, warn};

use crate::audio::BlockProcessor;
use crate::config::{ConfigError, Settings};
use crate::control::ControlMessage;
use crate::session::StreamSession;
use crate::util::seconds;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("{} contains no audio", .0.display())]
    Empty(PathBuf),

    #[error("unsupported WAV format: {bits}-bit {format}")]
    UnsupportedFormat { format: &'static str, bits: u16 },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// How to run a render.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Engine settings. The sample rate is taken from the input file.
    pub settings: Settings,
    /// Delivered through the control queue before the first block.
    pub messages: Vec<ControlMessage>,
}

/// What a render did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    /// Input frames per channel.
    pub frames: usize,
    /// Blocks processed, the last one zero-padded.
    pub blocks: usize,
    pub channels: usize,
    pub sample_rate: u32,
}

/// Reads a WAV file into planar `f32` samples scaled to `[-1, 1]`.
pub fn read_planar(path: &Path) -> Result<(Vec<Vec<f32>>, WavSpec), RenderError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ 8..=32) => {
            let scale = 1.0 / (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|s| s as f32 * scale))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, bits) => {
            return Err(RenderError::UnsupportedFormat {
                format: "float",
                bits,
            })
        }
        (SampleFormat::Int, bits) => {
            return Err(RenderError::UnsupportedFormat {
                format: "int",
                bits,
            })
        }
    };

    let frames = interleaved.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }
    Ok((planar, spec))
}

/// Renders `input` through a stream session into `output`.
pub fn render_file(
    input: &Path,
    output: &Path,
    options: &RenderOptions,
) -> Result<RenderStats, RenderError> {
    let (planar, spec) = read_planar(input)?;
    let frames = planar.first().map(|c| c.len()).unwrap_or(0);
    if frames == 0 {
        return Err(RenderError::Empty(input.to_path_buf()));
    }

    let mut settings = options.settings.clone();
    settings.set_sample_rate(spec.sample_rate);
    let block_size = settings.block_size();
    let channels = planar.len();

    let mut session = StreamSession::from_settings(&settings)?;
    let control = session.open_control(settings.control_capacity());
    for message in &options.messages {
        if let Err(e) = control.send(*message) {
            warn!(err = %e, ?message, "Dropping control message");
        }
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        frames,
        channels,
        sample_rate = spec.sample_rate,
        duration = seconds(frames, spec.sample_rate),
        "Rendering"
    );

    let mut writer = WavWriter::create(
        output,
        WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let mut in_blocks = vec![vec![0.0f32; block_size]; channels];
    let mut out_blocks = vec![vec![0.0f32; block_size]; channels];
    let blocks = frames.div_ceil(block_size);
    for block in 0..blocks {
        let start = block * block_size;
        let end = (start + block_size).min(frames);
        for (staged, source) in in_blocks.iter_mut().zip(&planar) {
            staged[..end - start].copy_from_slice(&source[start..end]);
            staged[end - start..].fill(0.0);
        }

        let input: Vec<&[f32]> = in_blocks.iter().map(|b| b.as_slice()).collect();
        let mut output: Vec<&mut [f32]> = out_blocks.iter_mut().map(|b| b.as_mut_slice()).collect();
        session.process(&input, &mut output);

        for i in 0..block_size {
            for channel in &out_blocks {
                writer.write_sample(channel[i])?;
            }
        }
    }
    writer.finalize()?;

    if let Some(beat_sync) = session.beat_sync() {
        info!(
            drift = beat_sync.drift_seconds(),
            delay = seconds(beat_sync.buffered_samples() as usize, spec.sample_rate),
            "Beat sync finished"
        );
    }

    Ok(RenderStats {
        frames,
        blocks,
        channels,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::testutil::audio_test_utils::{generate_noise, generate_periodic_sine};
    use crate::testutil::write_wav;

    fn settings(yaml: &str) -> Settings {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_passthrough_render_preserves_audio() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");

        let left: Vec<i16> = (0..1000).map(|i| ((i % 200) * 100 - 10000) as i16).collect();
        let right: Vec<i16> = left.iter().map(|s| -s).collect();
        write_wav(&input, &[left.clone(), right.clone()], 44100, 16)?;

        let options = RenderOptions {
            settings: settings("stretch:\n  enabled: false\n"),
            messages: Vec::new(),
        };
        let stats = render_file(&input, &output, &options)?;
        assert_eq!(
            stats,
            RenderStats {
                frames: 1000,
                blocks: 8,
                channels: 2,
                sample_rate: 44100,
            }
        );

        let (planar, spec) = read_planar(&output)?;
        assert_eq!(spec.sample_format, SampleFormat::Float);
        assert_eq!(spec.bits_per_sample, 32);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(planar.len(), 2);
        assert_eq!(planar[0].len(), 8 * 128);
        for (i, &s) in left.iter().enumerate() {
            assert_eq!(planar[0][i], f32::from(s) / 32768.0);
            assert_eq!(planar[1][i], f32::from(right[i]) / 32768.0);
        }
        assert!(planar[0][1000..].iter().all(|&s| s == 0.0));
        Ok(())
    }

    #[test]
    fn test_render_pads_to_beat() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");

        // One second of tone, then one second of room noise.
        let mut signal = generate_periodic_sine(48.0, 0.5, 48000);
        signal.extend(generate_noise(0.001, 48000, 3));
        write_wav(&input, &[signal], 48000, 32)?;

        let options = RenderOptions {
            settings: settings("stretch:\n  enabled: false\n"),
            messages: vec![ControlMessage::BeatTiming {
                tempo_bpm: 120.0,
                anchor_time: 0.0,
            }],
        };
        render_file(&input, &output, &options)?;

        let (planar, _) = read_planar(&output)?;
        let mut longest = 0;
        let mut run = 0;
        for &s in &planar[0] {
            run = if s == 0.0 { run + 1 } else { 0 };
            longest = longest.max(run);
        }
        // The pause is confirmed 1.0053 s in, 23744 samples before the beat.
        assert!(longest >= 23744, "longest silent run {longest}");
        Ok(())
    }

    #[test]
    fn test_stretch_render_keeps_length() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");

        let signal = generate_periodic_sine(64.0, 0.5, 48000);
        write_wav(&input, &[signal], 48000, 32)?;

        let options = RenderOptions {
            settings: settings("beat_sync:\n  enabled: false\n"),
            messages: vec![ControlMessage::StretchRatio { value: 1.5 }],
        };
        let stats = render_file(&input, &output, &options)?;
        let (planar, _) = read_planar(&output)?;
        assert_eq!(planar[0].len(), stats.blocks * 128);
        assert!(planar[0].iter().any(|&s| s != 0.0));
        Ok(())
    }

    #[test]
    fn test_empty_input() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("empty.wav");
        write_wav::<i16>(&input, &[Vec::new()], 48000, 16)?;

        assert!(matches!(
            render_file(&input, &dir.path().join("out.wav"), &RenderOptions::default()),
            Err(RenderError::Empty(_))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_input() {
        assert!(matches!(
            render_file(
                Path::new("/nonexistent/in.wav"),
                Path::new("/nonexistent/out.wav"),
                &RenderOptions::default()
            ),
            Err(RenderError::Wav(_))
        ));
    }

    #[test]
    fn test_invalid_settings() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in.wav");
        write_wav(&input, &[vec![0.25f32; 256]], 48000, 32)?;

        let options = RenderOptions {
            settings: settings("block_size: 0\n"),
            messages: Vec::new(),
        };
        assert!(matches!(
            render_file(&input, &dir.path().join("out.wav"), &options),
            Err(RenderError::Config(_))
        ));
        Ok(())
    }
}
