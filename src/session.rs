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
// Per-stream owner of the two engines. Beat sync runs first and its output
// feeds the stretcher, so pads are stretched along with the speech around them.
use tracing::{debug, info};

use crate::audio::{
    block_len, silence, source_block, BeatSyncEngine, BlockProcessor, WsolaEngine,
};
use crate::config::{ConfigError, Settings};
use crate::control::{self, ControlMessage, ControlReceiver, ControlSender};

/// Everything one captured stream needs, dropped with the stream.
pub struct StreamSession {
    beat_sync: Option<BeatSyncEngine>,
    stretch: Option<WsolaEngine>,
    control: Option<ControlReceiver>,
    /// Beat sync output, one block per channel, when both engines run.
    scratch: Vec<Vec<f32>>,
}

impl StreamSession {
    pub fn new(beat_sync: Option<BeatSyncEngine>, stretch: Option<WsolaEngine>) -> StreamSession {
        StreamSession {
            beat_sync,
            stretch,
            control: None,
            scratch: Vec::new(),
        }
    }

    /// Builds the engines the settings enable.
    pub fn from_settings(settings: &Settings) -> Result<StreamSession, ConfigError> {
        settings.validate()?;
        let beat_sync_settings = settings.beat_sync();
        let stretch_settings = settings.stretch();

        let beat_sync = if beat_sync_settings.enabled() {
            Some(BeatSyncEngine::new(
                beat_sync_settings.params()?,
                settings.sample_rate(),
            ))
        } else {
            None
        };
        let stretch = if stretch_settings.enabled() {
            Some(WsolaEngine::new(stretch_settings.params()?))
        } else {
            None
        };

        info!(
            sample_rate = settings.sample_rate(),
            block_size = settings.block_size(),
            beat_sync = beat_sync.is_some(),
            stretch = stretch.is_some(),
            "Stream session created"
        );

        let mut session = StreamSession::new(beat_sync, stretch);
        session.ensure_capacity(2, settings.block_size());
        Ok(session)
    }

    /// Creates the control queue for this session and returns its sending
    /// half. A previous queue is replaced.
    pub fn open_control(&mut self, capacity: usize) -> ControlSender {
        let (tx, rx) = control::channel(capacity);
        self.control = Some(rx);
        tx
    }

    pub fn beat_sync(&self) -> Option<&BeatSyncEngine> {
        self.beat_sync.as_ref()
    }

    pub fn stretch(&self) -> Option<&WsolaEngine> {
        self.stretch.as_ref()
    }

    /// Routes a control message to the engine that owns it.
    pub fn apply(&mut self, message: &ControlMessage) {
        match message {
            ControlMessage::BeatTiming { .. } | ControlMessage::BeatStop => {
                if let Some(beat_sync) = self.beat_sync.as_mut() {
                    beat_sync.apply(message);
                }
            }
            ControlMessage::StretchRatio { .. } => {
                if let Some(stretch) = self.stretch.as_mut() {
                    stretch.apply(message);
                }
            }
            ControlMessage::Volume { value } => {
                debug!(value, "Ignoring volume, handled downstream");
            }
        }
    }

    /// Grows the scratch blocks to hold `channels` blocks of `block_len`
    /// samples. Never shrinks.
    pub fn ensure_capacity(&mut self, channels: usize, block_len: usize) {
        grow_blocks(&mut self.scratch, channels, block_len);
    }

    fn drain_control(&mut self) {
        if let Some(control) = self.control.take() {
            control.drain(|message| self.apply(&message));
            self.control = Some(control);
        }
    }
}

impl BlockProcessor for StreamSession {
    fn process(&mut self, input: &[&[f32]], output: &mut [&mut [f32]]) {
        self.drain_control();

        let StreamSession {
            beat_sync,
            stretch,
            scratch,
            ..
        } = self;
        match (beat_sync.as_mut(), stretch.as_mut()) {
            (Some(beat_sync), Some(stretch)) => {
                let len = block_len(output);
                grow_blocks(scratch, output.len(), len);
                if output.len() <= STAGED_CHANNELS {
                    chain_staged(beat_sync, stretch, scratch, input, output);
                } else {
                    chain_wide(beat_sync, stretch, scratch, input, output);
                }
            }
            (Some(beat_sync), None) => beat_sync.process(input, output),
            (None, Some(stretch)) => stretch.process(input, output),
            (None, None) => {
                if input.is_empty() {
                    silence(output);
                    return;
                }
                for (c, out) in output.iter_mut().enumerate() {
                    match source_block(input, c) {
                        Some(block) => {
                            let n = block.len().min(out.len());
                            out[..n].copy_from_slice(&block[..n]);
                            out[n..].fill(0.0);
                        }
                        None => out.fill(0.0),
                    }
                }
            }
        }
    }
}

/// Channel counts up to this run through slice tables on the stack.
const STAGED_CHANNELS: usize = 8;

fn chain_staged(
    beat_sync: &mut BeatSyncEngine,
    stretch: &mut WsolaEngine,
    scratch: &mut [Vec<f32>],
    input: &[&[f32]],
    output: &mut [&mut [f32]],
) {
    let len = block_len(output);
    let channels = output.len();

    let mut staged: [&mut [f32]; STAGED_CHANNELS] = Default::default();
    for (slot, block) in staged.iter_mut().zip(scratch.iter_mut()) {
        *slot = &mut block[..len];
    }
    beat_sync.process(input, &mut staged[..channels]);

    let mut views: [&[f32]; STAGED_CHANNELS] = Default::default();
    for (view, block) in views.iter_mut().zip(staged.iter()) {
        *view = &**block;
    }
    stretch.process(&views[..channels], output);
}

/// More channels than fit on the stack; the slice tables go on the heap.
fn chain_wide(
    beat_sync: &mut BeatSyncEngine,
    stretch: &mut WsolaEngine,
    scratch: &mut [Vec<f32>],
    input: &[&[f32]],
    output: &mut [&mut [f32]],
) {
    let len = block_len(output);
    let mut staged: Vec<&mut [f32]> = scratch[..output.len()]
        .iter_mut()
        .map(|block| &mut block[..len])
        .collect();
    beat_sync.process(input, &mut staged);
    let staged: Vec<&[f32]> = staged.into_iter().map(|block| &*block).collect();
    stretch.process(&staged, output);
}

fn grow_blocks(blocks: &mut Vec<Vec<f32>>, channels: usize, block_len: usize) {
    if blocks.len() < channels {
        blocks.resize_with(channels, Vec::new);
    }
    for block in blocks.iter_mut() {
        if block.len() < block_len {
            block.resize(block_len, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BeatSyncParams, PadState, StretchParams};
    use crate::testutil::audio_test_utils::{generate_noise, generate_periodic_sine};

    const BLOCK: usize = 128;

    fn run(session: &mut StreamSession, signal: &[f32], channels: usize) -> Vec<Vec<f32>> {
        let mut out = vec![Vec::new(); channels];
        let mut blocks = vec![vec![0.0f32; BLOCK]; channels];
        for chunk in signal.chunks(BLOCK) {
            let input: [&[f32]; 1] = [chunk];
            let mut refs: Vec<&mut [f32]> = blocks.iter_mut().map(|b| b.as_mut_slice()).collect();
            session.process(&input, &mut refs);
            for (c, block) in blocks.iter().enumerate() {
                out[c].extend_from_slice(block);
            }
        }
        out
    }

    #[test]
    fn test_no_engines_copies_input() {
        let mut session = StreamSession::new(None, None);
        let signal = generate_noise(0.3, BLOCK * 4, 1);
        let out = run(&mut session, &signal, 2);
        assert_eq!(out[0], signal);
        assert_eq!(out[1], signal);
    }

    #[test]
    fn test_series_matches_stretch_alone_without_beat() {
        // With no beat the padding stage is transparent, so the chain must
        // produce exactly what the stretcher alone does.
        let mut session = StreamSession::new(
            Some(BeatSyncEngine::new(BeatSyncParams::default(), 48000)),
            Some(WsolaEngine::new(StretchParams::default())),
        );
        let mut reference = WsolaEngine::new(StretchParams::default());
        let signal = generate_periodic_sine(64.0, 0.5, BLOCK * 60);

        let chained = run(&mut session, &signal, 1);

        let mut expected = Vec::new();
        let mut block = [0.0f32; BLOCK];
        for chunk in signal.chunks(BLOCK) {
            let input: [&[f32]; 1] = [chunk];
            let mut output: [&mut [f32]; 1] = [&mut block];
            reference.process(&input, &mut output);
            expected.extend_from_slice(&block);
        }

        assert_eq!(chained[0], expected);
        assert!(chained[0].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_control_routing() {
        let mut session = StreamSession::new(
            Some(BeatSyncEngine::new(BeatSyncParams::default(), 48000)),
            Some(WsolaEngine::new(StretchParams::default())),
        );
        let tx = session.open_control(8);
        tx.send(ControlMessage::BeatTiming {
            tempo_bpm: 120.0,
            anchor_time: 0.0,
        })
        .unwrap();
        tx.send(ControlMessage::StretchRatio { value: 1.5 }).unwrap();
        tx.send(ControlMessage::Volume { value: 0.2 }).unwrap();

        run(&mut session, &[0.0; BLOCK], 2);

        let beat_sync = session.beat_sync().unwrap();
        assert!(beat_sync.is_beat_active());
        assert_eq!(session.stretch().unwrap().ratio(), 1.5);

        tx.send(ControlMessage::BeatStop).unwrap();
        run(&mut session, &[0.0; BLOCK], 2);
        assert!(!session.beat_sync().unwrap().is_beat_active());
        assert_eq!(session.beat_sync().unwrap().state(), PadState::Passthrough);
        assert_eq!(session.stretch().unwrap().ratio(), 1.5);
    }

    #[test]
    fn test_messages_for_missing_engines_are_dropped() {
        let mut session = StreamSession::new(None, None);
        session.apply(&ControlMessage::StretchRatio { value: 2.0 });
        session.apply(&ControlMessage::BeatStop);
        assert!(session.beat_sync().is_none());
        assert!(session.stretch().is_none());
    }

    #[test]
    fn test_from_settings() {
        let session = StreamSession::from_settings(&Settings::default()).unwrap();
        assert!(session.beat_sync().is_some());
        assert!(session.stretch().is_some());
        assert_eq!(session.scratch.len(), 2);
        assert_eq!(session.scratch[0].len(), 128);
    }

    #[test]
    fn test_wide_sinks_match_narrow_ones() {
        // Both paths through the chain produce the same audio.
        let engines = || {
            let mut beat_sync = BeatSyncEngine::new(BeatSyncParams::default(), 48000);
            beat_sync.apply(&ControlMessage::BeatTiming {
                tempo_bpm: 120.0,
                anchor_time: 0.0,
            });
            (Some(beat_sync), Some(WsolaEngine::new(StretchParams::default())))
        };
        let mut signal = generate_periodic_sine(64.0, 0.5, BLOCK * 300);
        signal[BLOCK * 100..BLOCK * 200].copy_from_slice(&generate_noise(0.001, BLOCK * 100, 2));

        let (beat_sync, stretch) = engines();
        let mut narrow = StreamSession::new(beat_sync, stretch);
        let (beat_sync, stretch) = engines();
        let mut wide = StreamSession::new(beat_sync, stretch);

        let narrow_out = run(&mut narrow, &signal, STAGED_CHANNELS);
        let wide_out = run(&mut wide, &signal, STAGED_CHANNELS + 2);

        assert!(narrow_out[0].iter().any(|&s| s != 0.0));
        for channel in &narrow_out {
            assert_eq!(channel, &narrow_out[0]);
        }
        for channel in &wide_out {
            assert_eq!(channel, &narrow_out[0]);
        }
        assert!(narrow.beat_sync().unwrap().drift_samples() > 0);
    }

    #[test]
    fn test_scratch_grows_with_channels() {
        let mut session = StreamSession::new(
            Some(BeatSyncEngine::new(BeatSyncParams::default(), 48000)),
            Some(WsolaEngine::new(StretchParams::default())),
        );
        run(&mut session, &[0.1; BLOCK], 4);
        assert_eq!(session.scratch.len(), 4);
        assert_eq!(session.beat_sync().unwrap().channel_count(), 4);
        assert_eq!(session.stretch().unwrap().channel_count(), 4);
    }
}
