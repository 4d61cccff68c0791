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

//! WSOLA (waveform-similarity overlap-add) time stretching.
//!
//! Frames are taken from the input at a fixed analysis hop and laid down in
//! the output at a synthesis hop scaled by the stretch ratio. Frame content and
//! analysis rate never change, so duration scales while pitch does not. Each
//! frame's start is nudged within a small search window to the offset whose
//! windowed sum is largest, which lines up successive splices on the same
//! part of the waveform.

use std::f64::consts::PI;

use tracing::debug;

use super::ring::{ChannelRing, OverlapRing};
use super::{block_len, silence, source_block, BlockProcessor};
use crate::control::{ControlMessage, ControlReceiver};

pub const MIN_STRETCH_RATIO: f64 = 0.5;
pub const MAX_STRETCH_RATIO: f64 = 2.0;

const DEFAULT_FRAME_SIZE: usize = 2048;
const DEFAULT_ANALYSIS_HOP: usize = 512;
const DEFAULT_MAX_SEEK: usize = 128;
const DEFAULT_CORRELATION_STRIDE: usize = 4;
const DEFAULT_RING_FRAMES: usize = 8;

/// Clamps a stretch ratio into the supported range. Non-finite ratios are
/// rejected.
pub fn clamp_ratio(ratio: f64) -> Option<f64> {
    if ratio.is_finite() {
        Some(ratio.clamp(MIN_STRETCH_RATIO, MAX_STRETCH_RATIO))
    } else {
        None
    }
}

/// Symmetric Hann window: `0.5 * (1 - cos(2*pi*i / (len - 1)))`.
pub fn hann_window(len: usize) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / (len - 1) as f64).cos())) as f32)
        .collect()
}

/// A Hann window together with the sum of its taps, built once per engine.
pub struct SynthesisWindow {
    taps: Vec<f32>,
    sum: f32,
}

impl SynthesisWindow {
    pub fn hann(len: usize) -> Self {
        let taps = hann_window(len);
        let sum = taps.iter().sum();
        SynthesisWindow { taps, sum }
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    pub fn sum(&self) -> f32 {
        self.sum
    }

    /// Frame scale for a synthesis hop of `hop` samples.
    fn gain(&self, hop: usize, normalize: bool) -> f32 {
        if normalize && self.sum > 0.0 {
            hop as f32 / self.sum
        } else {
            1.0
        }
    }
}

/// Tunables for the stretch engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StretchParams {
    /// Samples per analysis/synthesis frame.
    pub frame_size: usize,
    /// Input advance per frame, independent of the ratio.
    pub analysis_hop: usize,
    /// Splice search reach on either side of the nominal analysis position.
    pub max_seek: usize,
    /// Only every n-th sample contributes to the splice score.
    pub correlation_stride: usize,
    /// Input and output ring sizes, in frames.
    pub ring_frames: usize,
    /// Scale each frame so overlapping windows sum to unity gain. Off, frames
    /// are windowed and summed as they are.
    pub normalize_gain: bool,
    /// Ratio in effect until a control message changes it.
    pub initial_ratio: f64,
}

impl Default for StretchParams {
    fn default() -> Self {
        StretchParams {
            frame_size: DEFAULT_FRAME_SIZE,
            analysis_hop: DEFAULT_ANALYSIS_HOP,
            max_seek: DEFAULT_MAX_SEEK,
            correlation_stride: DEFAULT_CORRELATION_STRIDE,
            ring_frames: DEFAULT_RING_FRAMES,
            normalize_gain: false,
            initial_ratio: 1.0,
        }
    }
}

impl StretchParams {
    /// Output advance per frame for the given ratio.
    pub fn synthesis_hop(&self, ratio: f64) -> usize {
        ((self.analysis_hop as f64 * ratio).round() as usize).max(1)
    }

    /// Unconsumed input needed before a frame can be produced.
    pub fn lookahead(&self) -> usize {
        self.frame_size + 2 * self.max_seek
    }

    fn ring_capacity(&self) -> usize {
        // Room for the lookahead plus a full frame of synthesis headroom.
        (self.frame_size * self.ring_frames).max(self.lookahead() + 2 * self.frame_size + 1)
    }
}

/// Stretch state for one channel: input history and the synthesis ring.
/// The input ring's read cursor is the analysis position.
pub struct ChannelStretcher {
    input: ChannelRing,
    output: OverlapRing,
}

impl ChannelStretcher {
    pub fn new(params: &StretchParams) -> Self {
        let capacity = params.ring_capacity();
        ChannelStretcher {
            input: ChannelRing::new(capacity),
            output: OverlapRing::new(capacity),
        }
    }

    /// Appends `len` input samples; a missing or short block is padded with
    /// silence.
    pub fn push(&mut self, block: Option<&[f32]>, len: usize) {
        self.input.write(block, len);
    }

    /// Current analysis position in the input stream.
    pub fn analysis_pos(&self) -> u64 {
        self.input.read_pos()
    }

    /// Synthesised samples ready to be pulled.
    pub fn committed(&self) -> usize {
        self.output.committed()
    }

    /// Delivers up to `dest.len()` synthesised samples and zero-fills any
    /// shortfall. Returns the number of real samples delivered.
    pub fn pull(&mut self, dest: &mut [f32]) -> usize {
        self.output.pull(dest)
    }

    /// Produces as many frames as the buffered input and the output headroom
    /// allow. Returns the number of frames produced.
    pub fn synthesize(
        &mut self,
        params: &StretchParams,
        window: &SynthesisWindow,
        ratio: f64,
    ) -> usize {
        let frame = params.frame_size;
        let hop = params.synthesis_hop(ratio);
        let gain = window.gain(hop, params.normalize_gain);
        let headroom = self.output.capacity().saturating_sub(2 * frame);

        self.resync(params);

        let mut produced = 0;
        while self.input.unread() >= params.lookahead() as u64 && self.output.committed() < headroom
        {
            let pos = self.input.read_pos() as i64;
            let start = pos + self.find_best_offset(pos, params, window);
            for (i, &w) in window.taps().iter().enumerate().take(frame) {
                self.output.add(i, self.input.get(start + i as i64) * w * gain);
            }
            self.output.commit(hop);
            // Everything below the new analysis position is reclaimable.
            self.input.skip(params.analysis_hop as u64);
            produced += 1;
        }
        produced
    }

    /// Finds the offset in `[-max_seek, max_seek]` around `pos` whose
    /// subsampled, windowed sum is largest. The first maximum wins.
    pub fn find_best_offset(
        &self,
        pos: i64,
        params: &StretchParams,
        window: &SynthesisWindow,
    ) -> i64 {
        let window = window.taps();
        let seek = params.max_seek as i64;
        let stride = params.correlation_stride.max(1);
        let mut best_score = f32::NEG_INFINITY;
        let mut best_offset = 0;

        for offset in -seek..=seek {
            let base = pos + offset;
            let score: f32 = (0..window.len())
                .step_by(stride)
                .map(|i| self.input.get(base + i as i64) * window[i])
                .sum();
            if score > best_score {
                best_score = score;
                best_offset = offset;
            }
        }
        best_offset
    }

    /// Keeps the analysis position inside retained history. When synthesis
    /// stalls on a full output ring the input keeps arriving; once the frames
    /// we have not analysed yet start being evicted, jump forward rather than
    /// stretching silence.
    fn resync(&mut self, params: &StretchParams) {
        let retained_from = self
            .input
            .write_pos()
            .saturating_sub(self.input.capacity() as u64)
            + params.max_seek as u64;
        if self.input.write_pos() > self.input.capacity() as u64
            && self.input.read_pos() < retained_from
        {
            self.input.skip(retained_from - self.input.read_pos());
        }
    }
}

/// Pitch-preserving time stretch for one captured stream.
pub struct WsolaEngine {
    params: StretchParams,
    window: SynthesisWindow,
    ratio: f64,
    channels: Vec<ChannelStretcher>,
    control: Option<ControlReceiver>,
}

impl WsolaEngine {
    pub fn new(params: StretchParams) -> Self {
        let window = SynthesisWindow::hann(params.frame_size);
        let ratio = clamp_ratio(params.initial_ratio).unwrap_or(1.0);
        WsolaEngine {
            params,
            window,
            ratio,
            channels: Vec::new(),
            control: None,
        }
    }

    /// Drains `control` at the start of every block.
    pub fn attach_control(&mut self, control: ControlReceiver) {
        self.control = Some(control);
    }

    pub fn params(&self) -> &StretchParams {
        &self.params
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Sets the ratio used from the next block on, clamped to `[0.5, 2.0]`.
    /// Non-finite values are ignored.
    pub fn set_ratio(&mut self, ratio: f64) {
        if let Some(ratio) = clamp_ratio(ratio) {
            if ratio != self.ratio {
                debug!(from = self.ratio, to = ratio, "Stretch ratio changed");
            }
            self.ratio = ratio;
        }
    }

    /// Applies a control message. Beat messages belong to the padding engine.
    pub fn apply(&mut self, message: &ControlMessage) {
        if let ControlMessage::StretchRatio { value } = message {
            self.set_ratio(*value);
        }
    }

    /// Grows channel state to at least `count` channels. Existing channels are
    /// untouched; new ones start with empty history.
    pub fn ensure_channels(&mut self, count: usize) {
        if self.channels.len() < count {
            debug!(from = self.channels.len(), to = count, "Growing stretch channels");
            while self.channels.len() < count {
                self.channels.push(ChannelStretcher::new(&self.params));
            }
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelStretcher> {
        self.channels.get(index)
    }

    fn drain_control(&mut self) {
        if let Some(control) = self.control.take() {
            control.drain(|message| self.apply(&message));
            self.control = Some(control);
        }
    }
}

impl BlockProcessor for WsolaEngine {
    fn process(&mut self, input: &[&[f32]], output: &mut [&mut [f32]]) {
        self.drain_control();

        if input.is_empty() {
            silence(output);
            return;
        }

        let len = block_len(output);
        self.ensure_channels(output.len());

        // Sampled once; not interpolated within the block.
        let ratio = self.ratio;
        for (c, out) in output.iter_mut().enumerate() {
            let channel = &mut self.channels[c];
            channel.push(source_block(input, c), len);
            channel.synthesize(&self.params, &self.window, ratio);
            channel.pull(out);
        }
    }
}
