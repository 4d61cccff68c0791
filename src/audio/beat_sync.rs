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

//! Beat-aligned silence padding.
//!
//! Audio is delayed through a per-channel ring. When a pause in speech is
//! confirmed and the next beat of the rhythm track is close, the read cursor
//! is frozen and silence is emitted until the beat, so the next word starts on
//! it. The delay this adds is tracked as drift; once it grows too large, the
//! next pause is used to skip buffered audio and pay it back.

use tracing::debug;

use super::beat::{BeatAnchor, BeatClock};
use super::energy::{SilenceDetector, Verdict};
use super::ring::ChannelRing;
use super::{block_len, silence, source_block, BlockProcessor};
use crate::control::{ControlMessage, ControlReceiver};


const DEFAULT_RMS_THRESHOLD: f32 = 0.01;
const DEFAULT_SILENCE_CONFIRM: u32 = 3;
const DEFAULT_SPEECH_CONFIRM: u32 = 2;
const DEFAULT_MIN_PAD: f64 = 0.02;
const DEFAULT_MAX_PAD: f64 = 0.5;
const DEFAULT_MAX_DRIFT: f64 = 2.0;
const DEFAULT_SETTLE_DRIFT: f64 = 0.01;
const DEFAULT_CATCH_UP_QUANTUM: usize = 256;
const DEFAULT_RING_DURATION: f64 = 4.0;

/// Tunables for the padding engine. Times are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatSyncParams {
    /// Block RMS below this is silent (0.01 is about -40 dB).
    pub rms_threshold: f32,
    /// Consecutive silent blocks needed to confirm a pause.
    pub silence_confirm: u32,
    /// Consecutive non-silent blocks needed to confirm speech.
    pub speech_confirm: u32,
    /// Pads shorter than this are not worth inserting.
    pub min_pad: f64,
    /// Pads longer than this would be audible; wait for a closer beat.
    pub max_pad: f64,
    /// Drift at which the next pause is spent catching up.
    pub max_drift: f64,
    /// Catching up stops once drift is at or below this.
    pub settle_drift: f64,
    /// Samples skipped per block while catching up.
    pub catch_up_quantum: usize,
    /// History kept per channel.
    pub ring_duration: f64,
    /// Engine time at the first block, in the beat anchor's timebase.
    pub start_time: f64,
}

impl Default for BeatSyncParams {
    fn default() -> Self {
        BeatSyncParams {
            rms_threshold: DEFAULT_RMS_THRESHOLD,
            silence_confirm: DEFAULT_SILENCE_CONFIRM,
            speech_confirm: DEFAULT_SPEECH_CONFIRM,
            min_pad: DEFAULT_MIN_PAD,
            max_pad: DEFAULT_MAX_PAD,
            max_drift: DEFAULT_MAX_DRIFT,
            settle_drift: DEFAULT_SETTLE_DRIFT,
            catch_up_quantum: DEFAULT_CATCH_UP_QUANTUM,
            ring_duration: DEFAULT_RING_DURATION,
            start_time: 0.0,
        }
    }
}

/// What the engine does with the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadState {
    /// Buffered audio flows out with a constant delay.
    Passthrough,
    /// Silence is emitted and the read cursor is frozen.
    Padding {
        /// Pad samples still to emit.
        remaining: u64,
    },
    /// Silence is emitted while buffered audio is skipped to repay drift.
    CatchingUp,
}

/// The clock-side inputs to a transition decision.
#[derive(Debug, Clone, Copy)]
pub struct ClockReading {
    /// Seconds to the next beat; infinite when the beat clock is inactive.
    pub time_to_next_beat: f64,
    /// Accumulated padding not yet repaid.
    pub drift_seconds: f64,
    pub sample_rate: f64,
}

impl ClockReading {
    pub fn beat_active(&self) -> bool {
        self.time_to_next_beat.is_finite()
    }
}

/// Decides the state for the current block. Pure, so it can be exercised
/// without any audio.
pub fn next_state(
    state: PadState,
    verdict: Verdict,
    reading: &ClockReading,
    params: &BeatSyncParams,
) -> PadState {
    match state {
        PadState::Passthrough => {
            if !verdict.silence || !reading.beat_active() {
                return PadState::Passthrough;
            }
            if reading.drift_seconds >= params.max_drift {
                return PadState::CatchingUp;
            }
            let ttb = reading.time_to_next_beat;
            if ttb > params.min_pad && ttb < params.max_pad {
                PadState::Padding {
                    remaining: (ttb * reading.sample_rate).round() as u64,
                }
            } else {
                PadState::Passthrough
            }
        }
        PadState::Padding { remaining } => {
            if verdict.speech || remaining == 0 {
                PadState::Passthrough
            } else {
                state
            }
        }
        PadState::CatchingUp => {
            if verdict.speech || reading.drift_seconds <= params.settle_drift {
                PadState::Passthrough
            } else {
                PadState::CatchingUp
            }
        }
    }
}

/// Beat-aligned padding for one captured stream.
pub struct BeatSyncEngine {
    params: BeatSyncParams,
    sample_rate: f64,
    ring_capacity: usize,
    /// One ring per sink channel, grown on demand.
    channels: Vec<ChannelRing>,
    detector: SilenceDetector,
    clock: BeatClock,
    state: PadState,
    /// Padding samples emitted and not yet skipped.
    drift: u64,
    frames_processed: u64,
    control: Option<ControlReceiver>,
}

impl BeatSyncEngine {
    pub fn new(params: BeatSyncParams, sample_rate: u32) -> Self {
        let sample_rate = f64::from(sample_rate.max(1));
        let ring_capacity = (params.ring_duration.max(0.0) * sample_rate).round() as usize;
        let detector = SilenceDetector::new(
            params.rms_threshold,
            params.silence_confirm,
            params.speech_confirm,
        );
        BeatSyncEngine {
            params,
            sample_rate,
            ring_capacity: ring_capacity.max(1),
            channels: Vec::new(),
            detector,
            clock: BeatClock::default(),
            state: PadState::Passthrough,
            drift: 0,
            frames_processed: 0,
            control: None,
        }
    }

    /// Drains `control` at the start of every block.
    pub fn attach_control(&mut self, control: ControlReceiver) {
        self.control = Some(control);
    }

    pub fn params(&self) -> &BeatSyncParams {
        &self.params
    }

    pub fn state(&self) -> PadState {
        self.state
    }

    pub fn drift_samples(&self) -> u64 {
        self.drift
    }

    pub fn drift_seconds(&self) -> f64 {
        self.drift as f64 / self.sample_rate
    }

    /// Time at the start of the next block.
    pub fn current_time(&self) -> f64 {
        self.params.start_time + self.frames_processed as f64 / self.sample_rate
    }

    pub fn beat_anchor(&self) -> Option<BeatAnchor> {
        self.clock.anchor()
    }

    pub fn is_beat_active(&self) -> bool {
        self.clock.is_active()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples written but not yet read on channel 0: the current output delay.
    pub fn buffered_samples(&self) -> u64 {
        self.channels.first().map(|c| c.unread()).unwrap_or(0)
    }

    /// Applies a control message. The stretch ratio belongs to the stretch engine.
    pub fn apply(&mut self, message: &ControlMessage) {
        match *message {
            ControlMessage::BeatTiming {
                tempo_bpm,
                anchor_time,
            } => {
                debug!(tempo_bpm, anchor_time, "Beat timing updated");
                self.clock.set_anchor(BeatAnchor::new(tempo_bpm, anchor_time));
            }
            ControlMessage::BeatStop => {
                debug!(drift = self.drift, "Beat stopped, resetting to passthrough");
                self.clock.clear();
                self.reset();
            }
            ControlMessage::StretchRatio { .. } | ControlMessage::Volume { .. } => {}
        }
    }

    /// Back to passthrough with no drift and no pending confirmations. The
    /// current output delay is kept.
    pub fn reset(&mut self) {
        self.state = PadState::Passthrough;
        self.drift = 0;
        self.detector.reset();
    }

    /// Grows channel state to at least `count` channels. New channels start at
    /// the same cursors as channel 0 with empty history, so every channel
    /// keeps the same delay.
    pub fn ensure_channels(&mut self, count: usize) {
        if self.channels.len() >= count {
            return;
        }
        debug!(from = self.channels.len(), to = count, "Growing padding channels");
        let (write_pos, read_pos) = self
            .channels
            .first()
            .map(|c| (c.write_pos(), c.read_pos()))
            .unwrap_or((0, 0));
        while self.channels.len() < count {
            self.channels.push(ChannelRing::with_cursors(
                self.ring_capacity,
                write_pos,
                read_pos,
            ));
        }
    }

    fn drain_control(&mut self) {
        if let Some(control) = self.control.take() {
            control.drain(|message| self.apply(&message));
            self.control = Some(control);
        }
    }

    fn transition(&mut self, verdict: Verdict) {
        let reading = ClockReading {
            time_to_next_beat: self.clock.time_to_next_beat(self.current_time()),
            drift_seconds: self.drift_seconds(),
            sample_rate: self.sample_rate,
        };
        let next = next_state(self.state, verdict, &reading, &self.params);
        if next == self.state {
            return;
        }

        match next {
            PadState::Padding { remaining } => debug!(
                remaining,
                time_to_next_beat = reading.time_to_next_beat,
                "Padding to next beat"
            ),
            PadState::CatchingUp => debug!(drift = self.drift, "Catching up"),
            PadState::Passthrough => {
                debug!(drift = self.drift, "Back to passthrough");
                // A new pause has to be confirmed from scratch.
                self.detector.clear_silence();
            }
        }
        self.state = next;
    }
}

impl BlockProcessor for BeatSyncEngine {
    fn process(&mut self, input: &[&[f32]], output: &mut [&mut [f32]]) {
        self.drain_control();

        if input.is_empty() {
            silence(output);
            return;
        }

        let len = block_len(output);
        if len == 0 {
            return;
        }
        self.ensure_channels(output.len());
        // Channels the host no longer asks for keep moving in step, fed silence.
        for (c, ring) in self.channels.iter_mut().enumerate() {
            let block = if c < output.len() {
                source_block(input, c)
            } else {
                None
            };
            ring.write(block, len);
        }

        let reference = &input[0][..len.min(input[0].len())];
        let verdict = self.detector.observe(reference);
        self.transition(verdict);

        match self.state {
            PadState::Passthrough => {
                for (c, ring) in self.channels.iter_mut().enumerate() {
                    match output.get_mut(c) {
                        Some(out) => ring.read_into(out),
                        None => ring.skip(len as u64),
                    }
                }
            }
            PadState::Padding { remaining } => {
                // The read cursor holds still for the padded samples only, so
                // the output delay grows by exactly the drift added.
                let pad = remaining.min(len as u64) as usize;
                for (c, ring) in self.channels.iter_mut().enumerate() {
                    match output.get_mut(c) {
                        Some(out) => {
                            let head = pad.min(out.len());
                            out[..head].fill(0.0);
                            ring.read_into(&mut out[head..]);
                        }
                        None => ring.skip((len - pad) as u64),
                    }
                }
                self.drift += pad as u64;
                self.state = PadState::Padding {
                    remaining: remaining - pad as u64,
                };
            }
            PadState::CatchingUp => {
                silence(output);
                // One block plus the catch-up quantum; the skipped audio is
                // gone for good.
                let skip = (self.params.catch_up_quantum as u64).min(self.drift);
                for ring in self.channels.iter_mut() {
                    ring.skip(len as u64 + skip);
                }
                self.drift -= skip;
            }
        }

        self.frames_processed += len as u64;
    }
}
