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

//! Control messages delivered to the engines between blocks.
//!
//! Each message is a complete value, so a tempo and its anchor time can never
//! be observed half-applied. The queue is bounded and neither end ever
//! blocks: the producer gets `ControlError::Full` when the audio side falls
//! behind, and the audio side drains with `try_recv` at the start of a block.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};

use crate::audio::wsola::clamp_ratio;

/// Default queue depth. Control traffic is a handful of messages per second.
pub const DEFAULT_CONTROL_CAPACITY: usize = 32;

/// The port-message schema shared with the playback and UI collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Sets the beat anchor and activates beat alignment.
    BeatTiming {
        #[serde(rename = "tempoBPM", alias = "bpm")]
        tempo_bpm: f64,
        #[serde(rename = "anchorTime", alias = "beatStartTime")]
        anchor_time: f64,
    },
    /// Clears the anchor and hard-resets the padding engine.
    BeatStop,
    /// New stretch ratio, applied from the next block.
    StretchRatio { value: f64 },
    /// Output volume. Owned by a downstream collaborator; the engines ignore it.
    Volume { value: f64 },
}

impl ControlMessage {
    /// Decodes a JSON port message.
    pub fn from_json(json: &str) -> Result<ControlMessage, ControlError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Brings a message inside the range the engines accept. Stretch ratios are
    /// clamped to `[0.5, 2.0]`; a non-finite ratio is dropped.
    pub fn sanitized(self) -> Option<ControlMessage> {
        match self {
            ControlMessage::StretchRatio { value } => {
                clamp_ratio(value).map(|value| ControlMessage::StretchRatio { value })
            }
            other => Some(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("control queue is full")]
    Full,

    #[error("control receiver has been dropped")]
    Disconnected,

    #[error("invalid control message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Producer half. Deliberately not `Clone`: one control context per stream.
pub struct ControlSender {
    tx: Sender<ControlMessage>,
}

/// Consumer half, owned by whatever drives the block callback.
pub struct ControlReceiver {
    rx: Receiver<ControlMessage>,
}

/// Creates a bounded control queue.
pub fn channel(capacity: usize) -> (ControlSender, ControlReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (ControlSender { tx }, ControlReceiver { rx })
}

impl ControlSender {
    /// Enqueues a message without blocking. Messages that sanitize to nothing
    /// are silently dropped.
    pub fn send(&self, message: ControlMessage) -> Result<(), ControlError> {
        let Some(message) = message.sanitized() else {
            return Ok(());
        };
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => ControlError::Full,
            TrySendError::Disconnected(_) => ControlError::Disconnected,
        })
    }

    /// Decodes and enqueues a JSON port message.
    pub fn send_json(&self, json: &str) -> Result<(), ControlError> {
        self.send(ControlMessage::from_json(json)?)
    }
}

impl ControlReceiver {
    /// Takes the next pending message, if any.
    pub fn try_next(&self) -> Option<ControlMessage> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Hands every pending message to `apply` in arrival order.
    pub fn drain<F>(&self, mut apply: F)
    where
        F: FnMut(ControlMessage),
    {
        while let Some(message) = self.try_next() {
            apply(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
