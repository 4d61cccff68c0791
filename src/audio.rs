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
pub mod beat;
pub mod beat_sync;
pub mod energy;
pub mod ring;
pub mod wsola;

pub use beat::{BeatAnchor, BeatClock};
pub use beat_sync::{BeatSyncEngine, BeatSyncParams, PadState};
pub use wsola::{StretchParams, WsolaEngine};

/// A block-synchronous audio transform driven by the host once per quantum.
///
/// Implementations must not block, wait on locks, or allocate after their
/// channel state has been created. Anomalies degrade the audio; they are never
/// reported as errors.
pub trait BlockProcessor: Send {
    /// Processes one quantum. `output` holds one block per sink channel, all
    /// of the same length. `input` holds one block per source channel.
    /// A mono source is duplicated into every sink channel.
    fn process(&mut self, input: &[&[f32]], output: &mut [&mut [f32]]);
}

/// Returns the block a sink channel should consume: channel 0 for every sink
/// channel when the source is mono, otherwise the matching source channel.
pub(crate) fn source_block<'a>(input: &[&'a [f32]], channel: usize) -> Option<&'a [f32]> {
    if input.len() == 1 {
        return Some(input[0]);
    }
    input.get(channel).copied()
}

/// Length of the quantum the host handed us.
pub(crate) fn block_len(output: &[&mut [f32]]) -> usize {
    output.first().map(|block| block.len()).unwrap_or(0)
}

/// Zero every sink block.
pub(crate) fn silence(output: &mut [&mut [f32]]) {
    for block in output.iter_mut() {
        block.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_block_duplicates_mono() {
        let mono = [0.25f32; 4];
        let input: [&[f32]; 1] = [&mono];
        for channel in 0..4 {
            assert_eq!(source_block(&input, channel), Some(&mono[..]));
        }
    }

    #[test]
    fn test_source_block_missing_channel() {
        let left = [0.1f32; 4];
        let right = [0.2f32; 4];
        let input: [&[f32]; 2] = [&left, &right];
        assert_eq!(source_block(&input, 1), Some(&right[..]));
        assert_eq!(source_block(&input, 2), None);
        assert_eq!(source_block(&[], 0), None);
    }

    #[test]
    fn test_silence_and_block_len() {
        let mut a = [1.0f32; 8];
        let mut b = [1.0f32; 8];
        let mut output: [&mut [f32]; 2] = [&mut a, &mut b];
        assert_eq!(block_len(&output), 8);
        silence(&mut output);
        assert!(a.iter().chain(b.iter()).all(|&s| s == 0.0));
        assert_eq!(block_len(&[]), 0);
    }
}
