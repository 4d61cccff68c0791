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

/// Root-mean-square energy of a block. An empty block is silent.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// What the classifier has confirmed after the latest block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Verdict {
    /// Enough consecutive quiet blocks have been seen.
    pub silence: bool,
    /// Enough consecutive loud blocks have been seen.
    pub speech: bool,
}

/// Debounces per-block silent/non-silent decisions so a single odd block
/// never flips the confirmed state.
///
/// The two counters are mutually exclusive: a silent block clears the speech
/// count and vice versa. Each count saturates one past its threshold.
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    threshold: f32,
    silence_confirm: u32,
    speech_confirm: u32,
    silence_count: u32,
    speech_count: u32,
}

impl SilenceDetector {
    pub fn new(threshold: f32, silence_confirm: u32, speech_confirm: u32) -> Self {
        Self {
            threshold,
            silence_confirm: silence_confirm.max(1),
            speech_confirm: speech_confirm.max(1),
            silence_count: 0,
            speech_count: 0,
        }
    }

    /// Classifies `block` and returns the updated verdict.
    pub fn observe(&mut self, block: &[f32]) -> Verdict {
        self.observe_level(rms(block))
    }

    /// Same as `observe` for an already computed RMS level.
    pub fn observe_level(&mut self, level: f32) -> Verdict {
        // NaN compares false and is treated as speech.
        if level < self.threshold {
            self.silence_count = (self.silence_count + 1).min(self.silence_confirm + 1);
            self.speech_count = 0;
        } else {
            self.speech_count = (self.speech_count + 1).min(self.speech_confirm + 1);
            self.silence_count = 0;
        }
        self.verdict()
    }

    pub fn verdict(&self) -> Verdict {
        Verdict {
            silence: self.silence_count >= self.silence_confirm,
            speech: self.speech_count >= self.speech_confirm,
        }
    }

    /// Forgets the current silence run; the next episode needs a fresh
    /// confirmation.
    pub fn clear_silence(&mut self) {
        self.silence_count = 0;
    }

    pub fn reset(&mut self) {
        self.silence_count = 0;
        self.speech_count = 0;
    }

    pub fn silence_count(&self) -> u32 {
        self.silence_count
    }

    pub fn speech_count(&self) -> u32 {
        self.speech_count
    }
}
