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

/// Tempo and the time of one beat of the external rhythm track, in the same
/// timebase as block processing (seconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatAnchor {
    pub tempo_bpm: f64,
    pub anchor_time: f64,
}

impl BeatAnchor {
    pub fn new(tempo_bpm: f64, anchor_time: f64) -> Self {
        BeatAnchor {
            tempo_bpm,
            anchor_time,
        }
    }

    /// Beat length in seconds, if the tempo is usable.
    pub fn beat_duration(&self) -> Option<f64> {
        if self.tempo_bpm.is_finite() && self.tempo_bpm > 0.0 && self.anchor_time.is_finite() {
            Some(60.0 / self.tempo_bpm)
        } else {
            None
        }
    }
}

/// Answers where the current instant sits inside the beat grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeatClock {
    anchor: Option<BeatAnchor>,
}

impl BeatClock {
    pub fn new(anchor: Option<BeatAnchor>) -> Self {
        BeatClock { anchor }
    }

    /// Replaces the anchor. Tempo and anchor time always change together.
    pub fn set_anchor(&mut self, anchor: BeatAnchor) {
        self.anchor = Some(anchor);
    }

    pub fn clear(&mut self) {
        self.anchor = None;
    }

    pub fn anchor(&self) -> Option<BeatAnchor> {
        self.anchor
    }

    /// True when an anchor with a positive, finite tempo is set.
    pub fn is_active(&self) -> bool {
        self.beat_duration().is_some()
    }

    pub fn beat_duration(&self) -> Option<f64> {
        self.anchor.and_then(|anchor| anchor.beat_duration())
    }

    /// Seconds elapsed since the most recent beat at time `now`.
    fn offset_in_beat(&self, now: f64) -> Option<(f64, f64)> {
        let anchor = self.anchor?;
        let beat = anchor.beat_duration()?;
        let offset = (now - anchor.anchor_time).rem_euclid(beat);
        Some((offset, beat))
    }

    /// Position within the current beat in `[0, 1)`.
    pub fn phase(&self, now: f64) -> Option<f64> {
        self.offset_in_beat(now).map(|(offset, beat)| offset / beat)
    }

    /// Seconds until the next beat boundary, or infinity when the clock is
    /// inactive.
    pub fn time_to_next_beat(&self, now: f64) -> f64 {
        match self.offset_in_beat(now) {
            Some((offset, beat)) => beat - offset,
            None => f64::INFINITY,
        }
    }
}
