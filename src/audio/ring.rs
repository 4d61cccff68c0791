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
// Fixed-capacity per-channel sample history addressed by virtual positions.
// Positions only ever grow; the physical slot is the position modulo the
// capacity, so nothing is moved or reallocated once the ring exists.
//

/// History of one channel. The addressable range is `[write - capacity, write)`;
/// anything outside it reads as silence.
pub struct ChannelRing {
    /// Physical storage.
    data: Box<[f32]>,
    /// Virtual position of the next sample to be written.
    write_pos: u64,
    /// Virtual position of the next sample to be consumed.
    read_pos: u64,
}

impl ChannelRing {
    /// Creates an empty ring holding up to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)].into_boxed_slice(),
            write_pos: 0,
            read_pos: 0,
        }
    }

    /// Creates a ring whose cursors start at the given positions with no
    /// history behind them, so it can run in step with an existing ring.
    pub fn with_cursors(capacity: usize, write_pos: u64, read_pos: u64) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)].into_boxed_slice(),
            write_pos,
            read_pos,
        }
    }

    /// The number of samples of history the ring retains.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn write_pos(&self) -> u64 {
        self.write_pos
    }

    pub fn read_pos(&self) -> u64 {
        self.read_pos
    }

    /// Samples written but not yet consumed.
    pub fn unread(&self) -> u64 {
        self.write_pos.saturating_sub(self.read_pos)
    }

    /// Appends `len` samples taken from `block`. Positions past the end of
    /// `block` (or a missing block) are written as silence.
    pub fn write(&mut self, block: Option<&[f32]>, len: usize) {
        let capacity = self.data.len() as u64;
        for i in 0..len {
            let sample = block.and_then(|b| b.get(i)).copied().unwrap_or(0.0);
            self.data[(self.write_pos % capacity) as usize] = sample;
            self.write_pos += 1;
        }
    }

    /// Reads the sample at a virtual position, or zero if it was never
    /// written or has already been evicted.
    #[inline]
    pub fn get(&self, pos: i64) -> f32 {
        let oldest = self.write_pos as i64 - self.data.len() as i64;
        if pos < oldest.max(0) || pos >= self.write_pos as i64 {
            return 0.0;
        }
        self.data[(pos as u64 % self.data.len() as u64) as usize]
    }

    /// Fills `dest` starting at the read cursor and advances the cursor by
    /// `dest.len()`.
    pub fn read_into(&mut self, dest: &mut [f32]) {
        for (i, out) in dest.iter_mut().enumerate() {
            *out = self.get(self.read_pos as i64 + i as i64);
        }
        self.read_pos += dest.len() as u64;
    }

    /// Moves the read cursor forward without producing output.
    pub fn skip(&mut self, samples: u64) {
        self.read_pos += samples;
    }
}

/// Synthesis ring for overlap-add. Frames are summed into the slots ahead of
/// the committed write position; reads are destructive so a consumed slot is
/// ready to accumulate the next overlapping frame.
pub struct OverlapRing {
    data: Box<[f32]>,
    /// Virtual start of the next frame. Everything before it is final.
    write_pos: u64,
    /// Virtual position of the next sample handed to the host.
    read_pos: u64,
}

impl OverlapRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)].into_boxed_slice(),
            write_pos: 0,
            read_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Finished samples waiting to be read.
    pub fn committed(&self) -> usize {
        (self.write_pos - self.read_pos) as usize
    }

    /// Adds `value` into the slot `offset` samples past the write position.
    #[inline]
    pub fn add(&mut self, offset: usize, value: f32) {
        let slot = ((self.write_pos + offset as u64) % self.data.len() as u64) as usize;
        self.data[slot] += value;
    }

    /// Marks the next `hop` samples as final.
    pub fn commit(&mut self, hop: usize) {
        self.write_pos += hop as u64;
    }

    /// Moves up to `dest.len()` finished samples into `dest`, zeroing their
    /// slots, and fills the rest of `dest` with silence. Returns how many
    /// finished samples were delivered.
    pub fn pull(&mut self, dest: &mut [f32]) -> usize {
        let ready = self.committed().min(dest.len());
        let capacity = self.data.len() as u64;
        for out in dest[..ready].iter_mut() {
            let slot = (self.read_pos % capacity) as usize;
            *out = self.data[slot];
            self.data[slot] = 0.0;
            self.read_pos += 1;
        }
        dest[ready..].fill(0.0);
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_ring_read_follows_write() {
        let mut ring = ChannelRing::new(16);
        ring.write(Some(&[1.0, 2.0, 3.0, 4.0]), 4);
        assert_eq!(ring.unread(), 4);

        let mut out = [0.0; 4];
        ring.read_into(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(ring.read_pos(), 4);
        assert_eq!(ring.unread(), 0);
    }

    #[test]
    fn test_channel_ring_out_of_range_is_silent() {
        let mut ring = ChannelRing::new(4);
        ring.write(Some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), 6);

        // Positions 0 and 1 have been evicted.
        assert_eq!(ring.get(0), 0.0);
        assert_eq!(ring.get(1), 0.0);
        assert_eq!(ring.get(2), 3.0);
        assert_eq!(ring.get(5), 6.0);
        // Not written yet, or before the stream started.
        assert_eq!(ring.get(6), 0.0);
        assert_eq!(ring.get(-3), 0.0);
    }

    #[test]
    fn test_channel_ring_short_block_is_padded() {
        let mut ring = ChannelRing::new(8);
        ring.write(Some(&[0.5, 0.5]), 4);
        ring.write(None, 2);
        assert_eq!(ring.write_pos(), 6);

        let mut out = [1.0; 6];
        ring.read_into(&mut out);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_channel_ring_skip() {
        let mut ring = ChannelRing::new(8);
        ring.write(Some(&[1.0, 2.0, 3.0, 4.0]), 4);
        ring.skip(3);

        let mut out = [0.0; 2];
        ring.read_into(&mut out);
        assert_eq!(out, [4.0, 0.0]);
    }

    #[test]
    fn test_overlap_ring_accumulates_and_clears() {
        let mut ring = OverlapRing::new(8);
        for i in 0..4 {
            ring.add(i, 1.0);
        }
        ring.commit(2);
        for i in 0..4 {
            ring.add(i, 1.0);
        }
        ring.commit(2);
        assert_eq!(ring.committed(), 4);

        let mut out = [9.0; 6];
        assert_eq!(ring.pull(&mut out), 4);
        assert_eq!(out, [1.0, 1.0, 2.0, 2.0, 0.0, 0.0]);

        // The tail of the second frame is still pending, the consumed slots are clean.
        ring.commit(2);
        let mut out = [9.0; 2];
        assert_eq!(ring.pull(&mut out), 2);
        assert_eq!(out, [1.0, 1.0]);
        ring.commit(4);
        let mut out = [9.0; 4];
        ring.pull(&mut out);
        assert_eq!(out, [0.0; 4]);
    }
}
