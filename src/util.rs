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
use std::path::Path;

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Converts a sample count at the given rate to seconds.
pub fn seconds(samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 / f64::from(sample_rate)
}

/// Outputs a time in seconds in a minutes:seconds.millis format.
pub fn minutes_seconds(secs: f64) -> String {
    let millis = (secs.max(0.0) * 1000.0).round() as u64;
    let minutes = millis / 60_000;
    let rest = millis % 60_000;
    format!("{}:{:02}.{:03}", minutes, rest / 1000, rest % 1000)
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use crate::util::{filename_display, minutes_seconds, seconds};

    #[test]
    fn test_seconds() {
        assert_eq!(seconds(48000, 48000), 1.0);
        assert_eq!(seconds(24000, 48000), 0.5);
        assert_eq!(seconds(100, 0), 0.0);
    }

    #[test]
    fn test_minutes_seconds_strings() {
        assert_eq!("0:00.000", minutes_seconds(0.0));
        assert_eq!("0:00.401", minutes_seconds(0.4013));
        assert_eq!("0:05.000", minutes_seconds(5.0));
        assert_eq!("1:00.000", minutes_seconds(60.0));
        assert_eq!("2:05.250", minutes_seconds(125.25));
        assert_eq!("0:00.000", minutes_seconds(-3.0));
    }

    #[test]
    fn test_filename_display() {
        assert_eq!(filename_display(Path::new("/tmp/call.wav")), "call.wav");
        assert_eq!(filename_display(Path::new("/")), "unreadable file name");
    }
}
