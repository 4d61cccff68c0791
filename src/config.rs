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

use config::{Config, File};
use serde::Deserialize;

mod beat_sync;
mod error;
mod stretch;

pub use self::beat_sync::BeatSync;
pub use self::error::ConfigError;
pub use self::stretch::Stretch;

use crate::control::DEFAULT_CONTROL_CAPACITY;

const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_BLOCK_SIZE: usize = 128;

/// Settings for one captured stream.
///
/// ```yaml
/// sample_rate: 48000
/// block_size: 128
/// beat_sync:
///   max_drift: 2s
///   ring_duration: 4s
/// stretch:
///   ratio: 1.25
/// ```
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Settings {
    /// Stream sample rate in Hz (default: 48000).
    sample_rate: Option<u32>,

    /// Host quantum in frames (default: 128).
    block_size: Option<usize>,

    /// Depth of the control queue (default: 32).
    control_capacity: Option<usize>,

    /// Beat-aligned padding.
    beat_sync: Option<BeatSync>,

    /// Time stretching.
    stretch: Option<Stretch>,
}

impl Settings {
    /// Parse settings from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Settings, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Settings>()?)
    }

    /// Parse settings from a file and check every section.
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let settings = Settings::deserialize(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Returns the sample rate (default: 48000).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the block size (default: 128).
    pub fn block_size(&self) -> usize {
        self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE)
    }

    /// Returns the control queue depth (default: 32).
    pub fn control_capacity(&self) -> usize {
        self.control_capacity.unwrap_or(DEFAULT_CONTROL_CAPACITY)
    }

    /// Returns the padding section, or its defaults if absent.
    pub fn beat_sync(&self) -> BeatSync {
        self.beat_sync.clone().unwrap_or_default()
    }

    /// Returns the stretch section, or its defaults if absent.
    pub fn stretch(&self) -> Stretch {
        self.stretch.clone().unwrap_or_default()
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = Some(sample_rate);
    }

    /// Switches engines off regardless of what the file says.
    pub fn disable(&mut self, beat_sync: bool, stretch: bool) {
        if beat_sync {
            self.beat_sync
                .get_or_insert_with(BeatSync::default)
                .set_enabled(false);
        }
        if stretch {
            self.stretch
                .get_or_insert_with(Stretch::default)
                .set_enabled(false);
        }
    }

    /// Checks the top-level values and resolves both engine sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::OutOfRange {
                field: "sample_rate",
                message: "must be positive".to_string(),
            });
        }
        if self.block_size() == 0 {
            return Err(ConfigError::OutOfRange {
                field: "block_size",
                message: "must be positive".to_string(),
            });
        }
        if self.control_capacity() == 0 {
            return Err(ConfigError::OutOfRange {
                field: "control_capacity",
                message: "must be positive".to_string(),
            });
        }
        self.beat_sync().params()?;
        self.stretch().params()?;
        Ok(())
    }
}
