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
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::wsola::clamp_ratio;
use crate::audio::StretchParams;

/// A YAML representation of the time-stretch settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Stretch {
    /// Whether the stretch engine runs at all (default: true).
    enabled: Option<bool>,

    /// Stretch ratio at start-up, clamped to [0.5, 2.0] (default: 1.0).
    ratio: Option<f64>,

    /// Analysis frame length in samples (default: 2048).
    frame_size: Option<usize>,

    /// Input advance per frame in samples (default: 512).
    analysis_hop: Option<usize>,

    /// Splice search reach either side of the nominal position (default: 128).
    max_seek: Option<usize>,

    /// Correlation subsampling step (default: 4).
    correlation_stride: Option<usize>,

    /// Ring size in frames (default: 8).
    ring_frames: Option<usize>,

    /// Keep unity gain regardless of the overlap (default: false).
    normalize_gain: Option<bool>,
}

impl Stretch {
    /// Returns whether stretching is enabled (default: true).
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = Some(enabled);
    }

    /// Resolves the settings into engine parameters.
    pub fn params(&self) -> Result<StretchParams, ConfigError> {
        let defaults = StretchParams::default();
        let initial_ratio = match self.ratio {
            Some(ratio) => clamp_ratio(ratio)
                .ok_or_else(|| ConfigError::out_of_range("ratio", "must be a finite number"))?,
            None => defaults.initial_ratio,
        };
        let params = StretchParams {
            frame_size: self.frame_size.unwrap_or(defaults.frame_size),
            analysis_hop: self.analysis_hop.unwrap_or(defaults.analysis_hop),
            max_seek: self.max_seek.unwrap_or(defaults.max_seek),
            correlation_stride: self
                .correlation_stride
                .unwrap_or(defaults.correlation_stride),
            ring_frames: self.ring_frames.unwrap_or(defaults.ring_frames),
            normalize_gain: self.normalize_gain.unwrap_or(defaults.normalize_gain),
            initial_ratio,
        };

        if params.frame_size < 2 {
            return Err(ConfigError::out_of_range(
                "frame_size",
                "must be at least 2 samples",
            ));
        }
        if params.analysis_hop == 0 || params.analysis_hop > params.frame_size {
            return Err(ConfigError::out_of_range(
                "analysis_hop",
                format!("must be between 1 and frame_size ({})", params.frame_size),
            ));
        }
        if params.max_seek >= params.frame_size {
            return Err(ConfigError::out_of_range(
                "max_seek",
                format!("must be below frame_size ({})", params.frame_size),
            ));
        }
        if params.correlation_stride == 0 {
            return Err(ConfigError::out_of_range(
                "correlation_stride",
                "must be at least 1",
            ));
        }
        if params.ring_frames == 0 {
            return Err(ConfigError::out_of_range(
                "ring_frames",
                "must be at least 1",
            ));
        }

        Ok(params)
    }
}
