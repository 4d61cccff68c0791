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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::BeatSyncParams;

/// A YAML representation of the beat-aligned padding settings. Every field is
/// optional; missing fields take the engine defaults.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct BeatSync {
    /// Whether the padding engine runs at all (default: true).
    enabled: Option<bool>,

    /// Block RMS below which a block is silent (default: 0.01).
    rms_threshold: Option<f32>,

    /// Consecutive silent blocks that confirm a pause (default: 3).
    silence_confirm_blocks: Option<u32>,

    /// Consecutive loud blocks that confirm speech (default: 2).
    speech_confirm_blocks: Option<u32>,

    /// Shortest pad worth inserting, e.g. "20ms".
    min_pad: Option<String>,

    /// Longest pad allowed, e.g. "500ms".
    max_pad: Option<String>,

    /// Drift at which pauses are spent catching up, e.g. "2s".
    max_drift: Option<String>,

    /// Drift at which catching up stops, e.g. "10ms".
    settle_drift: Option<String>,

    /// Samples skipped per block while catching up (default: 256).
    catch_up_quantum: Option<usize>,

    /// History kept per channel, e.g. "4s".
    ring_duration: Option<String>,

    /// Engine time at the first block, in seconds (default: 0).
    start_time: Option<f64>,
}

fn seconds(
    field: &'static str,
    value: &Option<String>,
    default: f64,
) -> Result<f64, ConfigError> {
    match value {
        Some(value) => {
            let duration: Duration = DurationString::from_string(value.clone())
                .map_err(|e| ConfigError::InvalidDuration {
                    field,
                    value: value.clone(),
                    message: e.to_string(),
                })?
                .into();
            Ok(duration.as_secs_f64())
        }
        None => Ok(default),
    }
}

impl BeatSync {
    /// Returns whether padding is enabled (default: true).
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = Some(enabled);
    }

    /// Resolves the settings into engine parameters, checking that they make
    /// sense together.
    pub fn params(&self) -> Result<BeatSyncParams, ConfigError> {
        let defaults = BeatSyncParams::default();
        let params = BeatSyncParams {
            rms_threshold: self.rms_threshold.unwrap_or(defaults.rms_threshold),
            silence_confirm: self
                .silence_confirm_blocks
                .unwrap_or(defaults.silence_confirm),
            speech_confirm: self
                .speech_confirm_blocks
                .unwrap_or(defaults.speech_confirm),
            min_pad: seconds("min_pad", &self.min_pad, defaults.min_pad)?,
            max_pad: seconds("max_pad", &self.max_pad, defaults.max_pad)?,
            max_drift: seconds("max_drift", &self.max_drift, defaults.max_drift)?,
            settle_drift: seconds("settle_drift", &self.settle_drift, defaults.settle_drift)?,
            catch_up_quantum: self.catch_up_quantum.unwrap_or(defaults.catch_up_quantum),
            ring_duration: seconds("ring_duration", &self.ring_duration, defaults.ring_duration)?,
            start_time: self.start_time.unwrap_or(defaults.start_time),
        };

        if !params.rms_threshold.is_finite() || params.rms_threshold <= 0.0 {
            return Err(ConfigError::out_of_range(
                "rms_threshold",
                "must be a positive number",
            ));
        }
        if params.silence_confirm == 0 {
            return Err(ConfigError::out_of_range(
                "silence_confirm_blocks",
                "must be at least 1",
            ));
        }
        if params.speech_confirm == 0 {
            return Err(ConfigError::out_of_range(
                "speech_confirm_blocks",
                "must be at least 1",
            ));
        }
        if params.min_pad >= params.max_pad {
            return Err(ConfigError::out_of_range(
                "min_pad",
                format!(
                    "{}s must be below max_pad ({}s)",
                    params.min_pad, params.max_pad
                ),
            ));
        }
        if params.settle_drift >= params.max_drift {
            return Err(ConfigError::out_of_range(
                "settle_drift",
                format!(
                    "{}s must be below max_drift ({}s)",
                    params.settle_drift, params.max_drift
                ),
            ));
        }
        if params.catch_up_quantum == 0 {
            return Err(ConfigError::out_of_range(
                "catch_up_quantum",
                "must be at least 1",
            ));
        }
        // The ring has to hold the worst-case delay: full drift plus one pad.
        if params.ring_duration <= params.max_drift + params.max_pad {
            return Err(ConfigError::out_of_range(
                "ring_duration",
                format!(
                    "{}s cannot hold max_drift plus max_pad ({}s)",
                    params.ring_duration,
                    params.max_drift + params.max_pad
                ),
            ));
        }
        if !params.start_time.is_finite() {
            return Err(ConfigError::out_of_range("start_time", "must be finite"));
        }

        Ok(params)
    }
}
