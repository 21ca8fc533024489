// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! Persistent settings live in a TOML file managed by `confy`. Every field
//! has a serde default so older or hand-edited files keep loading.

use std::time::Duration;

use glide_engine::{
    AltitudeUnit, DisplayFilter, DisplaySettings, SchedulerConfig, SpeedUnit, UnitPreferences,
    OPENSKY_STATES_URL,
};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "airjedi-live";
const CONFIG_NAME: &str = "config";

/// Where aircraft state comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Simulated,
    Opensky,
    Replay,
}

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    #[serde(default)]
    pub source: SourceKind,

    /// OpenSky states endpoint
    #[serde(default = "default_opensky_url")]
    pub opensky_url: String,

    /// Recorded batches used by the replay source
    #[serde(default)]
    pub replay_file: Option<String>,

    /// Seconds between fetches
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Records kept from each batch
    #[serde(default = "default_max_aircraft")]
    pub max_aircraft: usize,

    /// Animation frames per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    #[serde(default)]
    pub altitude_unit: AltitudeUnit,

    #[serde(default)]
    pub speed_unit: SpeedUnit,

    #[serde(default = "default_true")]
    pub animation_enabled: bool,

    #[serde(default)]
    pub show_trails: bool,

    /// Drop fetch results that resolve after a newer batch
    #[serde(default)]
    pub discard_stale_batches: bool,

    /// Seconds between status log lines
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1 // Current schema version
}

fn default_opensky_url() -> String {
    OPENSKY_STATES_URL.to_string()
}

fn default_update_interval() -> u64 {
    3
}

fn default_max_aircraft() -> usize {
    100
}

fn default_frame_rate() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

fn default_status_interval() -> u64 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            source: SourceKind::default(),
            opensky_url: default_opensky_url(),
            replay_file: None,
            update_interval_secs: default_update_interval(),
            max_aircraft: default_max_aircraft(),
            frame_rate: default_frame_rate(),
            altitude_unit: AltitudeUnit::default(),
            speed_unit: SpeedUnit::default(),
            animation_enabled: true,
            show_trails: false,
            discard_stale_batches: false,
            status_interval_secs: default_status_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating it with defaults on first run
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            period: Duration::from_secs(self.update_interval_secs.max(1)),
            frame_interval: Duration::from_secs(1) / self.frame_rate.clamp(1, 240),
            max_entities: self.max_aircraft.max(1),
            discard_stale_batches: self.discard_stale_batches,
            ..Default::default()
        }
    }

    pub fn display_settings(&self) -> DisplaySettings {
        DisplaySettings {
            filter: DisplayFilter::All,
            units: UnitPreferences {
                altitude: self.altitude_unit,
                speed: self.speed_unit,
            },
            trails_visible: self.show_trails,
            animation_enabled: self.animation_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"source":"opensky","altitude_unit":"ft"}"#).unwrap();
        assert_eq!(config.source, SourceKind::Opensky);
        assert_eq!(config.altitude_unit, AltitudeUnit::Feet);
        assert_eq!(config.update_interval_secs, 3);
        assert_eq!(config.max_aircraft, 100);
        assert!(config.animation_enabled);
        assert_eq!(config.opensky_url, OPENSKY_STATES_URL);
    }

    #[test]
    fn test_scheduler_config() {
        let config = AppConfig {
            update_interval_secs: 0,
            frame_rate: 50,
            ..Default::default()
        };
        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.period, Duration::from_secs(1));
        assert_eq!(scheduler.frame_interval, Duration::from_millis(20));
        assert_eq!(scheduler.max_entities, 100);
    }

    #[test]
    fn test_display_settings() {
        let config = AppConfig {
            speed_unit: SpeedUnit::Knots,
            show_trails: true,
            ..Default::default()
        };
        let settings = config.display_settings();
        assert_eq!(settings.units.speed, SpeedUnit::Knots);
        assert!(settings.trails_visible);
        assert_eq!(settings.filter, DisplayFilter::All);
    }
}
