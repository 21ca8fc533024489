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

//! Unit preferences and the popup/detail text rendered with them.
//!
//! Records always carry SI values (metres, m/s). Conversion happens only when
//! text is produced, so changing a preference never touches stored state.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::protocol::StateRecord;

const FEET_PER_METER: f64 = 3.28084;
const KNOTS_PER_MPS: f64 = 1.94384;
const KMH_PER_MPS: f64 = 3.6;
const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AltitudeUnit {
    #[default]
    #[serde(rename = "m")]
    Meters,
    #[serde(rename = "ft")]
    Feet,
}

impl FromStr for AltitudeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "meters" | "metres" => Ok(Self::Meters),
            "ft" | "feet" => Ok(Self::Feet),
            other => Err(format!("unknown altitude unit '{other}' (expected m or ft)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpeedUnit {
    #[default]
    #[serde(rename = "kmh")]
    KilometersPerHour,
    #[serde(rename = "kn")]
    Knots,
}

impl FromStr for SpeedUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kmh" | "km/h" => Ok(Self::KilometersPerHour),
            "kn" | "kt" | "knots" => Ok(Self::Knots),
            other => Err(format!("unknown speed unit '{other}' (expected kmh or kn)")),
        }
    }
}

/// Units used when rendering popup and detail text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitPreferences {
    pub altitude: AltitudeUnit,
    pub speed: SpeedUnit,
}

impl UnitPreferences {
    #[must_use]
    pub fn format_altitude(&self, meters: Option<f64>) -> String {
        match meters.filter(|m| m.is_finite()) {
            Some(m) => match self.altitude {
                AltitudeUnit::Meters => format!("{:.0} m", m.round()),
                AltitudeUnit::Feet => format!("{:.0} ft", (m * FEET_PER_METER).round()),
            },
            None => NOT_AVAILABLE.to_string(),
        }
    }

    #[must_use]
    pub fn format_speed(&self, mps: Option<f64>) -> String {
        match mps.filter(|v| v.is_finite()) {
            Some(v) => match self.speed {
                SpeedUnit::KilometersPerHour => format!("{:.0} km/h", (v * KMH_PER_MPS).round()),
                SpeedUnit::Knots => format!("{:.0} kn", (v * KNOTS_PER_MPS).round()),
            },
            None => NOT_AVAILABLE.to_string(),
        }
    }

    /// Short text bound to the marker popup.
    #[must_use]
    pub fn popup_text(&self, id: &str, record: &StateRecord) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "{}", or_na(record.callsign.as_deref()));
        let _ = writeln!(text, "ICAO24: {id}");
        let _ = writeln!(text, "Country: {}", or_na(record.origin_country.as_deref()));
        let _ = writeln!(text, "Type: {}", or_na(record.category.as_deref()));
        let _ = writeln!(text, "Altitude: {}", self.format_altitude(record.baro_altitude));
        let _ = writeln!(text, "Velocity: {}", self.format_speed(record.velocity));
        let _ = write!(text, "Track: {}", format_track(record.true_track));
        text
    }

    /// Full text shown when an entity is selected.
    #[must_use]
    pub fn detail_text(&self, id: &str, record: &StateRecord) -> String {
        let mut text = self.popup_text(id, record);
        let vertical_rate = record
            .vertical_rate
            .filter(|v| v.is_finite())
            .map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{:.0} m/s", v.round()));
        let on_ground = if record.on_ground.unwrap_or(false) { "Yes" } else { "No" };
        let _ = write!(text, "\nVertical Rate: {vertical_rate}\nOn Ground: {on_ground}");
        text
    }
}

fn or_na(value: Option<&str>) -> &str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(NOT_AVAILABLE)
}

fn format_track(track: Option<f64>) -> String {
    track
        .filter(|t| t.is_finite())
        .map_or_else(|| NOT_AVAILABLE.to_string(), |t| format!("{:.0}°", t.round()))
}
