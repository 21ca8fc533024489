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

//! OpenSky Network state-vector parser.
//!
//! `/api/states/all` returns each aircraft as a positional array:
//! ```text
//! [icao24, callsign, origin_country, time_position, last_contact,
//!  longitude, latitude, baro_altitude, on_ground, velocity, true_track,
//!  vertical_rate, sensors, geo_altitude, squawk, spi, position_source]
//! ```

use log::debug;
use serde_json::{Map, Value};

use super::{Batch, ParseError, Protocol, StateRecord};

/// Category assigned to every OpenSky aircraft; the feed carries none we map.
const DEFAULT_CATEGORY: &str = "commercial";

/// Minimum row length we accept (through `position_source`).
const STATE_VECTOR_FIELDS: usize = 17;

/// Parser for OpenSky `/states/all` responses.
#[derive(Debug, Default)]
pub struct OpenSkyParser;

impl OpenSkyParser {
    /// Create a new OpenSky parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Decode an already-parsed response body.
    pub fn parse_value(&self, value: &Value) -> Result<Batch, ParseError> {
        let Value::Object(object) = value else {
            return Err(ParseError::InvalidFormat(
                "OpenSky response must be a JSON object".to_string(),
            ));
        };

        let rows = match object.get("states") {
            None | Some(Value::Null) => return Ok(Batch::default()),
            Some(Value::Array(rows)) => rows,
            Some(other) => {
                return Err(ParseError::InvalidValue {
                    field: "states",
                    value: other.to_string(),
                })
            }
        };

        let states = rows.iter().filter_map(parse_state_vector).collect();
        Ok(Batch::new(states))
    }
}

impl Protocol for OpenSkyParser {
    type Message = Batch;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<Batch>, ParseError> {
        let value: Value = serde_json::from_slice(input)?;
        self.parse_value(&value).map(Some)
    }
}

fn str_at(row: &[Value], index: usize) -> Option<String> {
    row.get(index)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn f64_at(row: &[Value], index: usize) -> Option<f64> {
    row.get(index).and_then(Value::as_f64)
}

fn bool_at(row: &[Value], index: usize) -> Option<bool> {
    row.get(index).and_then(Value::as_bool)
}

/// Parse one state-vector row. Returns `None` for rows we cannot use.
fn parse_state_vector(row: &Value) -> Option<StateRecord> {
    let Some(row) = row.as_array() else {
        debug!("Dropping non-array OpenSky state vector");
        return None;
    };
    if row.len() < STATE_VECTOR_FIELDS {
        debug!("Dropping short OpenSky state vector ({} fields)", row.len());
        return None;
    }

    let icao24 = str_at(row, 0)?;

    // Fields the engine has no typed slot for ride along as attributes
    let mut attributes = Map::new();
    for (index, name) in [
        (3, "timePosition"),
        (4, "lastContact"),
        (12, "sensors"),
        (13, "geoAltitude"),
        (14, "squawk"),
        (15, "spi"),
    ] {
        if let Some(value) = row.get(index).filter(|v| !v.is_null()) {
            attributes.insert(name.to_string(), value.clone());
        }
    }

    let last_update = row
        .get(4)
        .and_then(Value::as_i64)
        .map(|secs| secs.saturating_mul(1000));

    Some(StateRecord {
        icao24: Some(icao24),
        callsign: str_at(row, 1),
        origin_country: str_at(row, 2),
        longitude: f64_at(row, 5),
        latitude: f64_at(row, 6),
        baro_altitude: f64_at(row, 7),
        on_ground: bool_at(row, 8),
        velocity: f64_at(row, 9),
        true_track: f64_at(row, 10),
        vertical_rate: f64_at(row, 11),
        position_source: row
            .get(16)
            .and_then(Value::as_u64)
            .and_then(|v| u8::try_from(v).ok()),
        category: Some(DEFAULT_CATEGORY.to_string()),
        last_update,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = br#"{
        "time": 1700000000,
        "states": [
            ["4b1815", "SWR123  ", "Switzerland", 1700000000, 1700000001,
             8.5, 47.4, 10000.0, false, 230.5, 91.2, -1.5, null, 10200.0, "1000", false, 0],
            ["short", "X"],
            [null, "NOID", "Nowhere", null, null, 1.0, 2.0, null, false, null, null, null, null, null, null, false, 0]
        ]
    }"#;

    #[test]
    fn test_parse_state_vectors() {
        let mut parser = OpenSkyParser::new();
        let batch = parser.parse(SAMPLE).unwrap().unwrap();
        assert_eq!(batch.len(), 1);

        let record = &batch.states[0];
        assert_eq!(record.id(), Some("4b1815"));
        assert_eq!(record.callsign.as_deref(), Some("SWR123"));
        assert_eq!(record.origin_country.as_deref(), Some("Switzerland"));
        assert!((record.latitude.unwrap() - 47.4).abs() < 1e-9);
        assert!((record.longitude.unwrap() - 8.5).abs() < 1e-9);
        assert!((record.speed_mps() - 230.5).abs() < 1e-9);
        assert_eq!(record.on_ground, Some(false));
        assert_eq!(record.position_source, Some(0));
        assert_eq!(record.category.as_deref(), Some("commercial"));
        assert_eq!(record.last_update, Some(1_700_000_001_000));
        assert_eq!(record.attributes.get("squawk"), Some(&Value::from("1000")));
        assert!(!record.attributes.contains_key("sensors"));
    }

    #[test]
    fn test_null_states() {
        let mut parser = OpenSkyParser::new();
        let batch = parser.parse(br#"{"time":1,"states":null}"#).unwrap().unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_invalid_json() {
        let mut parser = OpenSkyParser::new();
        assert!(matches!(parser.parse(b"{not json"), Err(ParseError::Json(_))));
    }
}
