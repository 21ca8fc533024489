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

//! Protocol layer for aircraft-state batches.
//!
//! A data source hands the engine a [`Batch`] of [`StateRecord`]s. Two wire
//! formats decode into that shape:
//!
//! - the record form, `{ "states": [ { "icao24": ..., "latitude": ... } ] }`,
//!   used by the simulator and by replay files
//! - OpenSky `/states/all` positional state vectors

mod opensky;
mod records;

pub use opensky::OpenSkyParser;
pub use records::RecordBatchParser;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::geo::GeoPoint;

/// Errors that can occur while decoding a batch.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("invalid value for field '{field}': {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// One aircraft-state record as delivered by a data source.
///
/// Every field is optional on the wire. Fields the engine does not know about
/// are kept in [`attributes`](Self::attributes) and travel with the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRecord {
    /// ICAO 24-bit address; the tracking key.
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub icao24: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Barometric altitude in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baro_altitude: Option<f64>,
    /// Ground speed in metres per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    /// Track over ground in degrees (0 = north, clockwise).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_track: Option<f64>,
    /// Vertical rate in metres per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_ground: Option<bool>,
    /// Icon class, e.g. `commercial`, `cargo`, `military`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Sensor tag the position came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_source: Option<u8>,
    /// Source timestamp in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<i64>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl StateRecord {
    /// Create a record with only the identifier set.
    #[must_use]
    pub fn new(icao24: impl Into<String>) -> Self {
        Self {
            icao24: Some(icao24.into()),
            ..Default::default()
        }
    }

    /// Builder-style helper for the position fields.
    #[must_use]
    pub fn with_position(mut self, lat: f64, lon: f64) -> Self {
        self.latitude = Some(lat);
        self.longitude = Some(lon);
        self
    }

    /// Builder-style helper for speed (m/s) and track (degrees).
    #[must_use]
    pub fn with_motion(mut self, velocity: f64, true_track: f64) -> Self {
        self.velocity = Some(velocity);
        self.true_track = Some(true_track);
        self
    }

    /// The tracking key, if present and non-blank.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.icao24
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// The reported position, if both coordinates are present and sane.
    #[must_use]
    pub fn position(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)).filter(GeoPoint::is_valid),
            _ => None,
        }
    }

    /// Ground speed in m/s, zero when unknown.
    #[must_use]
    pub fn speed_mps(&self) -> f64 {
        self.velocity.filter(|v| v.is_finite()).unwrap_or(0.0)
    }

    /// Track in degrees, if reported.
    #[must_use]
    pub fn bearing(&self) -> Option<f64> {
        self.true_track.filter(|t| t.is_finite())
    }
}

/// A set of records fetched in one ingestion tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default, alias = "entities")]
    pub states: Vec<StateRecord>,
}

impl Batch {
    #[must_use]
    pub fn new(states: Vec<StateRecord>) -> Self {
        Self { states }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Keep at most `max` records.
    pub fn truncate(&mut self, max: usize) {
        if self.states.len() > max {
            debug!("Truncating batch from {} to {} records", self.states.len(), max);
            self.states.truncate(max);
        }
    }
}

/// Trait for batch decoders.
///
/// Implement this trait to accept another feed format.
pub trait Protocol {
    /// The message type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse input bytes into a message.
    ///
    /// Returns `Ok(Some(message))` if parsing succeeded,
    /// `Ok(None)` if the input is valid but doesn't produce a message,
    /// or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}
