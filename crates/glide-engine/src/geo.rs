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

//! Flat-earth geometry helpers.
//!
//! Everything here uses the equirectangular approximation: one degree of
//! latitude is a fixed number of metres, and a degree of longitude shrinks with
//! the cosine of the latitude. That is plenty for animating a marker a few
//! hundred metres between feed updates.

use serde::{Deserialize, Serialize};

/// Metres covered by one degree of latitude.
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Lower bound for `cos(latitude)` so longitude steps stay finite near the poles.
pub const MIN_COS_LATITUDE: f64 = 0.0001;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both coordinates are finite and inside the usual degree ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Move `distance_m` metres along `bearing_deg` (0 = north, clockwise).
    #[must_use]
    pub fn offset(self, distance_m: f64, bearing_deg: f64) -> Self {
        let (d_lat, d_lon) = offset_degrees(self.lat, distance_m, bearing_deg);
        Self {
            lat: self.lat + d_lat,
            lon: self.lon + d_lon,
        }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}°, {:.5}°", self.lat, self.lon)
    }
}

/// Degree deltas `(lat, lon)` for a displacement of `distance_m` metres along
/// `bearing_deg`, starting at latitude `lat_deg`.
#[must_use]
pub fn offset_degrees(lat_deg: f64, distance_m: f64, bearing_deg: f64) -> (f64, f64) {
    let bearing_rad = bearing_deg.to_radians();
    let mut cos_lat = lat_deg.to_radians().cos();
    if !cos_lat.is_finite() {
        cos_lat = 1.0;
    }
    let cos_lat = cos_lat.max(MIN_COS_LATITUDE);

    let d_lat = (distance_m / METERS_PER_DEGREE_LAT) * bearing_rad.cos();
    let d_lon = (distance_m / (METERS_PER_DEGREE_LAT * cos_lat)) * bearing_rad.sin();
    (d_lat, d_lon)
}

/// Normalize a bearing into `[0, 360)`.
#[must_use]
pub fn normalize_bearing(bearing_deg: f64) -> f64 {
    bearing_deg.rem_euclid(360.0)
}
