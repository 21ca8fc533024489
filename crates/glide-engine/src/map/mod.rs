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

//! Map surface abstraction.
//!
//! The engine never draws anything itself. It talks to whatever renders the
//! map through [`MapSurface`] and keeps the returned handles inside its own
//! entity records. [`MemoryMap`] is a complete in-memory surface used by the
//! headless application and the tests.

mod memory;

pub use memory::{MarkerView, MemoryMap};

use thiserror::Error;

use crate::geo::GeoPoint;

/// Opaque reference to a marker owned by the map surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(u64);

impl MarkerHandle {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MarkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// Opaque reference to a trail polyline owned by the map surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrailHandle(u64);

impl TrailHandle {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TrailHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "trail#{}", self.0)
    }
}

/// Errors reported by a map surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("unknown {0}")]
    UnknownMarker(MarkerHandle),

    #[error("unknown {0}")]
    UnknownTrail(TrailHandle),
}

/// Icon drawn for a marker, classified by aircraft category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerIcon {
    pub category: Option<String>,
    pub size_px: u32,
}

impl MarkerIcon {
    pub const DEFAULT_SIZE_PX: u32 = 28;

    #[must_use]
    pub fn for_category(category: Option<&str>) -> Self {
        Self {
            category: category
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_lowercase),
            size_px: Self::DEFAULT_SIZE_PX,
        }
    }

    /// Style class for the icon, e.g. `aircraft-icon cargo`.
    #[must_use]
    pub fn class_name(&self) -> String {
        match &self.category {
            Some(category) => format!("aircraft-icon {category}"),
            None => "aircraft-icon".to_string(),
        }
    }
}

/// Operations the engine needs from a map renderer.
///
/// Every call is fallible: a marker may have been torn down underneath the
/// engine. Callers log and skip on error rather than abort.
pub trait MapSurface {
    /// Add a marker at `position` and return its handle.
    fn create_marker(&mut self, position: GeoPoint, icon: &MarkerIcon)
        -> Result<MarkerHandle, MapError>;

    /// Move a marker.
    fn set_marker_position(&mut self, marker: MarkerHandle, position: GeoPoint)
        -> Result<(), MapError>;

    /// Rotate a marker's icon to `heading_deg`.
    fn set_marker_heading(&mut self, marker: MarkerHandle, heading_deg: f64)
        -> Result<(), MapError>;

    /// Replace a marker's popup text.
    fn set_marker_popup(&mut self, marker: MarkerHandle, text: &str) -> Result<(), MapError>;

    /// The position the marker is currently drawn at.
    fn marker_position(&self, marker: MarkerHandle) -> Result<GeoPoint, MapError>;

    /// Remove a marker from the map.
    fn remove_marker(&mut self, marker: MarkerHandle) -> Result<(), MapError>;

    /// Add a trail polyline through `points`.
    fn create_trail(&mut self, points: &[GeoPoint]) -> Result<TrailHandle, MapError>;

    /// Append a point to a trail, dropping the oldest points beyond `max_points`.
    fn append_trail_point(
        &mut self,
        trail: TrailHandle,
        point: GeoPoint,
        max_points: usize,
    ) -> Result<(), MapError>;

    /// Remove a trail from the map.
    fn remove_trail(&mut self, trail: TrailHandle) -> Result<(), MapError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_class_name() {
        assert_eq!(
            MarkerIcon::for_category(Some("Cargo")).class_name(),
            "aircraft-icon cargo"
        );
        assert_eq!(MarkerIcon::for_category(Some(" ")).class_name(), "aircraft-icon");
        assert_eq!(MarkerIcon::for_category(None).class_name(), "aircraft-icon");
    }

    #[test]
    fn test_error_display() {
        let err = MapError::UnknownMarker(MarkerHandle::new(7));
        assert_eq!(err.to_string(), "unknown marker#7");
        let err = MapError::UnknownTrail(TrailHandle::new(3));
        assert_eq!(err.to_string(), "unknown trail#3");
    }
}
