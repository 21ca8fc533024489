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

//! In-memory map surface.

use std::collections::{HashMap, VecDeque};

use log::trace;

use super::{MapError, MapSurface, MarkerHandle, MarkerIcon, TrailHandle};
use crate::geo::GeoPoint;

/// What a marker currently looks like on the in-memory map.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerView {
    pub position: GeoPoint,
    pub heading_deg: f64,
    pub icon: MarkerIcon,
    pub popup: Option<String>,
}

/// Map surface that keeps markers and trails in hash maps.
#[derive(Debug, Default)]
pub struct MemoryMap {
    markers: HashMap<MarkerHandle, MarkerView>,
    trails: HashMap<TrailHandle, VecDeque<GeoPoint>>,
    next_id: u64,
}

impl MemoryMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    #[must_use]
    pub fn marker(&self, marker: MarkerHandle) -> Option<&MarkerView> {
        self.markers.get(&marker)
    }

    #[must_use]
    pub fn trail(&self, trail: TrailHandle) -> Option<Vec<GeoPoint>> {
        self.trails.get(&trail).map(|points| points.iter().copied().collect())
    }

    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    #[must_use]
    pub fn trail_count(&self) -> usize {
        self.trails.len()
    }
}

impl MapSurface for MemoryMap {
    fn create_marker(
        &mut self,
        position: GeoPoint,
        icon: &MarkerIcon,
    ) -> Result<MarkerHandle, MapError> {
        let handle = MarkerHandle::new(self.next_id());
        self.markers.insert(
            handle,
            MarkerView {
                position,
                heading_deg: 0.0,
                icon: icon.clone(),
                popup: None,
            },
        );
        trace!("Created {} at {}", handle, position);
        Ok(handle)
    }

    fn set_marker_position(
        &mut self,
        marker: MarkerHandle,
        position: GeoPoint,
    ) -> Result<(), MapError> {
        let view = self
            .markers
            .get_mut(&marker)
            .ok_or(MapError::UnknownMarker(marker))?;
        view.position = position;
        Ok(())
    }

    fn set_marker_heading(&mut self, marker: MarkerHandle, heading_deg: f64) -> Result<(), MapError> {
        let view = self
            .markers
            .get_mut(&marker)
            .ok_or(MapError::UnknownMarker(marker))?;
        view.heading_deg = heading_deg;
        Ok(())
    }

    fn set_marker_popup(&mut self, marker: MarkerHandle, text: &str) -> Result<(), MapError> {
        let view = self
            .markers
            .get_mut(&marker)
            .ok_or(MapError::UnknownMarker(marker))?;
        view.popup = Some(text.to_string());
        Ok(())
    }

    fn marker_position(&self, marker: MarkerHandle) -> Result<GeoPoint, MapError> {
        self.markers
            .get(&marker)
            .map(|view| view.position)
            .ok_or(MapError::UnknownMarker(marker))
    }

    fn remove_marker(&mut self, marker: MarkerHandle) -> Result<(), MapError> {
        self.markers
            .remove(&marker)
            .map(|_| trace!("Removed {}", marker))
            .ok_or(MapError::UnknownMarker(marker))
    }

    fn create_trail(&mut self, points: &[GeoPoint]) -> Result<TrailHandle, MapError> {
        let handle = TrailHandle::new(self.next_id());
        self.trails.insert(handle, points.iter().copied().collect());
        Ok(handle)
    }

    fn append_trail_point(
        &mut self,
        trail: TrailHandle,
        point: GeoPoint,
        max_points: usize,
    ) -> Result<(), MapError> {
        let points = self
            .trails
            .get_mut(&trail)
            .ok_or(MapError::UnknownTrail(trail))?;
        points.push_back(point);
        while points.len() > max_points {
            points.pop_front();
        }
        Ok(())
    }

    fn remove_trail(&mut self, trail: TrailHandle) -> Result<(), MapError> {
        self.trails
            .remove(&trail)
            .map(|_| ())
            .ok_or(MapError::UnknownTrail(trail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_roundtrip() {
        let mut map = MemoryMap::new();
        let icon = MarkerIcon::for_category(Some("private"));
        let marker = map.create_marker(GeoPoint::new(1.0, 2.0), &icon).unwrap();

        map.set_marker_position(marker, GeoPoint::new(3.0, 4.0)).unwrap();
        map.set_marker_heading(marker, 90.0).unwrap();
        map.set_marker_popup(marker, "hello").unwrap();

        let view = map.marker(marker).unwrap();
        assert_eq!(view.position, GeoPoint::new(3.0, 4.0));
        assert!((view.heading_deg - 90.0).abs() < f64::EPSILON);
        assert_eq!(view.popup.as_deref(), Some("hello"));
        assert_eq!(map.marker_position(marker), Ok(GeoPoint::new(3.0, 4.0)));

        map.remove_marker(marker).unwrap();
        assert_eq!(map.remove_marker(marker), Err(MapError::UnknownMarker(marker)));
        assert!(map.set_marker_position(marker, GeoPoint::new(0.0, 0.0)).is_err());
    }

    #[test]
    fn test_trail_append_respects_max() {
        let mut map = MemoryMap::new();
        let trail = map.create_trail(&[GeoPoint::new(0.0, 0.0)]).unwrap();
        for i in 1..=5 {
            map.append_trail_point(trail, GeoPoint::new(f64::from(i), 0.0), 3)
                .unwrap();
        }
        let lats: Vec<f64> = map.trail(trail).unwrap().iter().map(|p| p.lat).collect();
        assert_eq!(lats, vec![3.0, 4.0, 5.0]);

        map.remove_trail(trail).unwrap();
        assert_eq!(map.trail_count(), 0);
    }

    #[test]
    fn test_handles_are_unique() {
        let mut map = MemoryMap::new();
        let icon = MarkerIcon::for_category(None);
        let a = map.create_marker(GeoPoint::new(0.0, 0.0), &icon).unwrap();
        let b = map.create_marker(GeoPoint::new(0.0, 0.0), &icon).unwrap();
        assert_ne!(a, b);
        assert_eq!(map.marker_count(), 2);
    }
}
