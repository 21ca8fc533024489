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

//! Kinematic state store.
//!
//! Holds one [`TrackedEntity`] per identifier. Each entity carries the last
//! authoritative record from the feed and, once it has a marker on the map,
//! a [`DisplayState`] with the animated (predicted) position, the trail and
//! the marker handle itself.
//!
//! Ingestion owns the authoritative fields and creation/removal. Animation
//! owns `animated_position` and the animation clock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::geo::GeoPoint;
use crate::map::{MarkerHandle, TrailHandle};
use crate::protocol::StateRecord;

/// Maximum number of points kept in a trail.
pub const TRAIL_CAPACITY: usize = 50;

/// The latest record received for an entity.
#[derive(Debug, Clone)]
pub struct AuthoritativeState {
    pub record: StateRecord,
    pub received_at: DateTime<Utc>,
}

/// Bounded FIFO of past positions, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Trail {
    points: VecDeque<GeoPoint>,
    capacity: usize,
}

impl Trail {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting and returning the oldest one when full.
    pub fn push(&mut self, point: GeoPoint) -> Option<GeoPoint> {
        let evicted = if self.points.len() >= self.capacity {
            self.points.pop_front()
        } else {
            None
        };
        self.points.push_back(point);
        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn last(&self) -> Option<GeoPoint> {
        self.points.back().copied()
    }

    pub fn points(&self) -> impl Iterator<Item = &GeoPoint> {
        self.points.iter()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<GeoPoint> {
        self.points.iter().copied().collect()
    }
}

/// A trail drawn on the map together with its history.
#[derive(Debug, Clone)]
pub struct TrailState {
    pub handle: TrailHandle,
    pub history: Trail,
}

/// Everything that exists only while an entity has a marker on the map.
#[derive(Debug, Clone)]
pub struct DisplayState {
    pub marker: MarkerHandle,
    /// Position currently shown; advanced every frame.
    pub animated_position: GeoPoint,
    /// Heading used for extrapolation and icon rotation.
    pub animated_bearing: f64,
    /// Last authoritative ground speed in m/s.
    pub speed_mps: f64,
    animation_clock: Instant,
    pub trail: Option<TrailState>,
}

impl DisplayState {
    #[must_use]
    pub fn new(
        marker: MarkerHandle,
        position: GeoPoint,
        bearing: f64,
        speed_mps: f64,
        now: Instant,
    ) -> Self {
        Self {
            marker,
            animated_position: position,
            animated_bearing: bearing,
            speed_mps,
            animation_clock: now,
            trail: None,
        }
    }

    /// Instant of the last frame that advanced the animated position.
    #[must_use]
    pub fn animation_clock(&self) -> Instant {
        self.animation_clock
    }

    /// Move the animation clock forward. Earlier instants are ignored.
    pub fn advance_clock(&mut self, now: Instant) {
        if now > self.animation_clock {
            self.animation_clock = now;
        }
    }
}

/// One aircraft known to the engine.
#[derive(Debug, Clone)]
pub struct TrackedEntity {
    pub id: String,
    pub authoritative: AuthoritativeState,
    pub display: Option<DisplayState>,
}

impl TrackedEntity {
    #[must_use]
    pub fn has_marker(&self) -> bool {
        self.display.is_some()
    }

    /// The animated position, if the entity is on the map.
    #[must_use]
    pub fn displayed_position(&self) -> Option<GeoPoint> {
        self.display.as_ref().map(|d| d.animated_position)
    }
}

/// Identifier-keyed store of tracked entities.
#[derive(Debug, Default)]
pub struct StateStore {
    entities: HashMap<String, TrackedEntity>,
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TrackedEntity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TrackedEntity> {
        self.entities.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<TrackedEntity> {
        self.entities.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedEntity> {
        self.entities.values_mut()
    }

    /// Number of entities that currently have a marker.
    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.entities.values().filter(|e| e.has_marker()).count()
    }

    /// Identifiers in sorted order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entities.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Replace the authoritative record for `id`, creating the entity if needed.
    pub fn upsert_authoritative(
        &mut self,
        id: &str,
        record: StateRecord,
        received_at: DateTime<Utc>,
    ) -> &mut TrackedEntity {
        let authoritative = AuthoritativeState {
            record,
            received_at,
        };

        match self.entities.entry(id.to_string()) {
            std::collections::hash_map::Entry::Occupied(entry) => {
                let entity = entry.into_mut();
                entity.authoritative = authoritative;
                entity
            }
            std::collections::hash_map::Entry::Vacant(entry) => entry.insert(TrackedEntity {
                id: id.to_string(),
                authoritative,
                display: None,
            }),
        }
    }

    /// The held authoritative records, sorted by identifier.
    #[must_use]
    pub fn records(&self) -> Vec<StateRecord> {
        let mut entities: Vec<&TrackedEntity> = self.entities.values().collect();
        entities.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        entities
            .into_iter()
            .map(|e| e.authoritative.record.clone())
            .collect()
    }

    /// Remove and return every entity whose identifier is not in `keep`.
    pub fn take_absent(&mut self, keep: &HashSet<String>) -> Vec<TrackedEntity> {
        let absent: Vec<String> = self
            .entities
            .keys()
            .filter(|id| !keep.contains(*id))
            .cloned()
            .collect();

        absent
            .into_iter()
            .filter_map(|id| self.entities.remove(&id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trail_keeps_most_recent_points() {
        let mut trail = Trail::new(TRAIL_CAPACITY);
        for i in 0..60 {
            trail.push(GeoPoint::new(f64::from(i), 0.0));
        }
        assert_eq!(trail.len(), TRAIL_CAPACITY);
        let lats: Vec<f64> = trail.points().map(|p| p.lat).collect();
        let expected: Vec<f64> = (10..60).map(f64::from).collect();
        assert_eq!(lats, expected);
    }

    #[test]
    fn test_trail_push_reports_eviction() {
        let mut trail = Trail::new(2);
        assert!(trail.push(GeoPoint::new(1.0, 0.0)).is_none());
        assert!(trail.push(GeoPoint::new(2.0, 0.0)).is_none());
        assert_eq!(trail.push(GeoPoint::new(3.0, 0.0)), Some(GeoPoint::new(1.0, 0.0)));
        assert_eq!(trail.last(), Some(GeoPoint::new(3.0, 0.0)));
    }

    #[test]
    fn test_animation_clock_is_monotonic() {
        let start = Instant::now();
        let mut display = DisplayState::new(
            MarkerHandle::new(1),
            GeoPoint::new(0.0, 0.0),
            0.0,
            0.0,
            start + Duration::from_secs(2),
        );
        display.advance_clock(start);
        assert_eq!(display.animation_clock(), start + Duration::from_secs(2));
        display.advance_clock(start + Duration::from_secs(3));
        assert_eq!(display.animation_clock(), start + Duration::from_secs(3));
    }

    #[test]
    fn test_upsert_keeps_one_entity_per_id() {
        let mut store = StateStore::new();
        let now = Utc::now();
        store.upsert_authoritative("abc", StateRecord::new("abc"), now);
        let mut updated = StateRecord::new("abc");
        updated.callsign = Some("UAL1".to_string());
        store.upsert_authoritative("abc", updated, now);

        assert_eq!(store.len(), 1);
        let entity = store.get("abc").unwrap();
        assert_eq!(entity.authoritative.record.callsign.as_deref(), Some("UAL1"));
        assert!(!entity.has_marker());
    }

    #[test]
    fn test_take_absent() {
        let mut store = StateStore::new();
        let now = Utc::now();
        for id in ["a", "b", "c"] {
            store.upsert_authoritative(id, StateRecord::new(id), now);
        }
        let keep: HashSet<String> = ["b".to_string()].into_iter().collect();
        let mut removed: Vec<String> = store.take_absent(&keep).into_iter().map(|e| e.id).collect();
        removed.sort();
        assert_eq!(removed, vec!["a", "c"]);
        assert_eq!(store.ids(), vec!["b"]);
    }
}
