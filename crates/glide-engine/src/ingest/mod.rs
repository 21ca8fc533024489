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

//! Batch ingestion.
//!
//! Merges a batch of records into the [`StateStore`]:
//!
//! 1. The authoritative record is always stored, filter or not.
//! 2. Records failing the display filter stop there.
//! 3. Records without a usable position count as active but not visible.
//! 4. Otherwise the marker is updated in place (rebasing the animation onto
//!    what is currently drawn) or created.
//!
//! Afterwards every entity missing from the batch is purged. A record that
//! cannot be processed is skipped on its own; nothing aborts the batch.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::lifecycle;
use crate::map::MapSurface;
use crate::protocol::StateRecord;
use crate::store::{StateStore, TrackedEntity};
use crate::units::UnitPreferences;

/// Which records get markers and count as active.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum DisplayFilter {
    #[default]
    All,
    /// Only records from this sensor tag; tag `0` accepts any sensor.
    Sensor(u8),
    /// Case-insensitive substring of the identifier; empty accepts all.
    Identifier(String),
}

impl DisplayFilter {
    #[must_use]
    pub fn matches(&self, id: &str, record: &StateRecord) -> bool {
        match self {
            Self::All | Self::Sensor(0) => true,
            Self::Sensor(tag) => record.position_source == Some(*tag),
            Self::Identifier(needle) => {
                let needle = needle.trim();
                needle.is_empty() || id.to_lowercase().contains(&needle.to_lowercase())
            }
        }
    }
}

impl std::fmt::Display for DisplayFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Sensor(tag) => write!(f, "sensor {tag}"),
            Self::Identifier(needle) => write!(f, "id '{needle}'"),
        }
    }
}

/// User-facing knobs that shape ingestion and animation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub filter: DisplayFilter,
    pub units: UnitPreferences,
    pub trails_visible: bool,
    pub animation_enabled: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            filter: DisplayFilter::All,
            units: UnitPreferences::default(),
            trails_visible: false,
            animation_enabled: true,
        }
    }
}

/// How a batch is being ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// A newly fetched batch.
    Fresh,
    /// Held data re-run after a display preference change. Only text changes.
    Reprocess,
}

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records that passed the filter.
    pub active: usize,
    /// Active records with a usable position.
    pub visible: usize,
    /// Records dropped for lack of an identifier.
    pub dropped: usize,
    /// Markers created during the pass.
    pub created: usize,
    /// Entities purged because they were missing from the batch.
    pub purged: usize,
    /// Entities held after the pass.
    pub tracked: usize,
    pub completed_at: DateTime<Utc>,
}

impl Default for IngestReport {
    fn default() -> Self {
        Self {
            active: 0,
            visible: 0,
            dropped: 0,
            created: 0,
            purged: 0,
            tracked: 0,
            completed_at: Utc::now(),
        }
    }
}

/// Merge `records` into `store`, driving marker changes on `map`.
pub fn ingest_batch<M: MapSurface + ?Sized>(
    store: &mut StateStore,
    map: &mut M,
    records: &[StateRecord],
    settings: &DisplaySettings,
    mode: IngestMode,
    now: Instant,
) -> IngestReport {
    let received_at = Utc::now();
    let mut report = IngestReport::default();
    let mut present = HashSet::with_capacity(records.len());

    for record in records {
        let Some(id) = record.id() else {
            report.dropped += 1;
            continue;
        };
        present.insert(id.to_string());

        // Reprocessing re-runs the held record; keep its receipt time
        if mode == IngestMode::Fresh || !store.contains(id) {
            store.upsert_authoritative(id, record.clone(), received_at);
        }
        let Some(entity) = store.get_mut(id) else {
            continue;
        };

        if !settings.filter.matches(id, record) {
            // Filtered out: keep the data, take it off the map
            lifecycle::destroy_visual(map, entity);
            continue;
        }
        report.active += 1;

        let Some(position) = record.position() else {
            continue;
        };
        report.visible += 1;

        let popup = settings.units.popup_text(id, record);
        if entity.has_marker() {
            update_marker(map, entity, position, &popup, settings.trails_visible, mode, now);
        } else {
            match lifecycle::spawn_marker(map, entity, position, &popup, settings.trails_visible, now) {
                Ok(()) => report.created += 1,
                Err(e) => warn!("Failed to create marker for {}: {}", id, e),
            }
        }
    }

    report.purged = lifecycle::purge_absent(store, map, &present);
    report.tracked = store.len();
    report.completed_at = Utc::now();

    debug!(
        "Ingested {} records: {} active, {} visible, {} new, {} purged, {} dropped",
        records.len(),
        report.active,
        report.visible,
        report.created,
        report.purged,
        report.dropped
    );

    report
}

/// Refresh an existing marker from the latest record without moving it.
fn update_marker<M: MapSurface + ?Sized>(
    map: &mut M,
    entity: &mut TrackedEntity,
    position: GeoPoint,
    popup: &str,
    trails_visible: bool,
    mode: IngestMode,
    now: Instant,
) {
    let speed = entity.authoritative.record.speed_mps();
    let bearing = entity.authoritative.record.bearing();
    let Some(display) = entity.display.as_mut() else {
        return;
    };

    display.speed_mps = speed;
    if let Some(bearing) = bearing {
        display.animated_bearing = bearing;
    }

    if mode == IngestMode::Fresh {
        // Rebase onto whatever is drawn right now, never onto the new fix
        match map.marker_position(display.marker) {
            Ok(shown) => display.animated_position = shown,
            Err(e) => debug!("Keeping animated position for {}: {}", entity.id, e),
        }
        display.advance_clock(now);
    }

    if let Err(e) = map.set_marker_popup(display.marker, popup) {
        debug!("Could not update popup for {}: {}", entity.id, e);
    }

    if mode == IngestMode::Fresh && trails_visible {
        lifecycle::extend_trail(map, entity, position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MemoryMap;
    use crate::units::AltitudeUnit;
    use std::time::Duration;

    fn aircraft(id: &str, lat: f64, lon: f64) -> StateRecord {
        StateRecord::new(id).with_position(lat, lon).with_motion(100.0, 90.0)
    }

    fn ingest(
        store: &mut StateStore,
        map: &mut MemoryMap,
        records: &[StateRecord],
        settings: &DisplaySettings,
        now: Instant,
    ) -> IngestReport {
        ingest_batch(store, map, records, settings, IngestMode::Fresh, now)
    }

    #[test]
    fn test_new_entity_creates_marker_at_fix() {
        let mut store = StateStore::new();
        let mut map = MemoryMap::new();
        let report = ingest(
            &mut store,
            &mut map,
            &[aircraft("A1", 10.0, 20.0)],
            &DisplaySettings::default(),
            Instant::now(),
        );

        assert_eq!((report.active, report.visible, report.created), (1, 1, 1));
        let display = store.get("A1").unwrap().display.as_ref().unwrap();
        assert_eq!(display.animated_position, GeoPoint::new(10.0, 20.0));
        assert_eq!(map.marker_position(display.marker), Ok(GeoPoint::new(10.0, 20.0)));
    }

    #[test]
    fn test_existing_entity_rebases_to_displayed_position() {
        let mut store = StateStore::new();
        let mut map = MemoryMap::new();
        let settings = DisplaySettings::default();
        let start = Instant::now();
        ingest(&mut store, &mut map, &[aircraft("A1", 10.0, 20.0)], &settings, start);

        // Something moved the marker between batches
        let marker = store.get("A1").unwrap().display.as_ref().unwrap().marker;
        let shown = GeoPoint::new(10.001, 20.004);
        map.set_marker_position(marker, shown).unwrap();

        let mut next = aircraft("A1", 10.5, 21.0);
        next.true_track = Some(180.0);
        next.velocity = Some(150.0);
        let later = start + Duration::from_secs(3);
        ingest(&mut store, &mut map, &[next], &settings, later);

        let display = store.get("A1").unwrap().display.as_ref().unwrap();
        assert_eq!(display.animated_position, shown);
        assert_eq!(map.marker_position(marker), Ok(shown));
        assert!((display.animated_bearing - 180.0).abs() < f64::EPSILON);
        assert!((display.speed_mps - 150.0).abs() < f64::EPSILON);
        assert_eq!(display.animation_clock(), later);
        assert!(
            (store.get("A1").unwrap().authoritative.record.latitude.unwrap() - 10.5).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn test_missing_bearing_keeps_previous() {
        let mut store = StateStore::new();
        let mut map = MemoryMap::new();
        let settings = DisplaySettings::default();
        let now = Instant::now();
        ingest(&mut store, &mut map, &[aircraft("A1", 10.0, 20.0)], &settings, now);

        let mut next = StateRecord::new("A1").with_position(10.0, 20.1);
        next.velocity = None;
        ingest(&mut store, &mut map, &[next], &settings, now);

        let display = store.get("A1").unwrap().display.as_ref().unwrap();
        assert!((display.animated_bearing - 90.0).abs() < f64::EPSILON);
        assert!(display.speed_mps.abs() < f64::EPSILON);
    }

    #[test]
    fn test_absent_entities_are_purged() {
        let mut store = StateStore::new();
        let mut map = MemoryMap::new();
        let settings = DisplaySettings {
            trails_visible: true,
            ..Default::default()
        };
        let now = Instant::now();
        ingest(
            &mut store,
            &mut map,
            &[aircraft("A1", 10.0, 20.0), aircraft("B2", 11.0, 21.0)],
            &settings,
            now,
        );
        assert_eq!((map.marker_count(), map.trail_count()), (2, 2));

        let report = ingest(&mut store, &mut map, &[aircraft("B2", 11.0, 21.1)], &settings, now);
        assert_eq!(report.purged, 1);
        assert!(!store.contains("A1"));
        assert_eq!((map.marker_count(), map.trail_count()), (1, 1));

        let report = ingest(&mut store, &mut map, &[], &settings, now);
        assert_eq!((report.active, report.visible, report.tracked), (0, 0, 0));
        assert_eq!((map.marker_count(), map.trail_count()), (0, 0));
    }

    #[test]
    fn test_filter_keeps_data_but_skips_marker() {
        let mut store = StateStore::new();
        let mut map = MemoryMap::new();
        let mut from_sensor_2 = aircraft("abc123", 10.0, 20.0);
        from_sensor_2.position_source = Some(2);
        let mut from_sensor_1 = aircraft("def456", 11.0, 21.0);
        from_sensor_1.position_source = Some(1);

        let settings = DisplaySettings {
            filter: DisplayFilter::Sensor(2),
            ..Default::default()
        };
        let report = ingest(
            &mut store,
            &mut map,
            &[from_sensor_2, from_sensor_1],
            &settings,
            Instant::now(),
        );

        assert_eq!((report.active, report.visible), (1, 1));
        assert_eq!(store.len(), 2);
        assert!(store.get("abc123").unwrap().has_marker());
        assert!(!store.get("def456").unwrap().has_marker());
        assert_eq!(map.marker_count(), 1);
    }

    #[test]
    fn test_narrowing_filter_removes_existing_marker() {
        let mut store = StateStore::new();
        let mut map = MemoryMap::new();
        let batch = [aircraft("abc123", 10.0, 20.0), aircraft("def456", 11.0, 21.0)];
        let now = Instant::now();
        ingest(&mut store, &mut map, &batch, &DisplaySettings::default(), now);
        assert_eq!(map.marker_count(), 2);

        let narrowed = DisplaySettings {
            filter: DisplayFilter::Identifier("DEF".to_string()),
            ..Default::default()
        };
        let report = ingest(&mut store, &mut map, &batch, &narrowed, now);

        assert_eq!((report.active, report.visible), (1, 1));
        assert_eq!(map.marker_count(), 1);
        assert_eq!(store.len(), 2);
        assert!(!store.get("abc123").unwrap().has_marker());
    }

    #[test]
    fn test_identifier_filter_is_case_insensitive() {
        let record = aircraft("abc123", 0.0, 0.0);
        assert!(DisplayFilter::Identifier("ABC".to_string()).matches("abc123", &record));
        assert!(DisplayFilter::Identifier(String::new()).matches("abc123", &record));
        assert!(!DisplayFilter::Identifier("xyz".to_string()).matches("abc123", &record));
        assert!(DisplayFilter::Sensor(0).matches("abc123", &record));
        assert!(!DisplayFilter::Sensor(3).matches("abc123", &record));
    }

    #[test]
    fn test_record_without_position_is_active_not_visible() {
        let mut store = StateStore::new();
        let mut map = MemoryMap::new();
        let report = ingest(
            &mut store,
            &mut map,
            &[StateRecord::new("nopos"), aircraft("A1", 10.0, 20.0)],
            &DisplaySettings::default(),
            Instant::now(),
        );

        assert_eq!((report.active, report.visible), (2, 1));
        assert!(store.contains("nopos"));
        assert!(!store.get("nopos").unwrap().has_marker());
    }

    #[test]
    fn test_record_without_id_is_dropped() {
        let mut store = StateStore::new();
        let mut map = MemoryMap::new();
        let mut anonymous = aircraft("", 10.0, 20.0);
        anonymous.icao24 = None;
        let report = ingest(
            &mut store,
            &mut map,
            &[anonymous, aircraft("A1", 10.0, 20.0)],
            &DisplaySettings::default(),
            Instant::now(),
        );

        assert_eq!(report.dropped, 1);
        assert_eq!((report.active, report.visible), (1, 1));
        assert_eq!(store.ids(), vec!["A1"]);
    }

    #[test]
    fn test_trail_appends_authoritative_fixes() {
        let mut store = StateStore::new();
        let mut map = MemoryMap::new();
        let settings = DisplaySettings {
            trails_visible: true,
            ..Default::default()
        };
        let now = Instant::now();
        for i in 0..55 {
            let lon = 20.0 + f64::from(i) * 0.01;
            ingest(&mut store, &mut map, &[aircraft("A1", 10.0, lon)], &settings, now);
        }

        let trail = store.get("A1").unwrap().display.as_ref().unwrap().trail.clone().unwrap();
        assert_eq!(trail.history.len(), 50);
        let expected: Vec<GeoPoint> = (5..55)
            .map(|i| GeoPoint::new(10.0, 20.0 + f64::from(i) * 0.01))
            .collect();
        assert_eq!(trail.history.to_vec(), expected);
        assert_eq!(map.trail(trail.handle).unwrap(), expected);
    }

    #[test]
    fn test_reprocess_only_changes_text() {
        let mut store = StateStore::new();
        let mut map = MemoryMap::new();
        let mut settings = DisplaySettings {
            trails_visible: true,
            ..Default::default()
        };
        let start = Instant::now();
        let mut record = aircraft("A1", 10.0, 20.0);
        record.baro_altitude = Some(1000.0);
        let first = ingest(&mut store, &mut map, &[record], &settings, start);

        let marker = store.get("A1").unwrap().display.as_ref().unwrap().marker;
        let shown = GeoPoint::new(10.0, 20.002);
        map.set_marker_position(marker, shown).unwrap();
        store.get_mut("A1").unwrap().display.as_mut().unwrap().animated_position = shown;
        let received_at = store.get("A1").unwrap().authoritative.received_at;

        settings.units.altitude = AltitudeUnit::Feet;
        let held = store.records();
        let second = ingest_batch(
            &mut store,
            &mut map,
            &held,
            &settings,
            IngestMode::Reprocess,
            start + Duration::from_secs(5),
        );

        assert_eq!((first.active, first.visible), (second.active, second.visible));
        assert_eq!(second.created, 0);
        let entity = store.get("A1").unwrap();
        let display = entity.display.as_ref().unwrap();
        assert_eq!(display.animated_position, shown);
        assert_eq!(display.animation_clock(), start);
        assert_eq!(display.trail.as_ref().unwrap().history.len(), 1);
        assert_eq!(entity.authoritative.received_at, received_at);
        let popup = map.marker(marker).unwrap().popup.clone().unwrap();
        assert!(popup.contains("Altitude: 3281 ft"));
    }
}
