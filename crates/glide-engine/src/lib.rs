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

//! Dead-reckoning engine for live aircraft maps.
//!
//! Position feeds refresh every few seconds; maps redraw many times a second.
//! This crate fills the gap by extrapolating every aircraft along its last
//! known track between updates, and by absorbing each new batch without a
//! visible jump. It is organised in layers that can be used on their own:
//!
//! - **Protocol layer**: batch decoding (record form and OpenSky state vectors)
//! - **Store and lifecycle**: per-aircraft authoritative and animated state,
//!   markers, bounded trails
//! - **Ingestion and animation**: the two passes that mutate the store
//! - **Sources and scheduler**: async fetching on a timer, frames on another
//!
//! # Quick Start
//!
//! Spawn a [`Scheduler`] over a data source and a map surface:
//!
//! ```no_run
//! use std::sync::Arc;
//! use glide_engine::{Command, LiveMap, MemoryMap, Scheduler, SchedulerConfig, SimulatedSource};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let live = LiveMap::new(MemoryMap::new(), Default::default());
//!     let scheduler = Scheduler::spawn(
//!         SchedulerConfig::default(),
//!         Arc::new(SimulatedSource::new()),
//!         live,
//!     );
//!
//!     let mut status = scheduler.subscribe();
//!     while status.changed().await.is_ok() {
//!         let s = status.borrow().clone();
//!         println!("{} active, {} visible", s.active, s.visible);
//!     }
//! }
//! ```
//!
//! # Driving the Engine Directly
//!
//! [`LiveMap`] has plain methods for every pass, so a host with its own event
//! loop can call them itself:
//!
//! ```
//! use std::time::{Duration, Instant};
//! use glide_engine::{Batch, LiveMap, MemoryMap, StateRecord};
//!
//! let mut live = LiveMap::new(MemoryMap::new(), Default::default());
//! let start = Instant::now();
//!
//! let batch = Batch::new(vec![
//!     StateRecord::new("A1").with_position(10.0, 20.0).with_motion(100.0, 90.0),
//! ]);
//! let report = live.ingest(&batch, start);
//! assert_eq!((report.active, report.visible), (1, 1));
//!
//! live.advance(start + Duration::from_millis(16));
//! let moved = live.store().get("A1").and_then(|e| e.displayed_position()).unwrap();
//! assert!(moved.lon > 20.0);
//! ```

pub mod animate;
pub mod geo;
pub mod ingest;
pub mod lifecycle;
pub mod map;
pub mod protocol;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod units;

use std::time::Instant;

use log::{debug, info};
use serde::Serialize;

pub use animate::FrameCounter;
pub use geo::GeoPoint;
pub use ingest::{DisplayFilter, DisplaySettings, IngestMode, IngestReport};
pub use map::{MapError, MapSurface, MarkerHandle, MarkerIcon, MemoryMap, TrailHandle};
pub use protocol::{Batch, OpenSkyParser, ParseError, Protocol, RecordBatchParser, StateRecord};
pub use scheduler::{
    Command, Scheduler, SchedulerConfig, SchedulerError, SchedulerStatus, MAX_PERIOD, MIN_PERIOD,
};
pub use source::{
    DataSource, FetchError, OpenSkySource, ReplaySource, SimulatedSource, OPENSKY_STATES_URL,
};
pub use store::{StateStore, TrackedEntity};
pub use units::{AltitudeUnit, SpeedUnit, UnitPreferences};

/// Serializable view of one marker, as currently displayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerSnapshot {
    pub id: String,
    pub callsign: Option<String>,
    pub category: Option<String>,
    pub position: GeoPoint,
    pub bearing: f64,
    pub speed_mps: f64,
    pub trail_points: usize,
}

/// A store, a map surface and the display settings that tie them together.
///
/// Every method is synchronous and runs to completion; whoever owns the
/// `LiveMap` decides when ingestion and frames happen.
#[derive(Debug)]
pub struct LiveMap<M> {
    store: StateStore,
    map: M,
    settings: DisplaySettings,
    frames: FrameCounter,
    last_report: Option<IngestReport>,
    selected: Option<String>,
}

impl<M: MapSurface> LiveMap<M> {
    #[must_use]
    pub fn new(map: M, settings: DisplaySettings) -> Self {
        Self {
            store: StateStore::new(),
            map,
            settings,
            frames: FrameCounter::default(),
            last_report: None,
            selected: None,
        }
    }

    /// Merge a freshly fetched batch.
    pub fn ingest(&mut self, batch: &Batch, now: Instant) -> IngestReport {
        let report = ingest::ingest_batch(
            &mut self.store,
            &mut self.map,
            &batch.states,
            &self.settings,
            IngestMode::Fresh,
            now,
        );
        if let Some(id) = &self.selected {
            if !self.store.contains(id) {
                debug!("Selected aircraft {} left the feed", id);
                self.selected = None;
            }
        }
        self.last_report = Some(report.clone());
        report
    }

    /// Re-run the held records so display text picks up new settings.
    pub fn reprocess(&mut self, now: Instant) -> IngestReport {
        let records = self.store.records();
        ingest::ingest_batch(
            &mut self.store,
            &mut self.map,
            &records,
            &self.settings,
            IngestMode::Reprocess,
            now,
        )
    }

    /// Run one frame. Returns a new frames-per-second reading when one is due.
    pub fn advance(&mut self, now: Instant) -> Option<f64> {
        let fps = self.frames.tick(now);
        if self.settings.animation_enabled {
            animate::advance_frame(&mut self.store, &mut self.map, now);
        }
        fps
    }

    /// Select an aircraft and render its detail text with the current units.
    pub fn select(&mut self, id: &str) -> Option<String> {
        let entity = self.store.get(id.trim())?;
        let text = self
            .settings
            .units
            .detail_text(&entity.id, &entity.authoritative.record);
        self.selected = Some(entity.id.clone());
        Some(text)
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Change the display filter. Takes effect on the next ingested batch.
    pub fn set_filter(&mut self, filter: DisplayFilter) {
        info!("Display filter set to {}", filter);
        self.settings.filter = filter;
    }

    /// Change unit preferences and refresh all display text.
    pub fn set_units(&mut self, units: UnitPreferences, now: Instant) -> IngestReport {
        self.settings.units = units;
        self.reprocess(now)
    }

    pub fn set_trails_visible(&mut self, visible: bool) {
        if self.settings.trails_visible != visible {
            self.settings.trails_visible = visible;
            lifecycle::set_trails_visible(&mut self.store, &mut self.map, visible);
        }
    }

    pub fn set_animation_enabled(&mut self, enabled: bool) {
        self.settings.animation_enabled = enabled;
    }

    /// Filter back to everything and drop the selection.
    pub fn reset_view(&mut self) {
        self.set_filter(DisplayFilter::All);
        self.clear_selection();
    }

    #[must_use]
    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    #[must_use]
    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    /// Report of the last fetched batch.
    #[must_use]
    pub fn last_report(&self) -> Option<&IngestReport> {
        self.last_report.as_ref()
    }

    #[must_use]
    pub fn fps(&self) -> Option<f64> {
        self.frames.fps()
    }

    /// Every marker on the map, sorted by identifier.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MarkerSnapshot> {
        let mut markers: Vec<MarkerSnapshot> = self
            .store
            .iter()
            .filter_map(|entity| {
                let display = entity.display.as_ref()?;
                let record = &entity.authoritative.record;
                Some(MarkerSnapshot {
                    id: entity.id.clone(),
                    callsign: record.callsign.clone(),
                    category: record.category.clone(),
                    position: self
                        .map
                        .marker_position(display.marker)
                        .unwrap_or(display.animated_position),
                    bearing: display.animated_bearing,
                    speed_mps: display.speed_mps,
                    trail_points: display.trail.as_ref().map_or(0, |t| t.history.len()),
                })
            })
            .collect();
        markers.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        markers
    }
}
