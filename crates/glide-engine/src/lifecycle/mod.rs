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

//! Entity lifecycle management.
//!
//! Creates and destroys the visual side of an entity. A marker, its animation
//! state and its trail are created and torn down together so the store never
//! holds a trail without a marker or a marker that belongs to nobody.

use std::collections::HashSet;
use std::time::Instant;

use log::{debug, warn};

use crate::geo::GeoPoint;
use crate::map::{MapError, MapSurface, MarkerIcon};
use crate::store::{DisplayState, StateStore, TrackedEntity, Trail, TrailState, TRAIL_CAPACITY};

/// Give `entity` a marker at `position`.
///
/// The animated state starts exactly at the authoritative position; a new
/// entity has no displayed motion to preserve.
pub fn spawn_marker<M: MapSurface + ?Sized>(
    map: &mut M,
    entity: &mut TrackedEntity,
    position: GeoPoint,
    popup: &str,
    with_trail: bool,
    now: Instant,
) -> Result<(), MapError> {
    let record = &entity.authoritative.record;
    let icon = MarkerIcon::for_category(record.category.as_deref());
    let bearing = record.bearing().unwrap_or(0.0);
    let speed = record.speed_mps();

    let marker = map.create_marker(position, &icon)?;
    if let Err(e) = map.set_marker_popup(marker, popup) {
        debug!("Could not bind popup for {}: {}", entity.id, e);
    }
    if let Err(e) = map.set_marker_heading(marker, bearing) {
        debug!("Could not rotate marker for {}: {}", entity.id, e);
    }

    let mut display = DisplayState::new(marker, position, bearing, speed, now);
    if with_trail {
        display.trail = start_trail(map, &entity.id, position);
    }
    entity.display = Some(display);
    Ok(())
}

/// Remove the marker and trail of `entity`, leaving its data in place.
pub fn destroy_visual<M: MapSurface + ?Sized>(map: &mut M, entity: &mut TrackedEntity) {
    let Some(display) = entity.display.take() else {
        return;
    };

    if let Some(trail) = display.trail {
        if let Err(e) = map.remove_trail(trail.handle) {
            debug!("Ignoring trail removal failure for {}: {}", entity.id, e);
        }
    }
    if let Err(e) = map.remove_marker(display.marker) {
        debug!("Ignoring marker removal failure for {}: {}", entity.id, e);
    }
}

/// Drop every entity not listed in `present`, along with its marker and trail.
///
/// Returns the number of entities removed.
pub fn purge_absent<M: MapSurface + ?Sized>(
    store: &mut StateStore,
    map: &mut M,
    present: &HashSet<String>,
) -> usize {
    let removed = store.take_absent(present);
    let count = removed.len();
    for mut entity in removed {
        destroy_visual(map, &mut entity);
    }
    if count > 0 {
        debug!("Purged {} entities absent from the latest batch", count);
    }
    count
}

/// Append an authoritative position to the entity's trail, if it has one.
pub fn extend_trail<M: MapSurface + ?Sized>(
    map: &mut M,
    entity: &mut TrackedEntity,
    position: GeoPoint,
) {
    let Some(trail) = entity.display.as_mut().and_then(|d| d.trail.as_mut()) else {
        return;
    };
    trail.history.push(position);
    if let Err(e) = map.append_trail_point(trail.handle, position, trail.history.capacity()) {
        warn!("Failed to extend trail for {}: {}", entity.id, e);
    }
}

/// Show or hide trails for every entity on the map.
///
/// Turning trails on starts a one-point trail at the currently displayed
/// position of each marker that lacks one. Turning them off removes them all.
pub fn set_trails_visible<M: MapSurface + ?Sized>(
    store: &mut StateStore,
    map: &mut M,
    visible: bool,
) {
    for entity in store.iter_mut() {
        let id = entity.id.clone();
        let Some(display) = entity.display.as_mut() else {
            continue;
        };

        if visible {
            if display.trail.is_none() {
                let shown = map
                    .marker_position(display.marker)
                    .unwrap_or(display.animated_position);
                display.trail = start_trail(map, &id, shown);
            }
        } else if let Some(trail) = display.trail.take() {
            if let Err(e) = map.remove_trail(trail.handle) {
                debug!("Ignoring trail removal failure for {}: {}", id, e);
            }
        }
    }
}

fn start_trail<M: MapSurface + ?Sized>(map: &mut M, id: &str, position: GeoPoint) -> Option<TrailState> {
    match map.create_trail(&[position]) {
        Ok(handle) => {
            let mut history = Trail::new(TRAIL_CAPACITY);
            history.push(position);
            Some(TrailState { handle, history })
        }
        Err(e) => {
            warn!("Failed to create trail for {}: {}", id, e);
            None
        }
    }
}
