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

//! Dead-reckoning animation.
//!
//! Every rendering frame moves each marker along its bearing at its last
//! known speed for the real time elapsed since that marker's previous frame.
//! A long stall (a hidden window, a blocked loop) is capped at
//! [`MAX_STEP_SECS`] so markers never leap across the map.

use std::time::{Duration, Instant};

use log::debug;

use crate::geo::{offset_degrees, GeoPoint};
use crate::map::MapSurface;
use crate::store::StateStore;

/// Longest time step a single frame may apply, in seconds.
pub const MAX_STEP_SECS: f64 = 0.5;

/// Position after travelling `speed_mps` along `bearing_deg` for `dt_secs`.
#[must_use]
pub fn extrapolate(position: GeoPoint, speed_mps: f64, bearing_deg: f64, dt_secs: f64) -> GeoPoint {
    let (d_lat, d_lon) = offset_degrees(position.lat, speed_mps * dt_secs, bearing_deg);
    GeoPoint::new(position.lat + d_lat, position.lon + d_lon)
}

/// Advance every marker in `store` to `now`.
///
/// Returns the number of entities that moved.
pub fn advance_frame<M: MapSurface + ?Sized>(store: &mut StateStore, map: &mut M, now: Instant) -> usize {
    let mut moved = 0;

    for entity in store.iter_mut() {
        let Some(display) = entity.display.as_mut() else {
            continue;
        };

        let elapsed = now.saturating_duration_since(display.animation_clock());
        if elapsed.is_zero() {
            continue;
        }
        let dt = elapsed.as_secs_f64().min(MAX_STEP_SECS);

        display.animated_position = extrapolate(
            display.animated_position,
            display.speed_mps,
            display.animated_bearing,
            dt,
        );
        display.advance_clock(now);
        moved += 1;

        if let Err(e) = map.set_marker_position(display.marker, display.animated_position) {
            debug!("Skipping marker for {}: {}", entity.id, e);
            continue;
        }
        if let Err(e) = map.set_marker_heading(display.marker, display.animated_bearing) {
            debug!("Could not rotate marker for {}: {}", entity.id, e);
        }
    }

    moved
}

/// Counts driver ticks and reports frames per second about once a second.
///
/// The first tick opens the measurement window.
#[derive(Debug, Clone, Default)]
pub struct FrameCounter {
    frames: u32,
    window_start: Option<Instant>,
    fps: Option<f64>,
}

impl FrameCounter {
    const WINDOW: Duration = Duration::from_secs(1);

    /// Record one tick. Returns a fresh reading when a window closes.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed < Self::WINDOW {
            return None;
        }

        let fps = f64::from(self.frames) / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = Some(now);
        self.fps = Some(fps);
        Some(fps)
    }

    /// Last published reading.
    #[must_use]
    pub fn fps(&self) -> Option<f64> {
        self.fps
    }
}
