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

//! Simulated fleet.
//!
//! Aircraft persist between fetches and fly along their track for the time
//! that passed since the previous fetch, with a little speed and heading
//! jitter. A few retire on every fetch and new ones take their place, so the
//! map exercises creation and purging continuously.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{DataSource, FetchError};
use crate::geo::{normalize_bearing, GeoPoint};
use crate::protocol::{Batch, StateRecord};

const CATEGORIES: [&str; 5] = ["commercial", "private", "cargo", "military", "general"];
const COUNTRIES: [&str; 6] = ["USA", "GER", "FRA", "UK", "JPN", "AUS"];

/// Fleet size is `BASE_FLEET` plus up to `FLEET_JITTER` extra, capped by the limit.
const BASE_FLEET: usize = 100;
const FLEET_JITTER: usize = 50;

/// Chance that an aircraft leaves the fleet on a given fetch.
const RETIRE_PROBABILITY: f64 = 0.05;

/// Aircraft turn around before reaching the poles.
const MAX_ABS_LATITUDE: f64 = 60.0;

struct Fleet {
    rng: StdRng,
    aircraft: BTreeMap<String, StateRecord>,
    last_step: Option<Instant>,
}

impl Fleet {
    fn step(&mut self, limit: usize, now: Instant) -> Batch {
        let elapsed = self
            .last_step
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f64());
        self.last_step = Some(now);
        let stamp = Utc::now().timestamp_millis();

        let rng = &mut self.rng;
        self.aircraft.retain(|_, _| !rng.gen_bool(RETIRE_PROBABILITY));
        for record in self.aircraft.values_mut() {
            fly(&mut self.rng, record, elapsed);
            record.last_update = Some(stamp);
        }

        let target = limit.min(BASE_FLEET + self.rng.gen_range(0..FLEET_JITTER));
        if self.aircraft.len() > target {
            let mut ids: Vec<String> = self.aircraft.keys().cloned().collect();
            ids.shuffle(&mut self.rng);
            for id in ids.into_iter().take(self.aircraft.len() - target) {
                self.aircraft.remove(&id);
            }
        }
        while self.aircraft.len() < target {
            let record = spawn(&mut self.rng, stamp);
            if let Some(id) = record.icao24.clone() {
                self.aircraft.entry(id).or_insert(record);
            }
        }

        Batch::new(self.aircraft.values().cloned().collect())
    }
}

fn spawn(rng: &mut StdRng, stamp: i64) -> StateRecord {
    let mut record = StateRecord::new(format!("{:06x}", rng.gen_range(0..0x00FF_FFFF_u32)))
        .with_position(
            rng.gen_range(-MAX_ABS_LATITUDE..MAX_ABS_LATITUDE),
            rng.gen_range(-180.0..180.0),
        )
        .with_motion(rng.gen_range(100.0..300.0), rng.gen_range(0.0..360.0));
    record.callsign = Some(format!("FLT{}", rng.gen_range(1000..10000)));
    record.origin_country = COUNTRIES.choose(rng).map(|c| (*c).to_string());
    record.category = CATEGORIES.choose(rng).map(|c| (*c).to_string());
    record.baro_altitude = Some(rng.gen_range(0.0..12_000.0));
    record.vertical_rate = Some(rng.gen_range(-20.0..20.0));
    record.on_ground = Some(false);
    record.position_source = Some(rng.gen_range(0..5));
    record.last_update = Some(stamp);
    record
}

fn fly(rng: &mut StdRng, record: &mut StateRecord, elapsed_secs: f64) {
    let speed = (record.velocity.unwrap_or(200.0) + rng.gen_range(-10.0..10.0)).max(1.0);
    let mut track = normalize_bearing(
        record.true_track.unwrap_or_else(|| rng.gen_range(0.0..360.0)) + rng.gen_range(-1.0..1.0),
    );

    let Some(position) = record.position() else {
        record.velocity = Some(speed);
        record.true_track = Some(track);
        return;
    };

    let mut next = position.offset(speed * elapsed_secs, track);
    if next.lat.abs() > MAX_ABS_LATITUDE {
        // Turn back toward the equator
        track = normalize_bearing(180.0 - track);
        next = GeoPoint::new(position.lat, next.lon);
    }
    next.lon = (next.lon + 180.0).rem_euclid(360.0) - 180.0;

    record.latitude = Some(next.lat);
    record.longitude = Some(next.lon);
    record.velocity = Some(speed);
    record.true_track = Some(track);
}

/// A random fleet of aircraft that keeps flying between fetches.
pub struct SimulatedSource {
    fleet: Mutex<Fleet>,
}

impl SimulatedSource {
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// A fleet whose randomness is reproducible.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            fleet: Mutex::new(Fleet {
                rng,
                aircraft: BTreeMap::new(),
                last_step: None,
            }),
        }
    }

    fn next_batch(&self, limit: usize) -> Batch {
        let mut fleet = match self.fleet.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let batch = fleet.step(limit, Instant::now());
        debug!("Simulated fleet now has {} aircraft", batch.len());
        batch
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimulatedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl DataSource for SimulatedSource {
    async fn fetch(&self, limit: usize) -> Result<Batch, FetchError> {
        Ok(self.next_batch(limit))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
