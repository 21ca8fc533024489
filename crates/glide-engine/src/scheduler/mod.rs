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

//! Ingestion and frame scheduling.
//!
//! One background task owns the [`LiveMap`]. The ingestion timer, the frame
//! timer, fetch completions and control commands are arms of a single
//! `select!`, so every pass runs to completion before the next one starts
//! and the store needs no lock. Fetches run in their own tasks and report
//! back over a channel; a slow feed never stalls frames.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ingest::DisplayFilter;
use crate::map::MapSurface;
use crate::protocol::Batch;
use crate::source::{DataSource, FetchError};
use crate::units::UnitPreferences;
use crate::{LiveMap, MarkerSnapshot};

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between fetches.
    pub period: Duration,
    /// Time between animation frames.
    pub frame_interval: Duration,
    /// Batches are cut to this many records before ingestion.
    pub max_entities: usize,
    /// Drop a fetch result that resolves after a newer one was applied.
    pub discard_stale_batches: bool,
    /// Channel buffer size for commands.
    pub command_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(3),
            frame_interval: Duration::from_millis(16),
            max_entities: 100,
            discard_stale_batches: false,
            command_buffer: 64,
        }
    }
}

/// Control messages accepted by a running scheduler.
#[derive(Debug)]
pub enum Command {
    /// Restart the ingestion timer with a new period.
    SetPeriod(Duration),
    /// Pause or resume both fetching and animation.
    SetAnimationEnabled(bool),
    /// Change the display filter and fetch again.
    SetFilter(DisplayFilter),
    /// Change units and refresh display text from held data.
    SetUnits(UnitPreferences),
    SetTrailsVisible(bool),
    SetMaxEntities(usize),
    /// Fetch now.
    Refresh,
    /// Back to the unfiltered view, then fetch.
    ResetView,
    Select {
        id: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<MarkerSnapshot>>,
    },
    Shutdown,
}

/// Published after every change worth showing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub source: String,
    /// Records that passed the filter in the last batch.
    pub active: usize,
    /// Active records with a usable position.
    pub visible: usize,
    /// Entities held, filtered or not.
    pub tracked: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub fps: Option<f64>,
    /// A fetch is in flight.
    pub loading: bool,
    pub last_error: Option<String>,
    pub period_secs: f64,
    pub max_entities: usize,
    pub paused: bool,
}

/// Errors returned by the scheduler handle.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler has stopped")]
    Stopped,
}

/// Handle to a running scheduler.
///
/// Dropping the handle stops the background task.
pub struct Scheduler {
    command_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<SchedulerStatus>,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Start scheduling fetches from `source` into `live`.
    ///
    /// The first fetch happens immediately.
    #[must_use]
    pub fn spawn<M>(config: SchedulerConfig, source: Arc<dyn DataSource>, live: LiveMap<M>) -> Self
    where
        M: MapSurface + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(placeholder_status());
        let cancel_token = CancellationToken::new();

        let worker = Worker {
            live,
            source,
            period: clamp_period(config.period),
            max_entities: config.max_entities.max(1),
            discard_stale_batches: config.discard_stale_batches,
            fetch_tx,
            next_seq: 0,
            newest_applied: None,
            in_flight: 0,
            last_error: None,
            status_tx,
        };
        worker.publish();

        info!(
            "Scheduling fetches from {} every {:?}",
            worker.source.name(),
            worker.period
        );

        let task_cancel = cancel_token.clone();
        let frame_interval = config
            .frame_interval
            .clamp(Duration::from_millis(1), MAX_FRAME_INTERVAL);
        let task = tokio::spawn(async move {
            run(worker, command_rx, fetch_rx, task_cancel, frame_interval).await;
        });

        Self {
            command_tx,
            status_rx,
            cancel_token,
            task: Some(task),
        }
    }

    /// Send a command to the scheduler.
    pub async fn send(&self, command: Command) -> Result<(), SchedulerError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_closed| SchedulerError::Stopped)
    }

    /// A sender other tasks can use to issue commands.
    #[must_use]
    pub fn commands(&self) -> mpsc::Sender<Command> {
        self.command_tx.clone()
    }

    /// Render detail text for an aircraft.
    pub async fn select(&self, id: impl Into<String>) -> Result<Option<String>, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Select {
            id: id.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_dropped| SchedulerError::Stopped)
    }

    /// Current marker positions.
    pub async fn snapshot(&self) -> Result<Vec<MarkerSnapshot>, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_dropped| SchedulerError::Stopped)
    }

    /// Subscribe to status updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status_rx.clone()
    }

    /// The most recently published status.
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        self.status_rx.borrow().clone()
    }

    /// Ask the scheduler to stop.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Wait for the background task to finish.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Shortest accepted ingestion period.
pub const MIN_PERIOD: Duration = Duration::from_millis(100);

/// Longest accepted ingestion period.
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

const MAX_FRAME_INTERVAL: Duration = Duration::from_secs(1);

fn clamp_period(period: Duration) -> Duration {
    period.clamp(MIN_PERIOD, MAX_PERIOD)
}

struct FetchOutcome {
    seq: u64,
    result: Result<Batch, FetchError>,
}

struct Worker<M> {
    live: LiveMap<M>,
    source: Arc<dyn DataSource>,
    period: Duration,
    max_entities: usize,
    discard_stale_batches: bool,
    fetch_tx: mpsc::UnboundedSender<FetchOutcome>,
    next_seq: u64,
    newest_applied: Option<u64>,
    in_flight: usize,
    last_error: Option<String>,
    status_tx: watch::Sender<SchedulerStatus>,
}

impl<M: MapSurface> Worker<M> {
    fn paused(&self) -> bool {
        !self.live.settings().animation_enabled
    }

    fn start_fetch(&mut self) {
        if self.paused() {
            debug!("Paused, not fetching");
            return;
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        let source = Arc::clone(&self.source);
        let tx = self.fetch_tx.clone();
        let limit = self.max_entities;
        self.in_flight += 1;
        self.publish();

        tokio::spawn(async move {
            let result = source.fetch(limit).await;
            let _ = tx.send(FetchOutcome { seq, result });
        });
    }

    fn apply(&mut self, outcome: FetchOutcome) {
        self.in_flight = self.in_flight.saturating_sub(1);

        match outcome.result {
            Ok(mut batch) => {
                let stale = self.newest_applied.is_some_and(|newest| outcome.seq < newest);
                if stale && self.discard_stale_batches {
                    info!(
                        "Discarding batch #{} that resolved after batch #{}",
                        outcome.seq,
                        self.newest_applied.unwrap_or_default()
                    );
                } else {
                    batch.truncate(self.max_entities);
                    self.live.ingest(&batch, Instant::now().into_std());
                    self.newest_applied = self.newest_applied.max(Some(outcome.seq));
                    self.last_error = None;
                }
            }
            Err(e) => {
                warn!("Fetch from {} failed: {}", self.source.name(), e);
                self.last_error = Some(e.to_string());
            }
        }

        self.publish();
    }

    fn frame(&mut self, now: Instant) {
        if self.live.advance(now.into_std()).is_some() {
            self.publish();
        }
    }

    fn handle(&mut self, command: Command, timer: &mut Option<Interval>) {
        match command {
            Command::SetPeriod(period) => {
                self.period = clamp_period(period);
                info!("Fetch period set to {:?}", self.period);
                if timer.is_some() {
                    *timer = Some(delayed_timer(self.period));
                }
            }
            Command::SetAnimationEnabled(enabled) => {
                if enabled == !self.paused() {
                    return;
                }
                self.live.set_animation_enabled(enabled);
                if enabled {
                    info!("Resumed");
                    *timer = Some(immediate_timer(self.period));
                } else {
                    info!("Paused");
                    *timer = None;
                }
            }
            Command::SetFilter(filter) => {
                self.live.set_filter(filter);
                self.start_fetch();
            }
            Command::SetUnits(units) => {
                self.live.set_units(units, Instant::now().into_std());
            }
            Command::SetTrailsVisible(visible) => self.live.set_trails_visible(visible),
            Command::SetMaxEntities(max) => {
                self.max_entities = max.max(1);
                info!("Max entities set to {}", self.max_entities);
            }
            Command::Refresh => self.start_fetch(),
            Command::ResetView => {
                self.live.reset_view();
                self.start_fetch();
            }
            Command::Select { id, reply } => {
                let _ = reply.send(self.live.select(&id));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.live.snapshot());
            }
            // Handled by the loop
            Command::Shutdown => {}
        }
        self.publish();
    }

    fn publish(&self) {
        let report = self.live.last_report();
        self.status_tx.send_replace(SchedulerStatus {
            source: self.source.name().to_string(),
            active: report.map_or(0, |r| r.active),
            visible: report.map_or(0, |r| r.visible),
            tracked: self.live.store().len(),
            last_update: report.map(|r| r.completed_at),
            fps: self.live.fps(),
            loading: self.in_flight > 0,
            last_error: self.last_error.clone(),
            period_secs: self.period.as_secs_f64(),
            max_entities: self.max_entities,
            paused: self.paused(),
        });
    }
}

fn placeholder_status() -> SchedulerStatus {
    SchedulerStatus {
        source: String::new(),
        active: 0,
        visible: 0,
        tracked: 0,
        last_update: None,
        fps: None,
        loading: false,
        last_error: None,
        period_secs: 0.0,
        max_entities: 0,
        paused: false,
    }
}

/// Timer whose first tick fires right away.
fn immediate_timer(period: Duration) -> Interval {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

/// Timer whose first tick fires one full period from now.
fn delayed_timer(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

async fn next_tick(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

async fn run<M: MapSurface>(
    mut worker: Worker<M>,
    mut command_rx: mpsc::Receiver<Command>,
    mut fetch_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    cancel_token: CancellationToken,
    frame_interval: Duration,
) {
    let mut ingest_timer = if worker.paused() {
        None
    } else {
        Some(immediate_timer(worker.period))
    };
    let mut frames = interval(frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Scheduler cancelled");
                break;
            }

            _ = next_tick(&mut ingest_timer) => worker.start_fetch(),

            now = frames.tick() => worker.frame(now),

            Some(outcome) = fetch_rx.recv() => worker.apply(outcome),

            command = command_rx.recv() => match command {
                Some(Command::Shutdown) | None => {
                    info!("Scheduler shutting down");
                    break;
                }
                Some(command) => worker.handle(command, &mut ingest_timer),
            },
        }
    }
}
