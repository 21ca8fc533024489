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

//! Headless live aircraft map.
//!
//! Fetches aircraft state on a timer, animates every aircraft by dead
//! reckoning on an in-memory map, and reports counts on the log. A console
//! on stdin drives the same controls a map UI would.

mod config;
mod console;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use glide_engine::{
    AltitudeUnit, DataSource, LiveMap, MemoryMap, OpenSkySource, ReplaySource, Scheduler,
    SimulatedSource, SpeedUnit,
};
use log::{error, info, warn};
use mimalloc::MiMalloc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use config::{AppConfig, SourceKind};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "airjedi-live", version, about = "Live aircraft map with dead-reckoning animation")]
struct Args {
    /// Where aircraft state comes from
    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// JSON file of recorded batches (implies --source replay)
    #[arg(long, value_name = "PATH")]
    replay: Option<PathBuf>,

    /// OpenSky states endpoint
    #[arg(long, value_name = "URL")]
    opensky_url: Option<String>,

    /// Seconds between fetches
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Maximum aircraft kept from each batch
    #[arg(long, value_name = "N")]
    max_aircraft: Option<usize>,

    /// Animation frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// Altitude unit: m or ft
    #[arg(long, value_name = "UNIT")]
    altitude_unit: Option<AltitudeUnit>,

    /// Speed unit: kmh or kn
    #[arg(long, value_name = "UNIT")]
    speed_unit: Option<SpeedUnit>,

    /// Show aircraft trails
    #[arg(long)]
    trails: bool,

    /// Start paused
    #[arg(long)]
    paused: bool,

    /// Ignore fetch results that arrive after a newer batch
    #[arg(long)]
    discard_stale: bool,

    /// Print status and marker snapshots as JSON lines instead of log lines
    #[arg(long)]
    json: bool,

    /// Do not read commands from stdin
    #[arg(long)]
    no_console: bool,

    /// Exit after this many seconds
    #[arg(long, value_name = "SECS")]
    run_for: Option<u64>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(path) = &self.replay {
            config.replay_file = Some(path.display().to_string());
            if self.source.is_none() {
                config.source = SourceKind::Replay;
            }
        }
        if let Some(url) = &self.opensky_url {
            config.opensky_url.clone_from(url);
        }
        if let Some(secs) = self.interval {
            config.update_interval_secs = secs;
        }
        if let Some(max) = self.max_aircraft {
            config.max_aircraft = max;
        }
        if let Some(fps) = self.fps {
            config.frame_rate = fps;
        }
        if let Some(unit) = self.altitude_unit {
            config.altitude_unit = unit;
        }
        if let Some(unit) = self.speed_unit {
            config.speed_unit = unit;
        }
        if self.trails {
            config.show_trails = true;
        }
        if self.paused {
            config.animation_enabled = false;
        }
        if self.discard_stale {
            config.discard_stale_batches = true;
        }
    }
}

async fn build_source(config: &AppConfig) -> Result<Arc<dyn DataSource>, Box<dyn Error>> {
    let source: Arc<dyn DataSource> = match config.source {
        SourceKind::Simulated => Arc::new(SimulatedSource::new()),
        SourceKind::Opensky => Arc::new(OpenSkySource::new(config.opensky_url.clone())?),
        SourceKind::Replay => {
            let path = config
                .replay_file
                .as_deref()
                .ok_or("replay source needs --replay <PATH> or replay_file in the config")?;
            Arc::new(ReplaySource::open(path).await?)
        }
    };
    Ok(source)
}

async fn report(scheduler: &Scheduler, json: bool) {
    let status = scheduler.status();
    if !json {
        info!("{}", console::format_status(&status));
        return;
    }

    match serde_json::to_string(&status) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("Could not encode status: {}", e),
    }
    match scheduler.snapshot().await {
        Ok(markers) => match serde_json::to_string(&markers) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Could not encode snapshot: {}", e),
        },
        Err(e) => warn!("Snapshot unavailable: {}", e),
    }
}

async fn run(config: AppConfig, args: Args) -> Result<(), Box<dyn Error>> {
    let source = build_source(&config).await?;
    let live = LiveMap::new(MemoryMap::new(), config.display_settings());
    let scheduler = Scheduler::spawn(config.scheduler_config(), source, live);
    let shutdown = CancellationToken::new();

    if !args.no_console {
        println!("Type 'help' for commands.");
        tokio::spawn(console::run(
            scheduler.commands(),
            config.display_settings().units,
            scheduler.subscribe(),
            shutdown.clone(),
        ));
    }

    let mut status_timer = interval(Duration::from_secs(config.status_interval_secs.max(1)));
    status_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires before any batch has landed
    status_timer.tick().await;

    let deadline = sleep(args.run_for.map_or(Duration::MAX, Duration::from_secs));
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!("Could not listen for Ctrl-C: {}", e);
                }
                info!("Interrupted");
                break;
            }
            () = shutdown.cancelled() => break,
            () = &mut deadline => {
                info!("Run time elapsed");
                break;
            }
            _ = status_timer.tick() => report(&scheduler, args.json).await,
        }
    }

    report(&scheduler, args.json).await;
    shutdown.cancel();
    scheduler.shutdown();
    scheduler.join().await;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Could not load configuration, using defaults: {}", e);
        AppConfig::default()
    });
    args.apply(&mut config);

    if args.save_config {
        config.save()?;
        info!("Saved configuration to {}", AppConfig::get_config_path()?.display());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config, args))
}
