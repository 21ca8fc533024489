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

//! Line-oriented control console on stdin.
//!
//! Each line is one command, e.g. `interval 5`, `filter sensor 2`,
//! `units alt ft`, `select abc123`. Type `help` for the list.

use std::time::Duration;

use chrono::Local;
use glide_engine::{
    AltitudeUnit, Command, DisplayFilter, SchedulerStatus, SpeedUnit, UnitPreferences, MAX_PERIOD,
};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

pub const HELP: &str = "\
Commands:
  interval <secs>          set the fetch period
  pause | resume           stop or restart fetching and animation
  filter all               show every aircraft
  filter sensor <tag>      only aircraft from sensor <tag> (0 = any)
  filter id <text>         only identifiers containing <text>
  units alt <m|ft>         altitude unit
  units speed <kmh|kn>     speed unit
  trails <on|off>          show or hide trails
  max <n>                  maximum aircraft per batch
  refresh                  fetch now
  reset                    clear filter and selection, then fetch
  select <id>              show details for one aircraft
  status                   print the current status
  snapshot                 print every marker as JSON
  quit                     exit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Period(Duration),
    Animation(bool),
    Filter(DisplayFilter),
    Altitude(AltitudeUnit),
    Speed(SpeedUnit),
    Trails(bool),
    MaxEntities(usize),
    Refresh,
    Reset,
    Select(String),
    Status,
    Snapshot,
    Help,
    Quit,
}

fn parse_switch(value: Option<&str>) -> Result<bool, String> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("on" | "true" | "yes") => Ok(true),
        Some("off" | "false" | "no") => Ok(false),
        _ => Err("expected on or off".to_string()),
    }
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Action>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let action = match verb.to_ascii_lowercase().as_str() {
        "interval" | "period" => {
            let secs: f64 = words
                .next()
                .ok_or("usage: interval <secs>")?
                .parse()
                .map_err(|e| format!("bad interval: {e}"))?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err("interval must be positive".to_string());
            }
            let period = Duration::try_from_secs_f64(secs).map_err(|e| format!("bad interval: {e}"))?;
            if period > MAX_PERIOD {
                return Err(format!("interval must be at most {}s", MAX_PERIOD.as_secs()));
            }
            Action::Period(period)
        }
        "pause" => Action::Animation(false),
        "resume" => Action::Animation(true),
        "filter" => match words.next().map(str::to_ascii_lowercase).as_deref() {
            Some("all") | None => Action::Filter(DisplayFilter::All),
            Some("sensor") => {
                let tag = words
                    .next()
                    .ok_or("usage: filter sensor <tag>")?
                    .parse()
                    .map_err(|e| format!("bad sensor tag: {e}"))?;
                Action::Filter(DisplayFilter::Sensor(tag))
            }
            Some("id" | "aircraft") => {
                Action::Filter(DisplayFilter::Identifier(words.collect::<Vec<_>>().join(" ")))
            }
            Some(other) => return Err(format!("unknown filter '{other}'")),
        },
        "units" => match (words.next(), words.next()) {
            (Some("alt" | "altitude"), Some(unit)) => Action::Altitude(unit.parse()?),
            (Some("speed"), Some(unit)) => Action::Speed(unit.parse()?),
            _ => return Err("usage: units alt <m|ft> | units speed <kmh|kn>".to_string()),
        },
        "trails" => Action::Trails(parse_switch(words.next())?),
        "max" => {
            let max = words
                .next()
                .ok_or("usage: max <n>")?
                .parse()
                .map_err(|e| format!("bad maximum: {e}"))?;
            Action::MaxEntities(max)
        }
        "refresh" => Action::Refresh,
        "reset" => Action::Reset,
        "select" => Action::Select(words.next().ok_or("usage: select <id>")?.to_string()),
        "status" => Action::Status,
        "snapshot" => Action::Snapshot,
        "help" | "?" => Action::Help,
        "quit" | "exit" => Action::Quit,
        other => return Err(format!("unknown command '{other}' (try help)")),
    };

    Ok(Some(action))
}

/// One-line human summary of a status.
pub fn format_status(status: &SchedulerStatus) -> String {
    let fps = status.fps.map_or_else(|| "-".to_string(), |fps| format!("{fps:.0}"));
    let updated = status
        .last_update
        .map_or_else(
            || "never".to_string(),
            |t| t.with_timezone(&Local).format("%H:%M:%S").to_string(),
        );
    let mut line = format!(
        "[{}] {} active, {} visible, {} tracked | {} fps | every {}s | updated {}",
        status.source, status.active, status.visible, status.tracked, fps, status.period_secs, updated
    );
    if status.paused {
        line.push_str(" | paused");
    }
    if status.loading {
        line.push_str(" | loading");
    }
    if let Some(error) = &status.last_error {
        line.push_str(" | error: ");
        line.push_str(error);
    }
    line
}

/// Read commands from stdin until EOF or `quit`.
pub async fn run(
    commands: mpsc::Sender<Command>,
    mut units: UnitPreferences,
    status: watch::Receiver<SchedulerStatus>,
    shutdown: CancellationToken,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => return,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Console input closed");
                return;
            }
            Err(e) => {
                warn!("Console read error: {}", e);
                return;
            }
        };

        let action = match parse_line(&line) {
            Ok(Some(action)) => action,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        let command = match action {
            Action::Period(period) => Command::SetPeriod(period),
            Action::Animation(enabled) => Command::SetAnimationEnabled(enabled),
            Action::Filter(filter) => Command::SetFilter(filter),
            Action::Altitude(altitude) => {
                units.altitude = altitude;
                Command::SetUnits(units)
            }
            Action::Speed(speed) => {
                units.speed = speed;
                Command::SetUnits(units)
            }
            Action::Trails(visible) => Command::SetTrailsVisible(visible),
            Action::MaxEntities(max) => Command::SetMaxEntities(max),
            Action::Refresh => Command::Refresh,
            Action::Reset => Command::ResetView,
            Action::Select(id) => {
                let (reply, rx) = oneshot::channel();
                if commands.send(Command::Select { id: id.clone(), reply }).await.is_err() {
                    return;
                }
                match rx.await {
                    Ok(Some(detail)) => println!("{detail}"),
                    Ok(None) => println!("no aircraft '{id}'"),
                    Err(_) => return,
                }
                continue;
            }
            Action::Snapshot => {
                let (reply, rx) = oneshot::channel();
                if commands.send(Command::Snapshot { reply }).await.is_err() {
                    return;
                }
                match rx.await.map(|markers| serde_json::to_string_pretty(&markers)) {
                    Ok(Ok(json)) => println!("{json}"),
                    Ok(Err(e)) => warn!("Could not encode snapshot: {}", e),
                    Err(_) => return,
                }
                continue;
            }
            Action::Status => {
                println!("{}", format_status(&status.borrow()));
                continue;
            }
            Action::Help => {
                println!("{HELP}");
                continue;
            }
            Action::Quit => {
                shutdown.cancel();
                return;
            }
        };

        if commands.send(command).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filters() {
        assert_eq!(
            parse_line("filter sensor 2"),
            Ok(Some(Action::Filter(DisplayFilter::Sensor(2))))
        );
        assert_eq!(
            parse_line("filter id abc"),
            Ok(Some(Action::Filter(DisplayFilter::Identifier("abc".to_string()))))
        );
        assert_eq!(parse_line("filter"), Ok(Some(Action::Filter(DisplayFilter::All))));
        assert!(parse_line("filter sensor x").is_err());
        assert!(parse_line("filter bogus").is_err());
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(
            parse_line("interval 5"),
            Ok(Some(Action::Period(Duration::from_secs(5))))
        );
        assert_eq!(
            parse_line("period 0.5"),
            Ok(Some(Action::Period(Duration::from_millis(500))))
        );
        assert_eq!(
            parse_line("interval 86400"),
            Ok(Some(Action::Period(MAX_PERIOD)))
        );
        assert!(parse_line("interval 86401").is_err());
        assert!(parse_line("interval 1e30").is_err());
        assert!(parse_line("interval inf").is_err());
        assert!(parse_line("interval 0").is_err());
        assert!(parse_line("interval").is_err());
    }

    #[test]
    fn test_parse_units_and_switches() {
        assert_eq!(
            parse_line("units alt ft"),
            Ok(Some(Action::Altitude(AltitudeUnit::Feet)))
        );
        assert_eq!(
            parse_line("units speed kn"),
            Ok(Some(Action::Speed(SpeedUnit::Knots)))
        );
        assert!(parse_line("units alt furlongs").is_err());
        assert_eq!(parse_line("trails on"), Ok(Some(Action::Trails(true))));
        assert!(parse_line("trails maybe").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_line("   "), Ok(None));
        assert_eq!(parse_line("PAUSE"), Ok(Some(Action::Animation(false))));
        assert_eq!(parse_line("max 250"), Ok(Some(Action::MaxEntities(250))));
        assert_eq!(
            parse_line("select abc123"),
            Ok(Some(Action::Select("abc123".to_string())))
        );
        assert!(parse_line("select").is_err());
        assert!(parse_line("fly").is_err());
    }

    #[test]
    fn test_format_status() {
        let status = SchedulerStatus {
            source: "simulated".to_string(),
            active: 3,
            visible: 2,
            tracked: 4,
            last_update: None,
            fps: Some(59.6),
            loading: false,
            last_error: Some("server returned HTTP 503".to_string()),
            period_secs: 3.0,
            max_entities: 100,
            paused: true,
        };
        assert_eq!(
            format_status(&status),
            "[simulated] 3 active, 2 visible, 4 tracked | 60 fps | every 3s | updated never | paused | error: server returned HTTP 503"
        );
    }
}
