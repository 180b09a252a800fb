//! Feeds `lat,lng` lines from stdin into the tracker as location samples.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use proximity_reminders::{
    AppConfig, ChannelLocationSource, Coordinate, ReminderRuntime, TrackingState,
};
use tracing::{info, warn};

fn parse_sample(line: &str) -> Result<Coordinate> {
    let (lat, lng) = line
        .split_once(',')
        .context("expected `latitude,longitude`")?;
    let latitude: f64 = lat.trim().parse().context("invalid latitude")?;
    let longitude: f64 = lng.trim().parse().context("invalid longitude")?;
    Ok(Coordinate::checked(latitude, longitude)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env();
    let source = ChannelLocationSource::new();
    let runtime = ReminderRuntime::initialize(config, Arc::new(source.clone()))
        .context("failed to initialize tracker")?;
    let state = runtime.controller().start()?;
    info!(?state, "tracker ready; reading samples from stdin");

    let feeder = source.clone();
    let reader = tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    feeder.push_error(err.to_string());
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_sample(&line) {
                Ok(location) => {
                    if !feeder.push_blocking(location) {
                        warn!("tracking is not active; sample ignored");
                    }
                }
                Err(err) => warn!(error = %err, line = %line, "skipping malformed sample"),
            }
        }
    });
    reader.await.context("stdin reader panicked")?;

    // Let the watch loop drain queued samples before shutting down.
    source.close();
    while runtime.controller().state() == TrackingState::Active {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    runtime.controller().stop();
    info!("stdin closed; tracker stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_samples() {
        let sample = parse_sample(" 37.5, -122.25 ").unwrap();
        assert_eq!(sample, Coordinate::new(37.5, -122.25));
        assert!(parse_sample("37.5").is_err());
        assert!(parse_sample("north,west").is_err());
        assert!(parse_sample("95,0").is_err());
    }
}
