// src/source/gpsd.rs
//! gpsd client source

use super::{AcquisitionSource, PollParams, RawEvent};
use crate::{
    error::{LocationError, Result},
    geo::{Coordinates, QualifiedCoordinates},
    location::Location,
    provider::ProviderState,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::TcpStream,
    time::{timeout_at, Instant},
};

#[derive(Debug, Deserialize)]
struct GpsdMessage {
    class: String,
    #[serde(flatten)]
    data: HashMap<String, serde_json::Value>,
}

/// Reads TPV/DEVICE(S) reports from a gpsd daemon.
pub struct GpsdSource {
    host: String,
    port: u16,
    lines: Option<Lines<BufReader<TcpStream>>>,
}

impl GpsdSource {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            lines: None,
        }
    }
}

#[async_trait]
impl AcquisitionSource for GpsdSource {
    fn name(&self) -> &str {
        "gpsd"
    }

    async fn start(&mut self) -> Result<()> {
        let reader = connect_gpsd(&self.host, self.port)
            .await
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;
        tracing::info!(host = %self.host, port = self.port, "Connected to gpsd");
        self.lines = Some(reader.lines());
        Ok(())
    }

    async fn next_event(&mut self, params: PollParams) -> Result<RawEvent> {
        let lines = self
            .lines
            .as_mut()
            .ok_or_else(|| LocationError::Connection("gpsd source not started".to_string()))?;
        let deadline = Instant::now() + params.timeout;

        loop {
            let line = match timeout_at(deadline, lines.next_line()).await {
                Err(_) => return Ok(RawEvent::Fix(Location::invalid())),
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => return Ok(RawEvent::Shutdown),
                Ok(Err(e)) => return Err(e.into()),
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_gpsd_json(line)? {
                Some(RawEvent::Fix(fix)) if fix.is_valid() && !fix.is_younger_than(params.max_age) => {
                    tracing::trace!(age = ?fix.age(), "Skipping stale gpsd report");
                }
                Some(event) => return Ok(event),
                None => {}
            }
        }
    }

    async fn stop(&mut self) {
        self.lines = None;
    }
}

/// Connect to a gpsd daemon and enable JSON watch mode
pub async fn connect_gpsd(host: &str, port: u16) -> Result<BufReader<TcpStream>> {
    let mut stream = TcpStream::connect((host, port)).await.map_err(|e| {
        LocationError::Connection(format!("Failed to connect to gpsd at {}:{}: {}", host, port, e))
    })?;

    stream
        .write_all(b"?WATCH={\"enable\":true,\"json\":true}\n")
        .await
        .map_err(|e| LocationError::Connection(format!("Failed to send WATCH command: {}", e)))?;

    Ok(BufReader::new(stream))
}

/// Parse one line of gpsd JSON. Reports that carry no event yield `None`.
pub fn parse_gpsd_json(line: &str) -> Result<Option<RawEvent>> {
    let msg: GpsdMessage = serde_json::from_str(line)
        .map_err(|e| LocationError::Parse(format!("Failed to parse gpsd JSON: {}", e)))?;

    let event = match msg.class.as_str() {
        "TPV" => Some(parse_tpv_message(&msg.data)?),
        "DEVICES" => parse_devices_message(&msg.data),
        "DEVICE" => parse_device_message(&msg.data),
        "VERSION" => {
            if let Some(release) = msg.data.get("release").and_then(|v| v.as_str()) {
                tracing::info!(release, "gpsd version");
            }
            None
        }
        // SKY, WATCH, PPS and friends carry nothing the provider uses
        _ => None,
    };
    Ok(event)
}

/// TPV (time/position/velocity) report
fn parse_tpv_message(data: &HashMap<String, serde_json::Value>) -> Result<RawEvent> {
    let number = |key: &str| data.get(key).and_then(|v| v.as_f64());

    let timestamp = data
        .get("time")
        .and_then(|v| v.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mode = data.get("mode").and_then(|v| v.as_u64()).unwrap_or(0);
    let (Some(lat), Some(lon)) = (number("lat"), number("lon")) else {
        return Ok(RawEvent::Fix(Location::invalid_at(timestamp)));
    };
    if mode < 2 {
        return Ok(RawEvent::Fix(Location::invalid_at(timestamp)));
    }

    let altitude = number("altHAE").or_else(|| number("alt")).map(|a| a as f32);
    let coordinates = Coordinates::new(lat, lon, altitude)
        .map_err(|e| LocationError::Parse(format!("gpsd TPV position: {}", e)))?;
    let coordinates = QualifiedCoordinates::from_raw(
        coordinates,
        number("eph").map_or(f32::NAN, |v| v as f32),
        number("epv").map_or(f32::NAN, |v| v as f32),
    );

    let speed = number("speed").map(|v| v as f32).filter(|s| *s >= 0.0);
    let course = number("track").map(|v| v as f32).filter(|c| (0.0..360.0).contains(c));

    Ok(RawEvent::Fix(Location::new(coordinates, speed, course, timestamp)?))
}

/// DEVICES report: an empty device list means no receiver at all
fn parse_devices_message(data: &HashMap<String, serde_json::Value>) -> Option<RawEvent> {
    let devices = data.get("devices").and_then(|v| v.as_array())?;
    for device in devices {
        if let Some(path) = device.get("path").and_then(|v| v.as_str()) {
            tracing::debug!(path, "gpsd device");
        }
    }
    devices
        .is_empty()
        .then_some(RawEvent::StateChange(ProviderState::OutOfService))
}

/// DEVICE report: `activated: 0` means the receiver was closed
fn parse_device_message(data: &HashMap<String, serde_json::Value>) -> Option<RawEvent> {
    let deactivated = data
        .get("activated")
        .and_then(|v| v.as_f64())
        .is_some_and(|a| a == 0.0);
    deactivated.then_some(RawEvent::StateChange(ProviderState::TemporarilyUnavailable))
}
