// src/source/nmea.rs
//! NMEA 0183 serial source

use super::{AcquisitionSource, PollParams, RawEvent};
use crate::{
    error::{LocationError, Result},
    geo::{Coordinates, QualifiedCoordinates},
    location::Location,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    time::{timeout_at, Instant},
};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Values that arrive in one sentence type and are reused by the other
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NmeaEpoch {
    altitude: Option<f32>,
    speed_knots: Option<f32>,
    course: Option<f32>,
}

/// Reads GGA/RMC sentences from a receiver on a serial port.
pub struct NmeaSerialSource {
    port: String,
    baudrate: u32,
    lines: Option<Lines<BufReader<SerialStream>>>,
    epoch: NmeaEpoch,
}

impl NmeaSerialSource {
    pub fn new(port: impl Into<String>, baudrate: u32) -> Self {
        Self {
            port: port.into(),
            baudrate,
            lines: None,
            epoch: NmeaEpoch::default(),
        }
    }
}

#[async_trait]
impl AcquisitionSource for NmeaSerialSource {
    fn name(&self) -> &str {
        "nmea-serial"
    }

    async fn start(&mut self) -> Result<()> {
        let serial = tokio_serial::new(&self.port, self.baudrate)
            .timeout(Duration::from_millis(1000))
            .open_native_async()
            .map_err(|e| {
                LocationError::Unavailable(format!("Failed to open serial port {}: {}", self.port, e))
            })?;
        tracing::info!(port = %self.port, baudrate = self.baudrate, "Opened NMEA serial port");
        self.lines = Some(BufReader::new(serial).lines());
        Ok(())
    }

    /// NMEA receivers stream live sentences, so `max_age` never applies.
    async fn next_event(&mut self, params: PollParams) -> Result<RawEvent> {
        let lines = self
            .lines
            .as_mut()
            .ok_or_else(|| LocationError::Connection("serial source not started".to_string()))?;
        let deadline = Instant::now() + params.timeout;

        loop {
            let line = match timeout_at(deadline, lines.next_line()).await {
                Err(_) => return Ok(RawEvent::Fix(Location::invalid())),
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => return Ok(RawEvent::Shutdown),
                Ok(Err(e)) => return Err(e.into()),
            };
            if let Some(event) = parse_nmea_sentence(&mut self.epoch, line.trim()) {
                return Ok(event);
            }
        }
    }

    async fn stop(&mut self) {
        self.lines = None;
    }
}

/// Parse a single NMEA sentence. GGA and RMC sentences produce a fix
/// (invalid when the receiver reports no fix); everything else updates
/// nothing and yields `None`.
pub fn parse_nmea_sentence(epoch: &mut NmeaEpoch, line: &str) -> Option<RawEvent> {
    let Some(body) = verified_body(line) else {
        tracing::debug!(sentence = line, "Dropping NMEA sentence with bad checksum");
        return None;
    };
    let parts: Vec<&str> = body.split(',').collect();

    // $ttGGA, $ttRMC for any talker id (GP, GN, GL, ...)
    match parts[0].get(2..) {
        Some("GGA") => parse_gga(epoch, &parts),
        Some("RMC") => parse_rmc(epoch, &parts),
        _ => None,
    }
}

/// Strip `$` and `*hh`, checking the XOR checksum when one is present.
fn verified_body(line: &str) -> Option<&str> {
    let line = line.strip_prefix('$')?;
    let Some((body, checksum)) = line.split_once('*') else {
        return Some(line);
    };
    let expected = u8::from_str_radix(checksum.trim(), 16).ok()?;
    let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
    (actual == expected).then_some(body)
}

/// GGA (Global Positioning System Fix Data)
fn parse_gga(epoch: &mut NmeaEpoch, parts: &[&str]) -> Option<RawEvent> {
    if parts.len() < 15 {
        return None;
    }

    // Fix quality (field 6): 0 or empty means no fix
    if matches!(parts[6], "" | "0") {
        return Some(RawEvent::Fix(Location::invalid()));
    }

    // Altitude above mean sea level (field 9)
    if let Ok(alt) = parts[9].parse::<f32>() {
        epoch.altitude = Some(alt);
    }

    let latitude = parse_coordinate(parts[2], parts[3], "S");
    let longitude = parse_coordinate(parts[4], parts[5], "W");
    Some(fix_from(epoch, latitude, longitude))
}

/// RMC (Recommended Minimum Course)
fn parse_rmc(epoch: &mut NmeaEpoch, parts: &[&str]) -> Option<RawEvent> {
    if parts.len() < 10 {
        return None;
    }

    // Status (field 2): A = active, V = void
    if parts[2] != "A" {
        return Some(RawEvent::Fix(Location::invalid()));
    }

    // Speed over ground in knots (field 7), course over ground (field 8)
    epoch.speed_knots = parts[7].parse::<f32>().ok();
    epoch.course = parts[8].parse::<f32>().ok();

    let latitude = parse_coordinate(parts[3], parts[4], "S");
    let longitude = parse_coordinate(parts[5], parts[6], "W");
    Some(fix_from(epoch, latitude, longitude))
}

fn fix_from(epoch: &NmeaEpoch, latitude: Option<f64>, longitude: Option<f64>) -> RawEvent {
    let (Some(lat), Some(lon)) = (latitude, longitude) else {
        return RawEvent::Fix(Location::invalid());
    };
    match Coordinates::new(lat, lon, epoch.altitude) {
        Ok(coordinates) => RawEvent::Fix(Location::from_raw(
            QualifiedCoordinates::from(coordinates),
            epoch.speed_knots.unwrap_or(-1.0),
            epoch.course.unwrap_or(-1.0),
        )),
        Err(e) => {
            tracing::debug!(error = %e, "NMEA position out of range");
            RawEvent::Fix(Location::invalid())
        }
    }
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere to signed decimal degrees
fn parse_coordinate(value: &str, hemisphere: &str, negative: &str) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }
    let raw = value.parse::<f64>().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    Some(if hemisphere == negative { -decimal } else { decimal })
}
