// src/geo/format.rs
//! Degree/minute/second text representations of a coordinate value

use crate::error::{LocationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateFormat {
    /// `DD:MM.mmmmm`, minutes with up to 5 decimals
    DdMm,
    /// `DD:MM:SS.sss`, seconds with up to 3 decimals
    DdMmSs,
}

/// Render a latitude or longitude in degrees as text.
///
/// `value` must lie in [-180, 180).
pub fn convert_to_string(value: f64, format: CoordinateFormat) -> Result<String> {
    if value.is_nan() || !(-180.0..180.0).contains(&value) {
        return Err(LocationError::invalid(format!(
            "Coordinate value ({}) is out of range",
            value
        )));
    }

    let sign = if value < 0.0 { "-" } else { "" };
    let magnitude = value.abs();
    let mut degrees = magnitude.trunc();
    let minutes = (magnitude - degrees) * 60.0;

    match format {
        CoordinateFormat::DdMm => {
            let mut minutes = round_to(minutes, 5);
            if minutes >= 60.0 {
                minutes -= 60.0;
                degrees += 1.0;
            }
            Ok(format!("{}{}:{}", sign, degrees, trim_decimals(minutes, 5)))
        }
        CoordinateFormat::DdMmSs => {
            let mut whole_minutes = minutes.trunc();
            let mut seconds = round_to((minutes - whole_minutes) * 60.0, 3);
            if seconds >= 60.0 {
                seconds -= 60.0;
                whole_minutes += 1.0;
            }
            if whole_minutes >= 60.0 {
                whole_minutes -= 60.0;
                degrees += 1.0;
            }
            Ok(format!(
                "{}{}:{}:{}",
                sign,
                degrees,
                whole_minutes,
                trim_decimals(seconds, 3)
            ))
        }
    }
}

/// Parse `DD:MM.mmmmm` or `DD:MM:SS.sss` (optionally prefixed with `-`)
/// into degrees in [-180, 180).
pub fn convert_from_string(text: &str) -> Result<f64> {
    let malformed = || LocationError::invalid(format!("Malformed coordinate string: {:?}", text));

    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let parts: Vec<&str> = body.split(':').collect();
    if parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit() || b == b'.')) {
        return Err(malformed());
    }

    let degrees: u32 = parts[0].parse().map_err(|_| malformed())?;
    if degrees > 180 {
        return Err(malformed());
    }

    let fraction = match parts.as_slice() {
        [_, minutes] => {
            let minutes: f64 = minutes.parse().map_err(|_| malformed())?;
            if minutes >= 60.0 {
                return Err(malformed());
            }
            minutes / 60.0
        }
        [_, minutes, seconds] => {
            let minutes: u32 = minutes.parse().map_err(|_| malformed())?;
            let seconds: f64 = seconds.parse().map_err(|_| malformed())?;
            if minutes >= 60 || seconds >= 60.0 {
                return Err(malformed());
            }
            f64::from(minutes) / 60.0 + seconds / 3600.0
        }
        _ => return Err(malformed()),
    };

    let magnitude = f64::from(degrees) + fraction;
    let value = if negative { -magnitude } else { magnitude };
    if !(-180.0..180.0).contains(&value) {
        return Err(LocationError::invalid(format!(
            "Coordinate string {:?} is out of range",
            text
        )));
    }
    Ok(value)
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

fn trim_decimals(value: f64, places: usize) -> String {
    let text = format!("{:.*}", places, value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    text.to_string()
}
