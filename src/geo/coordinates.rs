// src/geo/coordinates.rs
//! WGS84 coordinates with spherical distance and bearing

use super::math;
use crate::error::{LocationError, Result};
use serde::Serialize;
use std::fmt;
use std::ops::Deref;

/// FAI mean Earth radius in metres, between the equatorial (6,378,137 m)
/// and polar (6,356,752.3142 m) radii.
pub const EARTH_MEAN_RADIUS: f64 = 6_371_000.0;

/// Drivers report altitudes below this value when no altitude is known.
pub const ALTITUDE_UNKNOWN_BELOW: f32 = -10_000.0;

/// Tolerance used by [`Coordinates::approx_eq`], in degrees and metres.
const EQUALITY_TOLERANCE: f64 = 0.000_001;

/// A latitude/longitude/altitude triple in the WGS84 datum.
///
/// Latitude is kept in [-90, 90] and longitude in [-180, 180); every
/// constructor and setter rejects values outside those ranges or NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
    altitude: Option<f32>,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64, altitude: Option<f32>) -> Result<Self> {
        Ok(Self {
            latitude: check_latitude(latitude)?,
            longitude: check_longitude(longitude)?,
            altitude: check_altitude(altitude)?,
        })
    }

    /// Build from driver values where NaN or anything below
    /// [`ALTITUDE_UNKNOWN_BELOW`] means "altitude unknown".
    pub fn from_raw(latitude: f64, longitude: f64, altitude: f32) -> Result<Self> {
        let altitude = if altitude.is_nan() || altitude < ALTITUDE_UNKNOWN_BELOW {
            None
        } else {
            Some(altitude)
        };
        Self::new(latitude, longitude, altitude)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Height above the WGS84 ellipsoid in metres, `None` when unknown
    pub fn altitude(&self) -> Option<f32> {
        self.altitude
    }

    pub fn set_latitude(&mut self, latitude: f64) -> Result<()> {
        self.latitude = check_latitude(latitude)?;
        Ok(())
    }

    pub fn set_longitude(&mut self, longitude: f64) -> Result<()> {
        self.longitude = check_longitude(longitude)?;
        Ok(())
    }

    pub fn set_altitude(&mut self, altitude: Option<f32>) -> Result<()> {
        self.altitude = check_altitude(altitude)?;
        Ok(())
    }

    /// Great-circle distance in metres using the haversine formula on a
    /// sphere of [`EARTH_MEAN_RADIUS`]. Altitude is ignored.
    ///
    /// Within 0.35% of the WGS84 ellipsoidal distance.
    pub fn distance(&self, to: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();
        let lat2 = to.latitude.to_radians();
        let lon2 = to.longitude.to_radians();

        let half_dlat = ((lat1 - lat2) / 2.0).sin();
        let half_dlon = ((lon1 - lon2) / 2.0).sin();
        let h = half_dlat * half_dlat + lat1.cos() * lat2.cos() * half_dlon * half_dlon;

        // Rounding can push antipodal points a hair past 1.
        let central_angle = 2.0 * math::asin(h.min(1.0).sqrt());
        EARTH_MEAN_RADIUS * central_angle
    }

    /// Initial bearing from `self` to `to` in degrees clockwise from true
    /// north, in [0, 360).
    ///
    /// From the North pole every other point is due south (180), from the
    /// South pole every other point is due north (0), and a point has a
    /// bearing of 0 to itself. Within 1 degree of the true bearing.
    pub fn azimuth_to(&self, to: &Coordinates) -> f64 {
        if self.latitude == 90.0 {
            return if to.latitude == 90.0 { 0.0 } else { 180.0 };
        }
        if self.latitude == -90.0 {
            return 0.0;
        }
        if self.latitude == to.latitude && self.longitude == to.longitude {
            return 0.0;
        }

        let lat1 = self.latitude.to_radians();
        let lat2 = to.latitude.to_radians();
        let dlon = (to.longitude - self.longitude).to_radians();

        let cos_lat2 = lat2.cos();
        let y = dlon.sin() * cos_lat2;
        let x = lat1.cos() * lat2.sin() - lat1.sin() * cos_lat2 * dlon.cos();

        let degrees = math::atan2(y, x).to_degrees();
        let normalized = (degrees + 360.0) % 360.0;
        if normalized >= 360.0 {
            0.0
        } else {
            normalized
        }
    }

    /// Equality within 1e-6 degrees (and metres for altitude). An unknown
    /// altitude only equals another unknown altitude.
    pub fn approx_eq(&self, other: &Coordinates) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= EQUALITY_TOLERANCE;

        if !close(self.latitude, other.latitude) || !close(self.longitude, other.longitude) {
            return false;
        }
        match (self.altitude, other.altitude) {
            (None, None) => true,
            (Some(a), Some(b)) => close(f64::from(a), f64::from(b)),
            _ => false,
        }
    }
}

impl fmt::Display for Coordinates {
    /// Renders as `79.32°N 169.8°W 25.7m`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lat, ns) = if self.latitude >= 0.0 {
            (self.latitude, 'N')
        } else {
            (-self.latitude, 'S')
        };
        let (lon, ew) = if self.longitude >= 0.0 {
            (self.longitude, 'E')
        } else {
            (-self.longitude, 'W')
        };
        write!(f, "{}°{} {}°{}", lat, ns, lon, ew)?;
        if let Some(alt) = self.altitude {
            write!(f, " {}m", alt)?;
        }
        Ok(())
    }
}

/// Coordinates plus their horizontal and vertical accuracy (metres, 1 sigma).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualifiedCoordinates {
    #[serde(flatten)]
    coordinates: Coordinates,
    horizontal_accuracy: Option<f32>,
    vertical_accuracy: Option<f32>,
}

impl QualifiedCoordinates {
    pub fn new(
        coordinates: Coordinates,
        horizontal_accuracy: Option<f32>,
        vertical_accuracy: Option<f32>,
    ) -> Result<Self> {
        Ok(Self {
            coordinates,
            horizontal_accuracy: check_accuracy("horizontal", horizontal_accuracy)?,
            vertical_accuracy: check_accuracy("vertical", vertical_accuracy)?,
        })
    }

    /// Driver form: negative or NaN accuracies mean "unknown".
    pub fn from_raw(coordinates: Coordinates, horizontal_accuracy: f32, vertical_accuracy: f32) -> Self {
        let known = |v: f32| (v.is_finite() && v >= 0.0).then_some(v);
        Self {
            coordinates,
            horizontal_accuracy: known(horizontal_accuracy),
            vertical_accuracy: known(vertical_accuracy),
        }
    }

    pub fn coordinates(&self) -> &Coordinates {
        &self.coordinates
    }

    pub fn horizontal_accuracy(&self) -> Option<f32> {
        self.horizontal_accuracy
    }

    pub fn vertical_accuracy(&self) -> Option<f32> {
        self.vertical_accuracy
    }
}

impl Deref for QualifiedCoordinates {
    type Target = Coordinates;

    fn deref(&self) -> &Coordinates {
        &self.coordinates
    }
}

impl From<Coordinates> for QualifiedCoordinates {
    fn from(coordinates: Coordinates) -> Self {
        Self {
            coordinates,
            horizontal_accuracy: None,
            vertical_accuracy: None,
        }
    }
}

impl fmt::Display for QualifiedCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coordinates)?;
        if let Some(h) = self.horizontal_accuracy {
            write!(f, " ±{}m", h)?;
        }
        Ok(())
    }
}

fn check_latitude(latitude: f64) -> Result<f64> {
    if latitude.is_nan() || !(-90.0..=90.0).contains(&latitude) {
        return Err(LocationError::invalid(format!("Latitude ({}) is invalid", latitude)));
    }
    Ok(latitude)
}

fn check_longitude(longitude: f64) -> Result<f64> {
    if longitude.is_nan() || !(-180.0..180.0).contains(&longitude) {
        return Err(LocationError::invalid(format!("Longitude ({}) is invalid", longitude)));
    }
    Ok(longitude)
}

fn check_altitude(altitude: Option<f32>) -> Result<Option<f32>> {
    match altitude {
        Some(alt) if !alt.is_finite() => {
            Err(LocationError::invalid(format!("Altitude ({}) is invalid", alt)))
        }
        other => Ok(other),
    }
}

fn check_accuracy(kind: &str, accuracy: Option<f32>) -> Result<Option<f32>> {
    match accuracy {
        Some(acc) if !acc.is_finite() || acc < 0.0 => Err(LocationError::invalid(format!(
            "{} accuracy ({}) must be a non-negative number",
            kind, acc
        ))),
        other => Ok(other),
    }
}
