// src/location.rs
//! Location snapshots delivered by the provider

use crate::{
    error::{LocationError, Result},
    geo::QualifiedCoordinates,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fmt, time::Duration};

/// Knots to metres per second.
pub const MS_PER_KNOT: f32 = 0.514_444_4;

/// An immutable position sample.
///
/// A valid location always carries coordinates; an invalid one carries none
/// and only tells a listener that no data was available at `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    coordinates: Option<QualifiedCoordinates>,
    speed: Option<f32>,  // m/s
    course: Option<f32>, // degrees from true north
    timestamp: DateTime<Utc>,
}

impl Location {
    /// Create a valid location.
    ///
    /// `speed` must be non-negative and `course` in [0, 360) when present.
    pub fn new(
        coordinates: QualifiedCoordinates,
        speed: Option<f32>,
        course: Option<f32>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        if let Some(s) = speed {
            if !s.is_finite() || s < 0.0 {
                return Err(LocationError::invalid(format!("Speed ({}) is invalid", s)));
            }
        }
        if let Some(c) = course {
            if !(0.0..360.0).contains(&c) {
                return Err(LocationError::invalid(format!("Course ({}) is invalid", c)));
            }
        }
        Ok(Self {
            coordinates: Some(coordinates),
            speed,
            course,
            timestamp,
        })
    }

    /// Create a valid location stamped now from driver units.
    ///
    /// Negative `speed_knots` means unknown speed; a course outside [0, 360)
    /// (or NaN) means unknown course.
    pub fn from_raw(coordinates: QualifiedCoordinates, speed_knots: f32, course: f32) -> Self {
        let speed = (speed_knots.is_finite() && speed_knots >= 0.0).then(|| speed_knots * MS_PER_KNOT);
        let course = (0.0..360.0).contains(&course).then_some(course);
        Self {
            coordinates: Some(coordinates),
            speed,
            course,
            timestamp: Utc::now(),
        }
    }

    /// A "no data available" marker stamped now.
    pub fn invalid() -> Self {
        Self::invalid_at(Utc::now())
    }

    pub fn invalid_at(timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinates: None,
            speed: None,
            course: None,
            timestamp,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.coordinates.is_some()
    }

    pub fn qualified_coordinates(&self) -> Option<&QualifiedCoordinates> {
        self.coordinates.as_ref()
    }

    /// Ground speed in metres per second
    pub fn speed(&self) -> Option<f32> {
        self.speed
    }

    pub fn course(&self) -> Option<f32> {
        self.course
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Time elapsed since the sample was taken (zero for future timestamps)
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_younger_than(&self, max_age: Duration) -> bool {
        self.age() <= max_age
    }

    /// Distance in metres to another location; both must be valid.
    pub fn distance_to(&self, other: &Location) -> Result<f64> {
        let (from, to) = self.endpoints(other, "distance")?;
        Ok(from.distance(to))
    }

    /// Initial bearing in degrees to another location; both must be valid.
    pub fn azimuth_to(&self, other: &Location) -> Result<f64> {
        let (from, to) = self.endpoints(other, "azimuth")?;
        Ok(from.azimuth_to(to))
    }

    fn endpoints<'a>(
        &'a self,
        other: &'a Location,
        operation: &str,
    ) -> Result<(&'a QualifiedCoordinates, &'a QualifiedCoordinates)> {
        match (&self.coordinates, &other.coordinates) {
            (Some(from), Some(to)) => Ok((from, to)),
            (None, _) => Err(LocationError::invalid(format!(
                "{} needs an origin with coordinates",
                operation
            ))),
            (_, None) => Err(LocationError::invalid(format!(
                "{} needs a destination with coordinates",
                operation
            ))),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(coordinates) = &self.coordinates else {
            return write!(f, "invalid");
        };
        write!(f, "{}", coordinates)?;
        match self.speed {
            Some(s) => write!(f, " speed={:.1}m/s", s)?,
            None => write!(f, " speed=?")?,
        }
        match self.course {
            Some(c) => write!(f, " course={:.1}°", c)?,
            None => write!(f, " course=?")?,
        }
        write!(f, " at {}", self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}
