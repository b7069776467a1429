// src/geo/mod.rs
//! Spherical geodesy: coordinates, distance, bearing and text conversion

pub mod coordinates;
pub mod format;
pub mod math;

pub use coordinates::{Coordinates, QualifiedCoordinates, EARTH_MEAN_RADIUS};
pub use format::{convert_from_string, convert_to_string, CoordinateFormat};
