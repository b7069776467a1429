// src/lib.rs
//! Location Provider Library
//!
//! Turns a raw positioning feed (gpsd, a serial NMEA receiver, or any
//! [`AcquisitionSource`]) into throttled listener notifications with an
//! availability state, and offers great-circle geodesy on coordinates.

pub mod config;
pub mod display;
pub mod error;
pub mod geo;
pub mod location;
pub mod logging;
pub mod provider;
pub mod source;

// Re-export main types for convenience
pub use config::{ProviderConfig, SourceConfig};
pub use error::{LocationError, Result};
pub use geo::{Coordinates, QualifiedCoordinates};
pub use location::Location;
pub use provider::{LocationListener, LocationProvider, ProviderState, USE_DEFAULT};
pub use source::{AcquisitionSource, RawEvent};
